use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use stratagem_core::types::StrategyData;

use crate::error::{RagError, Result};
use crate::index::StrategyRag;

/// Client for the remote semantic-index service.
///
/// Two endpoint families exist: v1 shards per `(agent, session)` and v4
/// shards per agent. Writes go to both-capable `save_result_v4`; reads
/// prefer `relevant_strategy_raw_v4`, which ranks across the whole agent.
pub struct HttpIndex {
    client: reqwest::Client,
    base_url: String,
    agent_id: String,
    session_id: String,
}

impl HttpIndex {
    pub fn new(
        base_url: impl Into<String>,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            agent_id: agent_id.into(),
            session_id: session_id.into(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "index request");

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, path, body = %message, "index API error");
            return Err(RagError::Api { status, message });
        }
        Ok(resp.json().await?)
    }

    fn save_payload(&self, strategies: &[StrategyData]) -> Result<Vec<serde_json::Value>> {
        strategies
            .iter()
            .map(|s| {
                Ok(serde_json::json!({
                    "strategy": s.summarized_desc,
                    "strategy_data": serde_json::to_string(s)?,
                    "reference_id": s.strategy_id,
                    "agent_id": self.agent_id,
                    "session_id": self.session_id,
                }))
            })
            .collect()
    }

    /// Write into the per-session (v1) shard.
    pub async fn save_result(&self, strategies: &[StrategyData]) -> Result<()> {
        let payload = self.save_payload(strategies)?;
        self.post("/save_result", serde_json::json!(payload)).await?;
        Ok(())
    }

    /// Write into the per-agent (v4) shard.
    pub async fn save_result_v4(&self, strategies: &[StrategyData]) -> Result<()> {
        let payload = self.save_payload(strategies)?;
        self.post("/save_result_v4", serde_json::json!(payload)).await?;
        Ok(())
    }

    /// v1 query: top-k with a relevance threshold over the session shard.
    pub async fn relevant_strategy_raw(
        &self,
        query: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<StrategyData>> {
        let resp = self
            .post(
                "/relevant_strategy_raw",
                serde_json::json!({
                    "query": query,
                    "agent_id": self.agent_id,
                    "session_id": self.session_id,
                    "top_k": top_k,
                    "threshold": threshold,
                }),
            )
            .await?;
        Ok(parse_strategy_response(resp))
    }

    /// v4 query: top-k over every session the agent has run.
    pub async fn relevant_strategy_raw_v4(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<StrategyData>> {
        let resp = self
            .post(
                "/relevant_strategy_raw_v4",
                serde_json::json!({
                    "query": query,
                    "agent_id": self.agent_id,
                    "top_k": top_k,
                }),
            )
            .await?;
        Ok(parse_strategy_response(resp))
    }
}

fn parse_strategy_response(resp: serde_json::Value) -> Vec<StrategyData> {
    let Ok(parsed) = serde_json::from_value::<StrategyResponse>(resp) else {
        return Vec::new();
    };
    parsed
        .data
        .into_iter()
        .filter_map(|page| serde_json::from_str(&page.metadata.strategy_data).ok())
        .collect()
}

#[async_trait]
impl StrategyRag for HttpIndex {
    async fn save_strategies(&self, strategies: &[StrategyData]) -> Result<()> {
        if strategies.is_empty() {
            return Ok(());
        }
        self.save_result_v4(strategies).await
    }

    async fn relevant_strategies(&self, query: &str, top_k: usize) -> Result<Vec<StrategyData>> {
        self.relevant_strategy_raw_v4(query, top_k).await
    }
}

// Wire types (deserialization only)

#[derive(Deserialize)]
struct StrategyResponse {
    #[serde(default)]
    data: Vec<PageContent>,
}

#[derive(Deserialize)]
struct PageContent {
    metadata: PageMetadata,
}

#[derive(Deserialize)]
struct PageMetadata {
    strategy_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_response_parses_payloads() {
        let strategy = StrategyData {
            strategy_id: "7".to_string(),
            agent_id: "phi".to_string(),
            summarized_desc: "short".to_string(),
            full_desc: "long".to_string(),
            parameters: Default::default(),
            strategy_result: "success".to_string(),
            created_at: "2025-03-01 10:00:00".to_string(),
        };
        let resp = serde_json::json!({
            "status": "success",
            "msg": "ok",
            "data": [{
                "page_content": "short",
                "metadata": {
                    "created_at": "2025-03-01 10:00:00",
                    "reference_id": "7",
                    "strategy_data": serde_json::to_string(&strategy).unwrap(),
                }
            }]
        });

        let parsed = parse_strategy_response(resp);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].strategy_id, "7");
    }

    #[test]
    fn malformed_response_parses_to_empty() {
        assert!(parse_strategy_response(serde_json::json!({"nope": true})).is_empty());
    }
}
