use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use stratagem_core::types::{
    NotificationRecord, SessionState, SessionStatus, StrategyData, StrategyInsertData,
    TIMESTAMP_FORMAT,
};
use stratagem_core::ChatHistory;

use crate::error::{Result, StoreError};
use crate::store::{effective_sources, OutcomeStore};

/// REST-backed outcome store. One endpoint family per entity:
/// `POST {base}/api_v1/<entity>/create|update|get`, `x-api-key` auth.
/// Duplicate suppression for notifications is the server's job; the
/// client-side read path still applies the source allow-list fallback.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/api_v1/{}", self.base_url, endpoint);
        debug!(%url, "store request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, endpoint, body = %message, "store API error");
            return Err(StoreError::Api { status, message });
        }

        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl OutcomeStore for HttpStore {
    async fn insert_strategy(&self, agent_id: &str, data: StrategyInsertData) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "strategies/create",
                serde_json::json!({
                    "agent_id": agent_id,
                    "summarized_desc": data.summarized_desc,
                    "full_desc": data.full_desc,
                    "parameters": data.parameters,
                    "strategy_result": data.strategy_result,
                }),
            )
            .await?;
        Ok(())
    }

    async fn fetch_latest_strategy(&self, agent_id: &str) -> Result<Option<StrategyData>> {
        let mut all = self.fetch_all_strategies(agent_id).await?;
        all.sort_by(|a, b| StrategyData::id_ordering(&a.strategy_id, &b.strategy_id));
        Ok(all.pop())
    }

    async fn fetch_all_strategies(&self, agent_id: &str) -> Result<Vec<StrategyData>> {
        let resp: DataEnvelope<Vec<ApiStrategy>> = self
            .post("strategies/get", serde_json::json!({ "agent_id": agent_id }))
            .await?;

        Ok(resp
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.into_strategy(agent_id))
            .collect())
    }

    async fn insert_chat_history(
        &self,
        session_id: &str,
        history: &ChatHistory,
        base_timestamp: Option<&str>,
    ) -> Result<()> {
        let base = base_timestamp
            .and_then(|raw| {
                chrono::NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
            })
            .unwrap_or_else(|| chrono::Utc::now().naive_utc());

        for (i, message) in history.messages().iter().enumerate() {
            let timestamp = (base + chrono::Duration::seconds(i as i64))
                .format(TIMESTAMP_FORMAT)
                .to_string();
            let _: serde_json::Value = self
                .post(
                    "chat_history/create",
                    serde_json::json!({
                        "session_id": session_id,
                        "message_type": message.role.as_str(),
                        "content": message.content,
                        "timestamp": timestamp,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn fetch_latest_notification_str(
        &self,
        sources: &[String],
        limit: usize,
    ) -> Result<String> {
        let sources = effective_sources(sources);

        let resp: DataEnvelope<Vec<ApiNotification>> = self
            .post(
                "notification/get_v3",
                serde_json::json!({ "sources": sources, "limit": limit }),
            )
            .await?;

        let mut seen: Vec<String> = Vec::new();
        for notification in resp.data.unwrap_or_default() {
            if !seen.contains(&notification.long_desc) {
                seen.push(notification.long_desc);
            }
        }
        Ok(seen.join("\n"))
    }

    async fn insert_notifications(&self, batch: &[NotificationRecord]) -> Result<Vec<String>> {
        let resp: serde_json::Value = self
            .post(
                "notification/create_batch",
                serde_json::json!({ "notifications": batch }),
            )
            .await?;

        let ids = resp
            .pointer("/data/notification_ids")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|id| match id {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn create_session(&self, session: &SessionState) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "agent_sessions/create",
                serde_json::json!({
                    "session_id": session.session_id,
                    "agent_id": session.agent_id,
                    "started_at": session.started_at,
                    "status": session.status.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionState>> {
        let resp: DataEnvelope<ApiSession> = self
            .post(
                "agent_sessions/get",
                serde_json::json!({ "session_id": session_id }),
            )
            .await?;

        Ok(resp.data.map(|s| s.into_session(session_id)))
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        agent_id: &str,
        status: SessionStatus,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "agent_sessions/update",
                serde_json::json!({
                    "session_id": session_id,
                    "agent_id": agent_id,
                    "status": status.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn increment_cycle_count(&self, session_id: &str, agent_id: &str) -> Result<()> {
        let current = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;

        let _: serde_json::Value = self
            .post(
                "agent_sessions/update",
                serde_json::json!({
                    "session_id": session_id,
                    "agent_id": agent_id,
                    "cycle_count": current.cycle_count + 1,
                }),
            )
            .await?;
        Ok(())
    }
}

// Wire types — tolerant of the service's loose field typing.

#[derive(serde::Deserialize)]
struct DataEnvelope<T> {
    #[serde(default)]
    data: Option<T>,
}

#[derive(serde::Deserialize)]
struct ApiStrategy {
    strategy_id: serde_json::Value,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    summarized_desc: String,
    #[serde(default)]
    full_desc: String,
    /// Either a JSON object or a JSON-encoded string, depending on the
    /// service version.
    #[serde(default)]
    parameters: serde_json::Value,
    #[serde(default)]
    strategy_result: String,
    #[serde(default)]
    created_at: String,
}

impl ApiStrategy {
    fn into_strategy(self, agent_id: &str) -> StrategyData {
        let strategy_id = match self.strategy_id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };

        let parameters: HashMap<String, serde_json::Value> = match self.parameters {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            serde_json::Value::String(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            _ => HashMap::new(),
        };

        StrategyData {
            strategy_id,
            agent_id: self.agent_id.unwrap_or_else(|| agent_id.to_string()),
            summarized_desc: self.summarized_desc,
            full_desc: self.full_desc,
            parameters,
            strategy_result: self.strategy_result,
            created_at: self.created_at,
        }
    }
}

#[derive(serde::Deserialize)]
struct ApiNotification {
    long_desc: String,
}

#[derive(serde::Deserialize, Default)]
struct ApiSession {
    #[serde(default)]
    session_id: Option<String>,
    agent_id: String,
    started_at: String,
    #[serde(default)]
    ended_at: Option<String>,
    status: String,
    #[serde(default)]
    cycle_count: u64,
    #[serde(default)]
    will_end_at: Option<String>,
}

impl ApiSession {
    fn into_session(self, session_id: &str) -> SessionState {
        SessionState {
            session_id: self.session_id.unwrap_or_else(|| session_id.to_string()),
            agent_id: self.agent_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            status: self.status.parse().unwrap_or(SessionStatus::Stopped),
            cycle_count: self.cycle_count,
            will_end_at: self.will_end_at,
        }
    }
}
