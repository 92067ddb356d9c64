//! Manager-service client: start-of-session settings ingress (SSE) and the
//! token push sink for streaming generator output back to the front end.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use stratagem_core::types::AgentKind;

/// Session settings as the front end configures them. Anything it leaves
/// out keeps the kind's defaults; custom prompt slots are overlaid on the
/// default templates by the prompt registry at construction.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub role: String,
    pub time: String,
    pub metric_name: String,
    pub research_tools: Vec<String>,
    pub trading_instruments: Vec<String>,
    pub notification_sources: Vec<String>,
    pub prompts: HashMap<String, String>,
}

impl SessionSettings {
    pub fn defaults(kind: AgentKind) -> Self {
        match kind {
            AgentKind::Trading => Self {
                role: "terse, funny, curious, philosophical".to_string(),
                time: "24h".to_string(),
                metric_name: "wallet".to_string(),
                research_tools: vec!["CoinGecko".to_string(), "DuckDuckGo".to_string()],
                trading_instruments: vec!["spot".to_string()],
                notification_sources: vec!["crypto_news".to_string()],
                prompts: HashMap::new(),
            },
            AgentKind::Marketing => Self {
                role: "terse, funny, curious, philosophical".to_string(),
                time: "24h".to_string(),
                metric_name: "followers".to_string(),
                research_tools: vec![
                    "Twitter".to_string(),
                    "CoinGecko".to_string(),
                    "DuckDuckGo".to_string(),
                ],
                trading_instruments: Vec::new(),
                notification_sources: vec!["twitter_mentions".to_string()],
                prompts: HashMap::new(),
            },
        }
    }

    fn apply_payload(&mut self, payload: &serde_json::Value) {
        if let Some(role) = payload.get("role").and_then(|v| v.as_str()) {
            self.role = role.to_string();
        }
        if let Some(time) = payload.get("time").and_then(|v| v.as_str()) {
            self.time = time.to_string();
        }
        if let Some(metric) = payload.get("metric_name").and_then(|v| v.as_str()) {
            self.metric_name = metric.to_string();
        }
        if let Some(tools) = string_list(payload.get("research_tools")) {
            self.research_tools = tools;
        }
        if let Some(instruments) = string_list(payload.get("trading_instruments")) {
            self.trading_instruments = instruments;
        }
        if let Some(sources) = string_list(payload.get("notifications")) {
            self.notification_sources = sources;
        }
        if let Some(prompts) = payload.get("prompts").and_then(|v| v.as_array()) {
            for entry in prompts {
                if let (Some(name), Some(prompt)) = (
                    entry.get("name").and_then(|v| v.as_str()),
                    entry.get("prompt").and_then(|v| v.as_str()),
                ) {
                    self.prompts.insert(name.to_string(), prompt.to_string());
                }
            }
        }
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Option<Vec<String>> {
    value.and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()
    })
}

pub struct ManagerClient {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl ManagerClient {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            session_id: session_id.into(),
        }
    }

    /// Fire-and-forget: push one streamed token to the session log.
    pub fn push_token(&self, token: &str) {
        let url = format!(
            "{}/sessions/{}/push_token",
            self.base_url, self.session_id
        );
        let body = serde_json::json!({ "type": "log", "message": token });
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&body).send().await {
                debug!(error = %e, "token push failed");
            }
        });
    }

    /// Read the session's configuration payload from the SSE log stream.
    /// Any failure — unreachable service, malformed stream, no request
    /// entry — falls back to the kind's defaults.
    pub async fn fetch_session_settings(&self, kind: AgentKind) -> SessionSettings {
        let mut settings = SessionSettings::defaults(kind);

        match self.read_request_payload().await {
            Ok(Some(payload)) => {
                info!("applying session settings from manager");
                settings.apply_payload(&payload);
            }
            Ok(None) => info!("no session settings published, using defaults"),
            Err(e) => warn!(error = %e, "settings ingress failed, using defaults"),
        }

        settings
    }

    async fn read_request_payload(&self) -> anyhow::Result<Option<serde_json::Value>> {
        use futures_util::StreamExt;

        let url = format!("{}/sessions/{}/logs", self.base_url, self.session_id);
        let resp = self
            .client
            .get(&url)
            .header("accept", "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let mut line_buf = String::new();
        let mut byte_stream = resp.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            let Ok(text) = std::str::from_utf8(&chunk) else {
                continue;
            };
            line_buf.push_str(text);

            let mut lines: Vec<String> = line_buf.split('\n').map(str::to_string).collect();
            line_buf = lines.pop().unwrap_or_default();

            for line in lines {
                let Some(data) = line.trim().strip_prefix("data: ") else {
                    continue;
                };
                let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                    continue;
                };
                let Some(logs) = event.get("logs").and_then(|v| v.as_str()) else {
                    continue;
                };
                // first log entry carries the configuration request
                let Some(first) = logs.trim().lines().next() else {
                    continue;
                };
                let Ok(entry) = serde_json::from_str::<serde_json::Value>(first) else {
                    continue;
                };
                if entry.get("type").and_then(|v| v.as_str()) == Some("request") {
                    return Ok(entry.get("payload").cloned());
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_differ_per_kind() {
        let trading = SessionSettings::defaults(AgentKind::Trading);
        assert_eq!(trading.metric_name, "wallet");
        assert_eq!(trading.trading_instruments, vec!["spot"]);

        let marketing = SessionSettings::defaults(AgentKind::Marketing);
        assert_eq!(marketing.metric_name, "followers");
        assert!(marketing.trading_instruments.is_empty());
    }

    #[test]
    fn payload_overlays_defaults_and_collects_prompts() {
        let mut settings = SessionSettings::defaults(AgentKind::Trading);
        settings.apply_payload(&serde_json::json!({
            "role": "cautious",
            "metric_name": "wallet",
            "research_tools": ["Etherscan"],
            "notifications": ["crypto_news", "business_news"],
            "prompts": [
                {"name": "system_prompt", "prompt": "You are {role} at {metric_state} aiming for {metric_name} within {time} on {today_date}"},
                {"not_a_name": true}
            ]
        }));

        assert_eq!(settings.role, "cautious");
        assert_eq!(settings.research_tools, vec!["Etherscan"]);
        assert_eq!(settings.notification_sources.len(), 2);
        assert_eq!(settings.prompts.len(), 1);
        assert_eq!(settings.time, "24h");
    }
}
