use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Timestamp format used for persisted rows (`2025-03-01 14:05:09`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The two agent kinds the runner knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Trading,
    Marketing,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Trading => f.write_str("trading"),
            AgentKind::Marketing => f.write_str("marketing"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "trading" => Ok(AgentKind::Trading),
            "marketing" => Ok(AgentKind::Marketing),
            other => Err(format!("unknown agent kind: {}", other)),
        }
    }
}

/// A completed cycle's record: what the agent decided, what came of it.
/// Immutable once written; `strategy_id` is unique per agent and assigned
/// by the outcome store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyData {
    pub strategy_id: String,
    pub agent_id: String,
    pub summarized_desc: String,
    pub full_desc: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub strategy_result: String,
    pub created_at: String,
}

impl StrategyData {
    /// Numeric-then-lexical id comparison, used to tie-break "latest".
    pub fn id_ordering(a: &str, b: &str) -> std::cmp::Ordering {
        match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        }
    }

    /// String-valued parameter lookup, `None` when absent or non-string.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// Write-side projection of [`StrategyData`]: the store assigns
/// `strategy_id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInsertData {
    pub summarized_desc: String,
    pub full_desc: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub strategy_result: String,
}

/// Outcome tag values for `strategy_result`.
pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_FAILED: &str = "failed";

/// A single scraped event. Two records are the same event when their
/// `relative_to_scraper_id`s match or their `long_desc`s match; insertion
/// is idempotent on either key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub source: String,
    pub short_desc: String,
    pub long_desc: String,
    pub notification_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_to_scraper_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Stopped => f.write_str("stopped"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "stopped" => Ok(SessionStatus::Stopped),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// One driver invocation's row. At most one `running` session exists per
/// agent at any time; the store enforces this on create/update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub agent_id: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub status: SessionStatus,
    pub cycle_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_end_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_kind_round_trips() {
        for kind in [AgentKind::Trading, AgentKind::Marketing] {
            assert_eq!(kind.to_string().parse::<AgentKind>().unwrap(), kind);
        }
        assert!("gardening".parse::<AgentKind>().is_err());
    }

    #[test]
    fn id_ordering_prefers_numeric() {
        use std::cmp::Ordering;
        assert_eq!(StrategyData::id_ordering("9", "10"), Ordering::Less);
        assert_eq!(StrategyData::id_ordering("abc", "abd"), Ordering::Less);
    }

    #[test]
    fn session_status_round_trips() {
        assert_eq!(
            "running".parse::<SessionStatus>().unwrap(),
            SessionStatus::Running
        );
        assert_eq!(SessionStatus::Stopped.to_string(), "stopped");
    }
}
