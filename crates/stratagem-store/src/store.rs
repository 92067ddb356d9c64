use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::warn;

use stratagem_core::types::{
    NotificationRecord, SessionState, SessionStatus, StrategyData, StrategyInsertData,
};
use stratagem_core::ChatHistory;

use crate::error::Result;

/// Sources the notification pipeline is known to scrape. Requests naming
/// anything else are replaced wholesale by two random picks from this list.
pub const ALLOWED_NOTIFICATION_SOURCES: &[&str] = &[
    "animals_news",
    "business_news",
    "crypto_news",
    "entertainment_news",
    "general_news",
    "health_news",
    "politics_news",
    "science_news",
    "sports_news",
    "technology_news",
    "twitter_feed",
    "twitter_mentions",
    "world_news_news",
    "ats",
];

/// Validate a requested source set against the allow-list. Any unknown
/// name invalidates the whole request and two random allowed sources are
/// used instead, so a misconfigured agent still gets fresh material.
pub fn effective_sources(requested: &[String]) -> Vec<String> {
    let all_known = requested
        .iter()
        .all(|s| ALLOWED_NOTIFICATION_SOURCES.contains(&s.as_str()));

    if all_known && !requested.is_empty() {
        return requested.to_vec();
    }

    warn!(?requested, "unknown notification source, sampling two allowed sources");
    let mut rng = rand::thread_rng();
    ALLOWED_NOTIFICATION_SOURCES
        .choose_multiple(&mut rng, 2)
        .map(|s| s.to_string())
        .collect()
}

/// Persistence contract shared by the HTTP-backed and SQLite-backed
/// stores. The store owns `strategy_id` assignment and must hand out
/// strictly increasing ids per agent.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn insert_strategy(&self, agent_id: &str, data: StrategyInsertData) -> Result<()>;

    /// Most recent strategy for the agent; ties break toward the largest
    /// `strategy_id`.
    async fn fetch_latest_strategy(&self, agent_id: &str) -> Result<Option<StrategyData>>;

    async fn fetch_all_strategies(&self, agent_id: &str) -> Result<Vec<StrategyData>>;

    /// Persist every message of `history`. Message timestamps derive from
    /// `base_timestamp` (or now) plus the message index in seconds, so the
    /// stored order survives second-granularity sorting.
    async fn insert_chat_history(
        &self,
        session_id: &str,
        history: &ChatHistory,
        base_timestamp: Option<&str>,
    ) -> Result<()>;

    /// Newline-joined recent `long_desc`s: up to `limit` per source, most
    /// recent first within a source, deduplicated across the result.
    async fn fetch_latest_notification_str(
        &self,
        sources: &[String],
        limit: usize,
    ) -> Result<String>;

    /// Batch insert with duplicate suppression (same
    /// `relative_to_scraper_id` OR same `long_desc` is the same event).
    /// Returns ids of the records actually inserted.
    async fn insert_notifications(&self, batch: &[NotificationRecord]) -> Result<Vec<String>>;

    async fn create_session(&self, session: &SessionState) -> Result<()>;

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionState>>;

    async fn update_session_status(
        &self,
        session_id: &str,
        agent_id: &str,
        status: SessionStatus,
    ) -> Result<()>;

    async fn increment_cycle_count(&self, session_id: &str, agent_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sources_pass_through() {
        let requested = vec!["crypto_news".to_string(), "twitter_feed".to_string()];
        assert_eq!(effective_sources(&requested), requested);
    }

    #[test]
    fn unknown_source_samples_two_allowed() {
        let requested = vec!["moon_phase".to_string()];
        let chosen = effective_sources(&requested);
        assert_eq!(chosen.len(), 2);
        for source in &chosen {
            assert!(ALLOWED_NOTIFICATION_SOURCES.contains(&source.as_str()));
        }
    }

    #[test]
    fn empty_request_samples_two_allowed() {
        let chosen = effective_sources(&[]);
        assert_eq!(chosen.len(), 2);
    }
}
