use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SensorError};
use crate::MetricSensor;

/// Fallback count reported when the platform API is unreachable or no
/// credentials are configured.
pub const MOCK_COUNT: u64 = 27;

/// One post from the platform timeline, as the research prompts consume
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub author_username: Option<String>,
}

/// Reads follower and like counts for the authenticated account. Any
/// failure degrades to [`MOCK_COUNT`] so cycles keep moving.
pub struct MarketingSensor {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl MarketingSensor {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
    }

    pub async fn followers_or_default(&self) -> u64 {
        match self.public_metrics().await {
            Ok(metrics) => metrics.followers_count,
            Err(e) => {
                warn!(error = %e, "follower count read failed, defaulting");
                MOCK_COUNT
            }
        }
    }

    pub async fn likes_or_default(&self) -> u64 {
        match self.public_metrics().await {
            Ok(metrics) => metrics.like_count,
            Err(e) => {
                warn!(error = %e, "like count read failed, defaulting");
                MOCK_COUNT
            }
        }
    }

    /// Recent mentions of the authenticated account, newest first.
    /// Degrades to a small synthetic timeline so research prompts always
    /// have material.
    pub async fn recent_mentions_or_default(&self, limit: usize) -> Vec<Tweet> {
        match self.recent_mentions(limit).await {
            Ok(tweets) => tweets,
            Err(e) => {
                warn!(error = %e, "mentions read failed, using mock timeline");
                mock_tweets()
            }
        }
    }

    async fn recent_mentions(&self, limit: usize) -> Result<Vec<Tweet>> {
        if self.bearer_token.is_empty() {
            return Err(SensorError::MissingCredentials("bearer_token"));
        }

        let me = self.authenticated_user_id().await?;
        let url = format!(
            "{}/2/users/{}/mentions?max_results={}&tweet.fields=created_at",
            self.base_url, me, limit
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SensorError::Api { status, message });
        }

        let body: TweetsResponse = resp.json().await?;
        Ok(body.data)
    }

    async fn authenticated_user_id(&self) -> Result<String> {
        let url = format!("{}/2/users/me", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SensorError::Api { status, message });
        }

        let body: MeIdResponse = resp.json().await?;
        Ok(body.data.id)
    }

    async fn public_metrics(&self) -> Result<PublicMetrics> {
        if self.bearer_token.is_empty() {
            return Err(SensorError::MissingCredentials("bearer_token"));
        }

        let url = format!("{}/2/users/me?user.fields=public_metrics", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SensorError::Api { status, message });
        }

        let body: MeResponse = resp.json().await?;
        Ok(body.data.public_metrics)
    }
}

#[async_trait]
impl MetricSensor for MarketingSensor {
    async fn metric_state(&self, metric_name: &str) -> String {
        match metric_name {
            "followers" => self.followers_or_default().await.to_string(),
            "likes" => self.likes_or_default().await.to_string(),
            other => {
                warn!(metric = other, "unsupported marketing metric, reporting empty state");
                String::new()
            }
        }
    }
}

/// Synthetic timeline used when the platform is unreachable.
fn mock_tweets() -> Vec<Tweet> {
    vec![
        Tweet {
            id: "1750812345678901234".to_string(),
            text: "anyone else watching L2 fees this week? thread incoming".to_string(),
            created_at: "2025-01-31T09:45:00Z".to_string(),
            author_username: Some("chain_watcher".to_string()),
        },
        Tweet {
            id: "1750812345678901235".to_string(),
            text: "your bot posted the same chart twice, do better".to_string(),
            created_at: "2025-01-31T09:00:00Z".to_string(),
            author_username: Some("reply_guy_9000".to_string()),
        },
        Tweet {
            id: "1750812345678901236".to_string(),
            text: "loved the breakdown on restaking, more of that please".to_string(),
            created_at: "2025-01-31T08:10:00Z".to_string(),
            author_username: Some("yield_hunter".to_string()),
        },
    ]
}

// Wire types (deserialization only)

#[derive(Deserialize)]
struct MeResponse {
    data: UserData,
}

#[derive(Deserialize)]
struct MeIdResponse {
    data: UserId,
}

#[derive(Deserialize)]
struct UserId {
    id: String,
}

#[derive(Deserialize)]
struct TweetsResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Deserialize)]
struct UserData {
    public_metrics: PublicMetrics,
}

#[derive(Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    like_count: u64,
}
