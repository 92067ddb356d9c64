use async_trait::async_trait;

use stratagem_core::ChatHistory;

use crate::extract;

/// Uniform interface over heterogeneous model back-ends.
///
/// All three operations run one completion over the supplied history;
/// `generate_code` and `generate_list` additionally extract structured
/// content and fail with [`GenError::Extract`] when the response is
/// malformed — the orchestrator's retry loop decides what to do with that.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Back-end name for logging and error messages.
    fn name(&self) -> &str;

    /// One completion; returns the full assembled text. When a sink is
    /// configured, tokens are delivered to it in order, and reasoning
    /// tokens (if the back-end produces them) are streamed but excluded
    /// from the returned text.
    async fn chat_completion(&self, history: &ChatHistory) -> Result<String, GenError>;

    /// Completion + python-fence extraction: one snippet per entry in
    /// `blocks` (an empty tag means "the whole response"). Returns the
    /// snippets and the raw response.
    async fn generate_code(
        &self,
        history: &ChatHistory,
        blocks: &[&str],
    ) -> Result<(Vec<String>, String), GenError> {
        let raw = self.chat_completion(history).await?;
        let snippets = extract::extract_code(&raw, blocks)?;
        Ok((snippets, raw))
    }

    /// Completion + yaml-fence extraction: one string sequence per entry
    /// in `blocks`. Returns the sequences and the raw response.
    async fn generate_list(
        &self,
        history: &ChatHistory,
        blocks: &[&str],
    ) -> Result<(Vec<Vec<String>>, String), GenError> {
        let raw = self.chat_completion(history).await?;
        let lists = extract::extract_list(&raw, blocks)?;
        Ok((lists, raw))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Empty response from back-end")]
    EmptyResponse,

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("Back-end unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported back-end: {0}")]
    Unsupported(String),
}
