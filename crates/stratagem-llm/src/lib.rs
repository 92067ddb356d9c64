pub mod claude;
pub mod extract;
pub mod generator;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod stream;

pub use generator::{GenError, Generator};
pub use stream::{TokenSink, THINK_CLOSE, THINK_OPEN};

use std::sync::Arc;

use stratagem_core::config::LlmConfig;

/// Build a generator from config. `sink` enables token streaming when the
/// back-end supports it; pass `None` for request/response only.
pub fn build_generator(
    config: &LlmConfig,
    sink: Option<TokenSink>,
) -> Result<Arc<dyn Generator>, GenError> {
    match config.backend.as_str() {
        "openai" | "openrouter" | "deepseek" => Ok(Arc::new(openai::OpenAiGenerator::new(
            config.backend.clone(),
            config.api_key.clone(),
            config.base_url.clone(),
            config.model.clone(),
            config.max_tokens,
            sink,
        ))),
        "claude" => Ok(Arc::new(claude::ClaudeGenerator::new(
            config.anthropic_api_key.clone(),
            config.anthropic_base_url.clone(),
            config.model.clone(),
            config.max_tokens,
            sink,
        ))),
        "ollama" => Ok(Arc::new(ollama::OllamaGenerator::new(
            config.ollama_base_url.clone(),
            config.model.clone(),
            config.max_tokens,
            sink,
        ))),
        "mock" => Ok(Arc::new(mock::MockGenerator::new())),
        other => Err(GenError::Unsupported(other.to_string())),
    }
}
