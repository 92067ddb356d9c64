use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Hard wall-clock bound for one sandboxed script run.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 150;
/// Pause between driver-loop cycles.
pub const DEFAULT_PACING_SECS: u64 = 15;
/// ETH held back for gas when computing the tradable balance.
pub const ETH_GAS_RESERVE: f64 = 0.01;

/// Top-level config (stratagem.toml + STRATAGEM_* env overrides).
///
/// Every credential defaults to the empty string; components treat a
/// missing credential as "use the mock path" rather than failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub social: SocialConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// URLs and keys for the collaborating services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Manager (front-end) service — session settings + token push.
    #[serde(default)]
    pub manager_url: String,
    /// Outcome store REST service.
    #[serde(default)]
    pub store_url: String,
    #[serde(default)]
    pub store_api_key: String,
    /// Remote semantic-index service.
    #[serde(default)]
    pub rag_url: String,
    /// Transaction signer service (swap/quote/addresses).
    #[serde(default)]
    pub signer_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which back-end drives generation: "openai", "claude", or "mock".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub api_key: String,
    /// OpenAI-compatible base URL; also covers OpenRouter and DeepSeek.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub anthropic_api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
    /// Embeddings endpoint for the local semantic index.
    #[serde(default)]
    pub embed_api_key: String,
    #[serde(default = "default_embed_base_url")]
    pub embed_base_url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_key: String::new(),
            base_url: default_llm_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            anthropic_api_key: String::new(),
            anthropic_base_url: default_anthropic_base_url(),
            ollama_base_url: default_ollama_base_url(),
            embed_api_key: String::new(),
            embed_base_url: default_embed_base_url(),
            embed_model: default_embed_model(),
        }
    }
}

/// Read-only chain access for the trading sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC node URL (balance reads).
    #[serde(default)]
    pub rpc_url: String,
    /// Transfer indexer (Etherscan-shaped `tokentx` API).
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,
    #[serde(default)]
    pub indexer_api_key: String,
    /// Public price oracle (CoinGecko-shaped simple-price API).
    #[serde(default = "default_price_oracle_url")]
    pub price_oracle_url: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            indexer_url: default_indexer_url(),
            indexer_api_key: String::new(),
            price_oracle_url: default_price_oracle_url(),
        }
    }
}

/// Social platform access for the marketing sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    #[serde(default = "default_social_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: String,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            base_url: default_social_base_url(),
            bearer_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Container name. Must be unique per driver process — two processes
    /// sharing a container is undefined behavior.
    #[serde(default = "default_container_name")]
    pub container_name: String,
    #[serde(default = "default_container_image")]
    pub image: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            image: default_container_image(),
            cache_dir: default_cache_dir(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_pacing_secs")]
    pub pacing_secs: u64,
    /// Directory for local semantic-index shards.
    #[serde(default = "default_rag_dir")]
    pub rag_dir: String,
    /// SQLite path used when no store service is configured.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pacing_secs: default_pacing_secs(),
            rag_dir: default_rag_dir(),
            db_path: default_db_path(),
        }
    }
}

fn default_backend() -> String {
    "openai".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    8_192
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embed_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_indexer_url() -> String {
    "https://api.etherscan.io/api".to_string()
}
fn default_price_oracle_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_social_base_url() -> String {
    "https://api.twitter.com".to_string()
}
fn default_container_name() -> String {
    "agent-executor".to_string()
}
fn default_container_image() -> String {
    "agent-executor-python".to_string()
}
fn default_cache_dir() -> String {
    "./code".to_string()
}
fn default_run_timeout_secs() -> u64 {
    DEFAULT_RUN_TIMEOUT_SECS
}
fn default_pacing_secs() -> u64 {
    DEFAULT_PACING_SECS
}
fn default_rag_dir() -> String {
    "./rag".to_string()
}
fn default_db_path() -> String {
    "./stratagem.db".to_string()
}

impl Config {
    /// Load config from a TOML file with STRATAGEM_* env var overrides.
    /// Nested keys use a double underscore: `STRATAGEM_SANDBOX__IMAGE`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("stratagem.toml");

        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STRATAGEM_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.sandbox.run_timeout_secs, 150);
        assert_eq!(config.runner.pacing_secs, 15);
        assert_eq!(config.sandbox.container_name, "agent-executor");
        assert!(config.services.store_api_key.is_empty());
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let config = Config::load(Some("/nonexistent/stratagem.toml")).unwrap();
        assert_eq!(config.llm.backend, "openai");
        assert_eq!(config.runner.rag_dir, "./rag");
    }
}
