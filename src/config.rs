//! TOML configuration parsing, validation and provider-mode resolution.
//!
//! ```toml
//! [db]
//! path = "./data/rbi.sqlite"
//!
//! [provider]
//! api_key_env = "OPENAI_API_KEY"   # absent or "mock" → offline mode
//! timeout_secs = 30
//!
//! [embedding]
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! model = "gpt-4o"
//!
//! [retrieval]
//! k = 15
//!
//! [server]
//! bind = "127.0.0.1:3000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Credentials and transport settings shared by the embedding and chat
/// adapters.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Deadline for each live embedding or model call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Credential value that selects offline mode instead of a live call.
    #[serde(default = "default_mock_sentinel")]
    pub mock_sentinel: String,
    #[serde(default)]
    pub force_offline: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            mock_sentinel: default_mock_sentinel(),
            force_offline: false,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_mock_sentinel() -> String {
    "mock".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    rainbow_intel_core::embedding::DEFAULT_DIMS
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Pause between words when streaming offline answers.
    #[serde(default = "default_fragment_delay_ms")]
    pub offline_fragment_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            offline_fragment_delay_ms: default_fragment_delay_ms(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_fragment_delay_ms() -> u64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default fan-out for similarity search.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Upper bound accepted from callers.
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            max_k: default_max_k(),
        }
    }
}

impl RetrievalConfig {
    /// Resolve a caller-supplied `k`, clamped to `1..=max_k`.
    pub fn effective_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.k).clamp(1, self.max_k)
    }
}

fn default_k() -> usize {
    15
}
fn default_max_k() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> i64 {
    50
}
fn default_max_page_size() -> i64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

/// Which adapters back embeddings and answers, resolved once at startup.
#[derive(Clone, PartialEq, Eq)]
pub enum ProviderMode {
    Live { api_key: String },
    Offline,
}

impl ProviderMode {
    /// Resolve from the configured credential variable in the process environment.
    pub fn resolve(config: &ProviderConfig) -> Self {
        Self::from_credential(config, std::env::var(&config.api_key_env).ok())
    }

    /// Resolve from an explicit credential value. Absence, an empty value or
    /// the mock sentinel all select offline mode.
    pub fn from_credential(config: &ProviderConfig, credential: Option<String>) -> Self {
        if config.force_offline {
            return ProviderMode::Offline;
        }
        match credential.map(|c| c.trim().to_string()) {
            Some(key) if !key.is_empty() && key != config.mock_sentinel => {
                ProviderMode::Live { api_key: key }
            }
            _ => ProviderMode::Offline,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, ProviderMode::Offline)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderMode::Live { .. } => "live",
            ProviderMode::Offline => "offline",
        }
    }
}

impl std::fmt::Debug for ProviderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the key
        f.write_str(self.label())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }

    if config.provider.timeout_secs == 0 {
        bail!("provider.timeout_secs must be > 0");
    }

    if config.retrieval.k < 1 {
        bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.k > config.retrieval.max_k {
        bail!(
            "retrieval.k ({}) must not exceed retrieval.max_k ({})",
            config.retrieval.k,
            config.retrieval.max_k
        );
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.history.max_page_size < 1 {
        bail!("history.max_page_size must be >= 1");
    }
    if !(1..=config.history.max_page_size).contains(&config.history.default_page_size) {
        bail!(
            "history.default_page_size must be in [1, {}]",
            config.history.max_page_size
        );
    }

    Ok(())
}
