//! Embedding provider selection and the live OpenAI-compatible adapter.
//!
//! The [`EmbeddingProvider`] trait and the deterministic
//! [`OfflineEmbedder`] live in `rainbow-intel-core`; this module adds the
//! network-backed implementation and [`create_provider`], which picks one of
//! the two from the [`ProviderMode`] resolved at startup.
//!
//! ```rust,no_run
//! # use rainbow_intel::config::{load_config, ProviderMode};
//! # use rainbow_intel::embedding::create_provider;
//! # fn demo() -> anyhow::Result<()> {
//! let config = load_config(std::path::Path::new("config/rbi.toml"))?;
//! let mode = ProviderMode::resolve(&config.provider);
//! let provider = create_provider(&config, &mode)?;
//! println!("embedding with {} ({} dims)", provider.model_name(), provider.dims());
//! # Ok(())
//! # }
//! ```
//!
//! The live adapter never retries. Callers that want retries wrap the
//! operation with [`crate::retry::with_backoff`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

pub use rainbow_intel_core::embedding::{EmbeddingProvider, OfflineEmbedder};
use rainbow_intel_core::{Error, Result};

use crate::config::{Config, ProviderMode};
use crate::openai::{transport_error, with_deadline, OpenAiClient};

/// Embedding provider backed by `POST {base_url}/embeddings`.
pub struct OpenAIProvider {
    client: OpenAiClient,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(client: OpenAiClient, model: &str, dims: usize) -> Self {
        Self {
            client,
            model: model.to_string(),
            dims,
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.model,
            "input": text,
            "dimensions": self.dims,
        });
        let resp = self.client.post_json("/embeddings", &body).await?;
        let json: Value = resp.json().await.map_err(transport_error)?;
        parse_embedding(&json, self.dims)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_deadline(self.client.timeout(), "embedding request", self.request(text)).await
    }
}

/// Extract `data[0].embedding` and check its length against `dims`.
fn parse_embedding(json: &Value, dims: usize) -> Result<Vec<f32>> {
    let values = json["data"][0]["embedding"].as_array().ok_or_else(|| {
        Error::ProviderUnavailable("invalid embeddings response: missing data[0].embedding".into())
    })?;

    let vec = values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                Error::ProviderUnavailable("invalid embeddings response: non-numeric value".into())
            })
        })
        .collect::<Result<Vec<f32>>>()?;

    if vec.len() != dims {
        return Err(Error::ProviderUnavailable(format!(
            "embedding has {} dimensions, expected {}",
            vec.len(),
            dims
        )));
    }
    Ok(vec)
}

/// Build the embedding provider for `mode`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn create_provider(
    config: &Config,
    mode: &ProviderMode,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match mode {
        ProviderMode::Offline => Ok(Arc::new(OfflineEmbedder::new(config.embedding.dims))),
        ProviderMode::Live { api_key } => {
            let client = OpenAiClient::new(&config.provider, api_key)?;
            Ok(Arc::new(OpenAIProvider::new(
                client,
                &config.embedding.model,
                config.embedding.dims,
            )))
        }
    }
}
