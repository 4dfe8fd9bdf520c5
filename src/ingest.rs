//! Ingestion pipeline: relay event → authenticated → filtered → embedded → stored.
//!
//! Each inbound event is handled independently:
//!
//! 1. **Authenticate**: the gateway identifier must embed a bridge id
//!    (`bridge-<id>`, matched case-insensitively anywhere in the string),
//!    the bridge must exist with its intelligence layer enabled, and the
//!    bearer token must equal the bridge's token (constant-time compare).
//! 2. **Filter**: empty or whitespace-only text is acknowledged as
//!    [`IngestOutcome::Skipped`] so the relay does not retry it.
//! 3. **Classify**: the platform is derived from the account prefix
//!    (see [`Platform::from_account`]).
//! 4. **Embed**: a provider failure aborts the event with
//!    [`Error::EmbeddingFailed`]; nothing is written.
//! 5. **Store**: text and vector are appended as one row.
//!
//! Duplicate deliveries of the same event are stored twice.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use rainbow_intel_core::embedding::EmbeddingProvider;
use rainbow_intel_core::models::{Bridge, NewMessage, Platform};
use rainbow_intel_core::store::Store;
use rainbow_intel_core::{Error, Result};

/// Body posted by the relay for every bridged chat message.
///
/// The relay also sends `event`, `protocol`, `userid`, `avatar` and `id`;
/// those are accepted and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayEvent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub username: String,
    /// Gateway name, e.g. `bridge-7d1c…`.
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub channel: String,
    /// Account identifier, e.g. `slack.agency` or `msteams.contoso`.
    #[serde(default)]
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { id: String },
    /// Empty text, acknowledged without storing anything.
    Skipped,
}

/// Extract the token from an `Authorization` header value.
pub fn parse_bearer(header: Option<&str>) -> Result<&str> {
    let value = header.ok_or(Error::MissingCredentials)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(Error::MissingCredentials)?
        .trim();
    if token.is_empty() {
        return Err(Error::MissingCredentials);
    }
    Ok(token)
}

fn gateway_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)bridge-([a-f0-9-]+)").ok())
        .as_ref()
}

/// Resolve the bridge id embedded in a gateway identifier.
pub fn bridge_id_from_gateway(gateway: &str) -> Result<String> {
    gateway_pattern()
        .and_then(|re| re.captures(gateway))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .ok_or_else(|| Error::Rejected("invalid gateway format".into()))
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// The ingestion pipeline, holding its injected store and embedder.
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Resolve and authorize the bridge addressed by `gateway`.
    ///
    /// Unknown bridge, wrong token and disabled intelligence all produce the
    /// same [`Error::Unauthorized`].
    pub async fn authenticate(&self, token: &str, gateway: &str) -> Result<Bridge> {
        let bridge_id = bridge_id_from_gateway(gateway)?;

        let Some(bridge) = self.store.get_bridge(&bridge_id).await? else {
            warn!(bridge_id = %bridge_id, "ingest rejected: unknown bridge");
            return Err(Error::Unauthorized);
        };
        if !tokens_match(token, &bridge.api_token) {
            warn!(bridge_id = %bridge_id, "ingest rejected: token mismatch");
            return Err(Error::Unauthorized);
        }
        if !bridge.intelligence_enabled {
            warn!(bridge_id = %bridge_id, "ingest rejected: intelligence disabled");
            return Err(Error::Unauthorized);
        }
        Ok(bridge)
    }

    /// Run one relay event through the full pipeline.
    pub async fn ingest(&self, token: &str, event: &RelayEvent) -> Result<IngestOutcome> {
        let bridge = self.authenticate(token, &event.gateway).await?;
        let platform = Platform::from_account(&event.account);
        self.store_message(&bridge.id, platform, &event.username, &event.text)
            .await
    }

    /// Operator path used by `rbi ingest`: no token, platform `api`.
    pub async fn ingest_direct(
        &self,
        bridge_id: &str,
        sender: &str,
        text: &str,
    ) -> Result<IngestOutcome> {
        if self.store.get_bridge(bridge_id).await?.is_none() {
            return Err(Error::NotFound(format!("bridge {}", bridge_id)));
        }
        self.store_message(bridge_id, Platform::Api, sender, text)
            .await
    }

    async fn store_message(
        &self,
        bridge_id: &str,
        platform: Platform,
        sender: &str,
        text: &str,
    ) -> Result<IngestOutcome> {
        if text.trim().is_empty() {
            debug!(bridge_id, "ingest skipped: empty text");
            return Ok(IngestOutcome::Skipped);
        }

        let embedding = self.embedder.embed(text).await.map_err(|e| {
            warn!(bridge_id, error = %e, "ingest aborted: embedding failed");
            Error::embedding(e)
        })?;

        let id = self
            .store
            .append(&NewMessage {
                bridge_id: bridge_id.to_string(),
                platform,
                sender: sender.to_string(),
                content: text.to_string(),
                embedding: Some(embedding),
                created_at: Utc::now(),
            })
            .await?;

        info!(bridge_id, platform = %platform, message_id = %id, "message ingested");
        Ok(IngestOutcome::Stored { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rainbow_intel_core::embedding::OfflineEmbedder;
    use rainbow_intel_core::store::memory::InMemoryStore;

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::ProviderUnavailable("connection refused".into()))
        }
    }

    async fn setup(embedder: Arc<dyn EmbeddingProvider>) -> (IngestPipeline, Arc<InMemoryStore>, Bridge) {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Bridge::generate("acme");
        store.create_bridge(&bridge).await.unwrap();
        (IngestPipeline::new(store.clone(), embedder), store, bridge)
    }

    fn event(bridge: &Bridge, text: &str) -> RelayEvent {
        RelayEvent {
            text: text.into(),
            username: "ana".into(),
            gateway: format!("bridge-{}", bridge.id),
            channel: "general".into(),
            account: "slack.acme".into(),
        }
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer(Some("Bearer abc")).unwrap(), "abc");
        assert!(matches!(parse_bearer(None), Err(Error::MissingCredentials)));
        assert!(matches!(
            parse_bearer(Some("Basic abc")),
            Err(Error::MissingCredentials)
        ));
        assert!(matches!(
            parse_bearer(Some("Bearer   ")),
            Err(Error::MissingCredentials)
        ));
    }

    #[test]
    fn test_gateway_pattern() {
        assert_eq!(
            bridge_id_from_gateway("relay/BRIDGE-AB12-cd34").unwrap(),
            "ab12-cd34"
        );
        assert_eq!(bridge_id_from_gateway("bridge-0f").unwrap(), "0f");
        assert!(matches!(
            bridge_id_from_gateway("gateway1"),
            Err(Error::Rejected(_))
        ));
        assert!(matches!(
            bridge_id_from_gateway("bridge-xyz"),
            Err(Error::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_stores_with_platform() {
        let (pipeline, store, bridge) = setup(Arc::new(OfflineEmbedder::new(64))).await;
        let outcome = pipeline
            .ingest(&bridge.api_token, &event(&bridge, "deploy finished"))
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Stored { .. }));

        let page = store.recent(&bridge.id, 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.messages[0].platform, Platform::Slack);
        assert_eq!(page.messages[0].sender, "ana");
        assert!(page.messages[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_wrong_token_is_rejected_without_write() {
        let (pipeline, store, bridge) = setup(Arc::new(OfflineEmbedder::new(64))).await;
        let result = pipeline.ingest("not-the-token", &event(&bridge, "hi")).await;
        assert!(matches!(result, Err(Error::Unauthorized)));
        assert_eq!(store.count(&bridge.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_bridge_is_rejected() {
        let (pipeline, store, bridge) = setup(Arc::new(OfflineEmbedder::new(64))).await;
        store.set_intelligence(&bridge.id, false).await.unwrap();
        let result = pipeline
            .ingest(&bridge.api_token, &event(&bridge, "hi"))
            .await;
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn test_auth_precedes_empty_filter() {
        let (pipeline, _store, bridge) = setup(Arc::new(OfflineEmbedder::new(64))).await;
        let result = pipeline.ingest("wrong", &event(&bridge, "   ")).await;
        assert!(matches!(result, Err(Error::Unauthorized)));

        let ok = pipeline
            .ingest(&bridge.api_token, &event(&bridge, "   "))
            .await
            .unwrap();
        assert_eq!(ok, IngestOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let (pipeline, store, bridge) = setup(Arc::new(FailingEmbedder)).await;
        let result = pipeline
            .ingest(&bridge.api_token, &event(&bridge, "hello"))
            .await;
        match result {
            Err(e @ Error::EmbeddingFailed(_)) => assert!(e.is_retryable()),
            other => panic!("expected EmbeddingFailed, got {:?}", other),
        }
        assert_eq!(store.count(&bridge.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_direct_uses_api_platform() {
        let (pipeline, store, bridge) = setup(Arc::new(OfflineEmbedder::new(64))).await;
        pipeline
            .ingest_direct(&bridge.id, "operator", "manual note")
            .await
            .unwrap();
        let page = store.recent(&bridge.id, 1, 10).await.unwrap();
        assert_eq!(page.messages[0].platform, Platform::Api);

        assert!(matches!(
            pipeline.ingest_direct("missing", "op", "x").await,
            Err(Error::NotFound(_))
        ));
    }
}
