//! Service container.
//!
//! Every long-lived client (SQLite pool, embedding provider, chat model) is
//! constructed once here and handed to the pipeline components, which hold
//! them behind `Arc`s. Tests build [`Services`] directly from fakes with
//! [`Services::new`].

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use rainbow_intel_core::embedding::EmbeddingProvider;
use rainbow_intel_core::store::Store;

use crate::answer::Synthesizer;
use crate::config::{Config, ProviderMode};
use crate::embedding::create_provider;
use crate::gateway::ConversationGateway;
use crate::ingest::IngestPipeline;
use crate::llm::{create_chat_model, ChatModel};
use crate::retrieval::Retriever;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub mode: ProviderMode,
    pub store: Arc<dyn Store>,
    pub ingest: IngestPipeline,
    pub gateway: ConversationGateway,
}

impl Services {
    pub fn new(
        config: Config,
        mode: ProviderMode,
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let ingest = IngestPipeline::new(store.clone(), embedder.clone());
        let gateway = ConversationGateway::new(
            store.clone(),
            Retriever::new(store.clone(), embedder),
            Synthesizer::new(model),
            config.retrieval.clone(),
        );
        Self {
            config: Arc::new(config),
            mode,
            store,
            ingest,
            gateway,
        }
    }

    /// Resolve the provider mode from the environment, open the database
    /// (creating the schema if needed) and build the adapters.
    pub async fn open(config: &Config) -> Result<Self> {
        let mode = ProviderMode::resolve(&config.provider);
        Self::open_with_mode(config, mode).await
    }

    pub async fn open_with_mode(config: &Config, mode: ProviderMode) -> Result<Self> {
        info!(mode = mode.label(), "provider mode resolved");

        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

        let embedder = create_provider(config, &mode)?;
        let model = create_chat_model(config, &mode)?;

        Ok(Self::new(config.clone(), mode, store, embedder, model))
    }
}
