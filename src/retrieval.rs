//! Retrieval engine: embed the query, then rank the bridge's history.

use std::sync::Arc;

use tracing::debug;

use rainbow_intel_core::embedding::EmbeddingProvider;
use rainbow_intel_core::models::RetrievalResult;
use rainbow_intel_core::store::Store;
use rainbow_intel_core::Result;

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// The `k` stored messages of `bridge_id` most similar to `query`.
    ///
    /// An empty result is not an error: the bridge simply has no embedded
    /// history yet. The query text is passed to the embedder unmodified.
    pub async fn retrieve(&self, bridge_id: &str, query: &str, k: usize) -> Result<RetrievalResult> {
        let query_vec = self.embedder.embed(query).await?;
        let hits = self.store.top_k_similar(bridge_id, &query_vec, k).await?;
        debug!(bridge_id, k, hits = hits.len(), "retrieved context");
        Ok(RetrievalResult::new(hits))
    }
}
