//! Storage abstraction for Rainbow Intel.
//!
//! The [`Store`] trait defines every storage operation the ingestion and
//! answer pipeline needs, enabling pluggable backends (SQLite in the app
//! crate, [`memory::InMemoryStore`] here for tests and demos).
//!
//! # Tenant scoping
//!
//! Every message operation takes the owning bridge id and implementations
//! must filter on it themselves. Callers are never trusted to post-filter:
//! this is the isolation boundary between tenants.
//!
//! # Atomicity
//!
//! [`append`](Store::append) writes the text and its embedding as a single
//! row in one statement, so readers never observe a half-written vector.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Bridge, BridgeStats, MessagePage, NewMessage, Platform, ScoredMessage};

/// Number of messages shown in [`BridgeStats::recent_messages`].
pub const STATS_RECENT_LIMIT: i64 = 5;

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_bridge`](Store::create_bridge) | Register a bridge and its token |
/// | [`get_bridge`](Store::get_bridge) | Resolve a bridge by id |
/// | [`delete_bridge`](Store::delete_bridge) | Remove a bridge and all its messages |
/// | [`append`](Store::append) | Insert one message row |
/// | [`top_k_similar`](Store::top_k_similar) | Cosine-ranked retrieval |
/// | [`count`](Store::count) / [`count_by_platform`](Store::count_by_platform) | Counters |
/// | [`recent`](Store::recent) | Paginated history, newest first |
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_bridge(&self, bridge: &Bridge) -> Result<()>;

    async fn get_bridge(&self, id: &str) -> Result<Option<Bridge>>;

    async fn list_bridges(&self) -> Result<Vec<Bridge>>;

    /// Toggle the intelligence layer. Returns `false` if the bridge is unknown.
    async fn set_intelligence(&self, id: &str, enabled: bool) -> Result<bool>;

    /// Delete a bridge, cascading to its messages. Returns `false` if unknown.
    async fn delete_bridge(&self, id: &str) -> Result<bool>;

    /// Append a message and return its generated id.
    ///
    /// Fails with [`Error::NotFound`] when the bridge does not exist.
    async fn append(&self, message: &NewMessage) -> Result<String>;

    /// The `k` embedded messages of `bridge_id` most similar to `query_vec`,
    /// ordered as described in [`crate::rank`].
    async fn top_k_similar(
        &self,
        bridge_id: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredMessage>>;

    async fn count(&self, bridge_id: &str) -> Result<i64>;

    async fn count_by_platform(&self, bridge_id: &str) -> Result<BTreeMap<Platform, i64>>;

    /// One page (1-based) of history ordered by timestamp, newest first.
    async fn recent(&self, bridge_id: &str, page: i64, page_size: i64) -> Result<MessagePage>;

    /// Dashboard summary: totals, per-platform counts and the latest messages.
    async fn stats(&self, bridge_id: &str) -> Result<BridgeStats> {
        let total_messages = self.count(bridge_id).await?;
        let platform_breakdown = self.count_by_platform(bridge_id).await?;
        let recent = self.recent(bridge_id, 1, STATS_RECENT_LIMIT).await?;
        Ok(BridgeStats {
            total_messages,
            platform_breakdown,
            recent_messages: recent.messages,
        })
    }
}

/// Reject non-positive paging arguments.
pub fn validate_page(page: i64, page_size: i64) -> Result<()> {
    if page < 1 {
        return Err(Error::Rejected(format!("page must be >= 1, got {}", page)));
    }
    if page_size < 1 {
        return Err(Error::Rejected(format!(
            "pageSize must be >= 1, got {}",
            page_size
        )));
    }
    Ok(())
}
