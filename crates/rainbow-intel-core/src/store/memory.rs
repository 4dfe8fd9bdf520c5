//! In-memory [`Store`] implementation for tests and demos.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Locks are only held
//! inside synchronous sections and never across an `.await`. Vector search
//! is brute-force cosine similarity over the bridge's embedded messages.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Bridge, Message, MessagePage, NewMessage, Platform, ScoredMessage};
use crate::rank;

use super::{validate_page, Store};

/// In-memory store for testing and offline demos.
#[derive(Default)]
pub struct InMemoryStore {
    bridges: RwLock<HashMap<String, Bridge>>,
    messages: RwLock<Vec<Message>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bridges(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Bridge>>> {
        self.bridges.read().map_err(|_| Error::store("bridge lock poisoned"))
    }

    fn bridges_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Bridge>>> {
        self.bridges.write().map_err(|_| Error::store("bridge lock poisoned"))
    }

    fn messages(&self) -> Result<RwLockReadGuard<'_, Vec<Message>>> {
        self.messages.read().map_err(|_| Error::store("message lock poisoned"))
    }

    fn messages_mut(&self) -> Result<RwLockWriteGuard<'_, Vec<Message>>> {
        self.messages.write().map_err(|_| Error::store("message lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_bridge(&self, bridge: &Bridge) -> Result<()> {
        let mut bridges = self.bridges_mut()?;
        if bridges.values().any(|b| b.api_token == bridge.api_token) {
            return Err(Error::Rejected("bridge token already in use".to_string()));
        }
        bridges.insert(bridge.id.clone(), bridge.clone());
        Ok(())
    }

    async fn get_bridge(&self, id: &str) -> Result<Option<Bridge>> {
        Ok(self.bridges()?.get(id).cloned())
    }

    async fn list_bridges(&self) -> Result<Vec<Bridge>> {
        let mut out: Vec<Bridge> = self.bridges()?.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn set_intelligence(&self, id: &str, enabled: bool) -> Result<bool> {
        Ok(match self.bridges_mut()?.get_mut(id) {
            Some(bridge) => {
                bridge.intelligence_enabled = enabled;
                true
            }
            None => false,
        })
    }

    async fn delete_bridge(&self, id: &str) -> Result<bool> {
        let removed = self.bridges_mut()?.remove(id).is_some();
        if removed {
            self.messages_mut()?.retain(|m| m.bridge_id != id);
        }
        Ok(removed)
    }

    async fn append(&self, message: &NewMessage) -> Result<String> {
        if !self.bridges()?.contains_key(&message.bridge_id) {
            return Err(Error::NotFound(format!("bridge {}", message.bridge_id)));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.messages_mut()?.push(Message {
            id: id.clone(),
            bridge_id: message.bridge_id.clone(),
            platform: message.platform,
            sender: message.sender.clone(),
            content: message.content.clone(),
            embedding: message.embedding.clone(),
            created_at: message.created_at,
        });
        Ok(id)
    }

    async fn top_k_similar(
        &self,
        bridge_id: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredMessage>> {
        let messages = self.messages()?;
        let owned = messages
            .iter()
            .filter(|m| m.bridge_id == bridge_id && m.embedding.is_some())
            .cloned();
        Ok(rank::top_k(owned, query_vec, k))
    }

    async fn count(&self, bridge_id: &str) -> Result<i64> {
        Ok(self
            .messages()?
            .iter()
            .filter(|m| m.bridge_id == bridge_id)
            .count() as i64)
    }

    async fn count_by_platform(&self, bridge_id: &str) -> Result<BTreeMap<Platform, i64>> {
        let mut counts = BTreeMap::new();
        for m in self.messages()?.iter().filter(|m| m.bridge_id == bridge_id) {
            *counts.entry(m.platform).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn recent(&self, bridge_id: &str, page: i64, page_size: i64) -> Result<MessagePage> {
        validate_page(page, page_size)?;
        let mut owned: Vec<Message> = self
            .messages()?
            .iter()
            .filter(|m| m.bridge_id == bridge_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = owned.len() as i64;
        let skip = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
        let take = usize::try_from(page_size).unwrap_or(usize::MAX);
        // history pages never carry vectors
        let messages = owned
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|m| Message {
                embedding: None,
                ..m
            })
            .collect();
        Ok(MessagePage::new(messages, total, page, page_size))
    }
}
