//! SQLite-backed [`Store`] implementation.
//!
//! Timestamps are stored as unix milliseconds and embeddings as
//! little-endian `f32` BLOBs (see [`vec_to_blob`]). Similarity is computed
//! in Rust over the bridge's embedded rows with the shared ranking in
//! [`rainbow_intel_core::rank`], so SQLite and the in-memory store order
//! results identically.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use rainbow_intel_core::embedding::{blob_to_vec, vec_to_blob};
use rainbow_intel_core::models::{
    Bridge, Message, MessagePage, NewMessage, Platform, ScoredMessage,
};
use rainbow_intel_core::rank;
use rainbow_intel_core::store::{validate_page, Store};
use rainbow_intel_core::{Error, Result};

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn db_err(err: sqlx::Error) -> Error {
    Error::store(err)
}

fn ts_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_bridge(row: &SqliteRow) -> Result<Bridge> {
    Ok(Bridge {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        api_token: row.try_get("api_token").map_err(db_err)?,
        intelligence_enabled: row.try_get("intelligence_enabled").map_err(db_err)?,
        created_at: ts_from_millis(row.try_get("created_at").map_err(db_err)?),
    })
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let platform: String = row.try_get("platform").map_err(db_err)?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding").map_err(db_err)?;
    Ok(Message {
        id: row.try_get("id").map_err(db_err)?,
        bridge_id: row.try_get("bridge_id").map_err(db_err)?,
        platform: platform.parse()?,
        sender: row.try_get("sender").map_err(db_err)?,
        content: row.try_get("content").map_err(db_err)?,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        created_at: ts_from_millis(row.try_get("created_at").map_err(db_err)?),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_bridge(&self, bridge: &Bridge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bridges (id, name, api_token, intelligence_enabled, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bridge.id)
        .bind(&bridge.name)
        .bind(&bridge.api_token)
        .bind(bridge.intelligence_enabled)
        .bind(bridge.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Rejected(format!("bridge {} or its token already exists", bridge.id))
            }
            _ => db_err(e),
        })?;
        Ok(())
    }

    async fn get_bridge(&self, id: &str) -> Result<Option<Bridge>> {
        let row = sqlx::query(
            "SELECT id, name, api_token, intelligence_enabled, created_at FROM bridges WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_bridge).transpose()
    }

    async fn list_bridges(&self) -> Result<Vec<Bridge>> {
        let rows = sqlx::query(
            "SELECT id, name, api_token, intelligence_enabled, created_at FROM bridges ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_bridge).collect()
    }

    async fn set_intelligence(&self, id: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE bridges SET intelligence_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_bridge(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bridges WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn append(&self, message: &NewMessage) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let blob = message.embedding.as_deref().map(vec_to_blob);

        sqlx::query(
            r#"
            INSERT INTO messages (id, bridge_id, platform, sender, content, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&message.bridge_id)
        .bind(message.platform.as_str())
        .bind(&message.sender)
        .bind(&message.content)
        .bind(blob)
        .bind(message.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Error::NotFound(format!("bridge {}", message.bridge_id))
            }
            _ => db_err(e),
        })?;

        Ok(id)
    }

    async fn top_k_similar(
        &self,
        bridge_id: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredMessage>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, bridge_id, platform, sender, content, embedding, created_at
            FROM messages
            WHERE bridge_id = ? AND embedding IS NOT NULL
            "#,
        )
        .bind(bridge_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>>>()?;

        Ok(rank::top_k(messages, query_vec, k))
    }

    async fn count(&self, bridge_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM messages WHERE bridge_id = ?")
            .bind(bridge_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row.try_get("cnt").map_err(db_err)
    }

    async fn count_by_platform(&self, bridge_id: &str) -> Result<BTreeMap<Platform, i64>> {
        let rows = sqlx::query(
            "SELECT platform, COUNT(*) AS cnt FROM messages WHERE bridge_id = ? GROUP BY platform",
        )
        .bind(bridge_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut counts = BTreeMap::new();
        for row in &rows {
            let platform: String = row.try_get("platform").map_err(db_err)?;
            let cnt: i64 = row.try_get("cnt").map_err(db_err)?;
            counts.insert(platform.parse()?, cnt);
        }
        Ok(counts)
    }

    async fn recent(&self, bridge_id: &str, page: i64, page_size: i64) -> Result<MessagePage> {
        validate_page(page, page_size)?;

        let total = self.count(bridge_id).await?;
        let rows = sqlx::query(
            r#"
            SELECT id, bridge_id, platform, sender, content, NULL AS embedding, created_at
            FROM messages
            WHERE bridge_id = ?
            ORDER BY created_at DESC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(bridge_id)
        .bind(page_size)
        .bind((page - 1).saturating_mul(page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>>>()?;

        Ok(MessagePage::new(messages, total, page, page_size))
    }
}
