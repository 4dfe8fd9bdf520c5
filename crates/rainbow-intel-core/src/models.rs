//! Core data models used throughout Rainbow Intel.
//!
//! These types represent the bridges (tenants), ingested messages and
//! retrieval results that flow through the ingestion and answer pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One configured Slack ↔ Teams pairing and its isolated message archive.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    pub id: String,
    pub name: String,
    /// Sole authentication factor for relay traffic. Never serialized.
    #[serde(skip_serializing)]
    pub api_token: String,
    pub intelligence_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Bridge {
    /// Build a fresh bridge with a newly generated id and bearer token.
    pub fn generate(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            api_token: uuid::Uuid::new_v4().to_string(),
            intelligence_enabled: true,
            created_at: Utc::now(),
        }
    }
}

/// Source platform of an ingested message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Slack,
    Teams,
    Api,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Slack => "slack",
            Platform::Teams => "teams",
            Platform::Api => "api",
            Platform::Unknown => "unknown",
        }
    }

    /// Classify a relay account identifier such as `slack.agency` or
    /// `msteams.contoso`.
    ///
    /// This is best-effort prefix matching on a free-form relay field, not a
    /// protocol guarantee: anything unrecognised becomes [`Platform::Unknown`].
    pub fn from_account(account: &str) -> Self {
        if account.starts_with("slack.") {
            Platform::Slack
        } else if account.starts_with("msteams.") {
            Platform::Teams
        } else if account.starts_with("api.") {
            Platform::Api
        } else {
            Platform::Unknown
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slack" => Ok(Platform::Slack),
            "teams" => Ok(Platform::Teams),
            "api" => Ok(Platform::Api),
            "unknown" => Ok(Platform::Unknown),
            other => Err(Error::StoreUnavailable(format!(
                "unrecognised platform value in store: {}",
                other
            ))),
        }
    }
}

/// A message to be appended to the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub bridge_id: String,
    pub platform: Platform,
    pub sender: String,
    pub content: String,
    /// `None` keeps the row out of similarity search.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// One ingested chat event as stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub bridge_id: String,
    pub platform: Platform,
    pub sender: String,
    pub content: String,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A stored message paired with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredMessage {
    pub message: Message,
    pub similarity: f64,
}

/// Ranked messages for a single query, most similar first.
///
/// Ephemeral: valid only for the query that produced it.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredMessage>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredMessage>) -> Self {
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.hits.iter().map(Source::from).collect()
    }
}

/// Citation shape returned alongside non-streamed answers.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub sender: String,
    pub platform: Platform,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub similarity: f64,
}

impl From<&ScoredMessage> for Source {
    fn from(hit: &ScoredMessage) -> Self {
        Self {
            sender: hit.message.sender.clone(),
            platform: hit.message.platform,
            content: hit.message.content.clone(),
            timestamp: hit.message.created_at,
            similarity: hit.similarity,
        }
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl MessagePage {
    pub fn new(messages: Vec<Message>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            total / page_size + i64::from(total % page_size != 0)
        } else {
            0
        };
        Self {
            messages,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// Dashboard summary for one bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    pub total_messages: i64,
    pub platform_breakdown: BTreeMap<Platform, i64>,
    pub recent_messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A role-tagged conversation turn exchanged with the UI and the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
