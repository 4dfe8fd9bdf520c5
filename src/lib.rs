//! # Rainbow Intel
//!
//! Retrieval-augmented intelligence layer for Slack ↔ Teams bridges.
//!
//! Every message a bridge relays is embedded and stored per bridge; users
//! then ask questions about the project history and get answers grounded
//! on the most similar stored messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐  webhook  ┌──────────────┐   ┌──────────┐
//! │  Relay  │──────────▶│  Ingestion   │──▶│  SQLite   │
//! └─────────┘           │ auth+embed   │   │ per-bridge│
//!                       └──────────────┘   └────┬─────┘
//!                                               │ top-k
//! ┌─────────┐  ask/chat ┌──────────────┐   ┌────▼─────┐
//! │   UI    │──────────▶│   Gateway    │──▶│ Retrieval │
//! └─────────┘◀──────────│ + Synthesizer│◀──└──────────┘
//!             answer    └──────────────┘
//! ```
//!
//! Without an API key everything runs in offline mode: deterministic
//! hash embeddings and clearly labelled placeholder answers.
//!
//! ## Quick Start
//!
//! ```bash
//! rbi init                               # create database
//! rbi bridge create "Acme ↔ Contoso"     # prints id and token
//! rbi ingest <bridge-id> "deployment to staging is done"
//! rbi ask <bridge-id> "what's the deployment status?"
//! rbi serve                              # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and provider mode |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite implementation of the store trait |
//! | [`openai`] | Shared HTTP plumbing for OpenAI-compatible APIs |
//! | [`embedding`] | Embedding provider selection |
//! | [`llm`] | Chat models (live and offline) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieval`] | Retrieval engine |
//! | [`answer`] | Answer synthesizer |
//! | [`gateway`] | Conversation gateway |
//! | [`app`] | Service container |
//! | [`server`] | HTTP API |
//! | [`retry`] | Caller-side backoff |

pub mod answer;
pub mod app;
pub mod ask;
pub mod bridges;
pub mod config;
pub mod db;
pub mod embedding;
pub mod gateway;
pub mod history;
pub mod ingest;
pub mod ingest_cmd;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod openai;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod sqlite_store;
pub mod stats;
