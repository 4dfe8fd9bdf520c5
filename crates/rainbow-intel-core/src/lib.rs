//! # Rainbow Intel Core
//!
//! Runtime-agnostic logic for the Rainbow Intel retrieval layer: data
//! models, the error taxonomy, the store abstraction, similarity ranking,
//! the deterministic offline embedder, and grounding-prompt construction.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem dependencies.
//! Everything that performs I/O lives in the `rainbow-intel` app crate and
//! is handed to these types through the [`store::Store`] and
//! [`embedding::EmbeddingProvider`] traits.

pub mod embedding;
pub mod error;
pub mod models;
pub mod prompt;
pub mod rank;
pub mod store;

pub use error::{Error, Result};
