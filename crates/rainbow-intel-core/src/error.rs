//! Error taxonomy shared by every stage of the pipeline.
//!
//! Authentication and validation failures are raised at the boundary and
//! never reach retrieval or synthesis. Provider failures are retryable by
//! the caller; the adapters themselves never retry. An empty inbound
//! message is not an error at all (see `IngestOutcome::Skipped` in the app
//! crate).

use thiserror::Error;

/// Convenience alias used throughout the pipeline.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// No bearer credential was presented.
    #[error("missing bearer token")]
    MissingCredentials,

    /// The credential does not match the resolved bridge, the bridge does
    /// not exist, or its intelligence layer is disabled.
    #[error("invalid token or bridge not found")]
    Unauthorized,

    /// The request is malformed (bad gateway identifier, bad paging, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider rate limited: {0}")]
    ProviderRateLimited(String),

    #[error("provider timed out: {0}")]
    ProviderTimeout(String),

    /// Ingestion aborted because the message could not be embedded.
    /// Nothing was persisted.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(#[source] Box<Error>),

    /// Retrieval succeeded but the answer could not be generated.
    #[error("answer synthesis failed: {0}")]
    SynthesisFailed(#[source] Box<Error>),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        Error::StoreUnavailable(err.to_string())
    }

    pub fn embedding(err: Error) -> Self {
        Error::EmbeddingFailed(Box::new(err))
    }

    pub fn synthesis(err: Error) -> Self {
        Error::SynthesisFailed(Box::new(err))
    }

    /// Whether the caller may retry the same operation with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ProviderUnavailable(_)
            | Error::ProviderRateLimited(_)
            | Error::ProviderTimeout(_) => true,
            Error::EmbeddingFailed(inner) | Error::SynthesisFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// The innermost provider error for wrapped failures, `self` otherwise.
    pub fn root(&self) -> &Error {
        match self {
            Error::EmbeddingFailed(inner) | Error::SynthesisFailed(inner) => inner.root(),
            other => other,
        }
    }
}
