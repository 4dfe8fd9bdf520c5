//! Embedding provider trait, the deterministic offline embedder, and
//! vector utilities.
//!
//! Live provider implementations (OpenAI-compatible HTTP) live in the
//! `rainbow-intel` app crate. The [`OfflineEmbedder`] is pure and lives here
//! so tests and network-free deployments share exactly the same vectors.
//!
//! # Offline vectors
//!
//! The offline embedder is a seeded feature-hashing model: the text is
//! lower-cased and split into alphanumeric tokens, every token is hashed
//! with SHA-256 (prefixed by a fixed seed) into one of `dims` buckets with a
//! ±1 sign, and the resulting term vector is L2-normalized. Identical text
//! always yields the identical vector, and texts sharing words land close
//! together under cosine similarity, which keeps offline retrieval useful
//! for demos and tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Dimensionality used by the live `text-embedding-3-small` deployment.
pub const DEFAULT_DIMS: usize = 1536;

const OFFLINE_SEED: &[u8] = b"rainbow-intel/offline-embedding/v1";

/// Turns text into a fixed-length dense vector.
///
/// The dimensionality is fixed for the lifetime of a deployment; changing it
/// invalidates every stored vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text. Implementations never retry internally.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic, network-free embedding provider.
#[derive(Debug, Clone)]
pub struct OfflineEmbedder {
    dims: usize,
}

impl OfflineEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Compute the offline vector synchronously.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        let mut tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .peekable();

        if tokens.peek().is_none() {
            // No words at all: hash the raw text so the vector is still unit length.
            let (idx, sign) = self.bucket(text);
            vec[idx] += sign;
        } else {
            for token in tokens {
                let (idx, sign) = self.bucket(token);
                vec[idx] += sign;
            }
        }

        l2_normalize(&mut vec);
        if vec.iter().all(|v| *v == 0.0) {
            // Every token cancelled out in the same bucket.
            let (idx, _) = self.bucket(text);
            vec[idx] = 1.0;
        }
        vec
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = Sha256::new();
        hasher.update(OFFLINE_SEED);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();

        let mut idx_bytes = [0u8; 8];
        idx_bytes.copy_from_slice(&digest[..8]);
        let idx = (u64::from_le_bytes(idx_bytes) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }
}

impl Default for OfflineEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineEmbedder {
    fn model_name(&self) -> &str {
        "offline-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use rainbow_intel_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors and vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
