//! Similarity ranking shared by every [`Store`](crate::store::Store) backend.
//!
//! Ordering: similarity (desc), timestamp (desc, most recent first),
//! message id (asc). The final key only makes the order total so that
//! identical inputs always produce identical output.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::{Message, ScoredMessage};

/// Score every embedded message against `query_vec` and keep the best `k`.
///
/// Messages without an embedding are skipped.
pub fn top_k<I>(messages: I, query_vec: &[f32], k: usize) -> Vec<ScoredMessage>
where
    I: IntoIterator<Item = Message>,
{
    let scored = messages
        .into_iter()
        .filter_map(|message| {
            let similarity = cosine_similarity(query_vec, message.embedding.as_deref()?) as f64;
            Some(ScoredMessage {
                message,
                similarity,
            })
        })
        .collect();
    rank(scored, k)
}

/// Sort already-scored messages and truncate to `k`.
pub fn rank(mut scored: Vec<ScoredMessage>, k: usize) -> Vec<ScoredMessage> {
    scored.sort_by(compare);
    scored.truncate(k);
    scored
}

fn compare(a: &ScoredMessage, b: &ScoredMessage) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then(b.message.created_at.cmp(&a.message.created_at))
        .then(a.message.id.cmp(&b.message.id))
}
