//! Semantic memory entries and the confidence-weighted decay model.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{CoreError, CoreResult};

/// Embedding dimension accepted by the store. Anything else is `Invalid`.
pub const EMBEDDING_DIM: usize = 1024;

/// Half-life in days at confidence 0.0.
pub const HALF_LIFE_MIN_DAYS: f64 = 45.0;
/// Half-life in days at confidence 1.0.
pub const HALF_LIFE_MAX_DAYS: f64 = 135.0;

/// Default confidence for newly stored memories.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// A stored memory row. The embedding lives in a side table keyed by `id`
/// and is not part of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub collection: String,
    pub created_at: DateTime<Utc>,
    /// In `[0, 1]`; modulates the decay half-life, never the stored row.
    pub confidence: f64,
}

/// How a search result was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Vector,
    Fts,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Fts => "fts",
        }
    }
}

/// One search hit: the memory plus its decayed score.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySearchResult {
    pub memory: MemoryEntry,
    pub score: f64,
    pub match_type: MatchType,
}

impl MemoryEntry {
    /// Decay half-life for this entry, linear in confidence:
    /// 45 days at 0.0 up to 135 days at 1.0.
    pub fn half_life_days(&self) -> f64 {
        HALF_LIFE_MIN_DAYS
            + (HALF_LIFE_MAX_DAYS - HALF_LIFE_MIN_DAYS) * self.confidence.clamp(0.0, 1.0)
    }

    /// Ranking-time decay multiplier. A read-only adjustment: nothing in the
    /// stored row changes.
    pub fn decay_factor(&self, now: DateTime<Utc>) -> f64 {
        let age_ms = (now - self.created_at).num_milliseconds().max(0) as f64;
        let age_days = age_ms / 86_400_000.0;
        0.5_f64.powf(age_days / self.half_life_days())
    }

    /// Truncate content to a bounded preview (`expand=false` search results).
    pub fn preview(&self, max_bytes: usize) -> String {
        if self.content.len() <= max_bytes {
            return self.content.clone();
        }
        let mut end = max_bytes;
        while end > 0 && !self.content.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &self.content[..end])
    }
}

/// Validate a confidence value at the boundary.
pub fn validate_confidence(confidence: f64) -> CoreResult<f64> {
    if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
        return Err(CoreError::invalid(format!(
            "confidence must be within [0, 1], got {confidence}"
        )));
    }
    Ok(confidence)
}

/// Validate an embedding's dimension at the boundary.
pub fn validate_embedding(embedding: &[f32]) -> CoreResult<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(CoreError::invalid(format!(
            "embedding dimension must be {EMBEDDING_DIM}, got {}",
            embedding.len()
        )));
    }
    Ok(())
}

/// Generate a short memory id with the `mem_` prefix.
pub fn generate_memory_id() -> String {
    let tail: u64 = rand::thread_rng().gen();
    format!("mem_{tail:012x}")
}

/// Cosine similarity between two equal-length vectors, in `[-1, 1]`.
/// Returns 0.0 for zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
