//! Memory projection.
//!
//! Rebuilds content rows from the log. Embeddings are not carried by events
//! (4 KiB of floats per entry would bloat the log), so `memory_embeddings`
//! is excluded from replay truncation and survives a rebuild.

use chrono::{DateTime, Utc};

use crate::domain::errors::CoreResult;
use crate::domain::ports::storage::{SqlValue, StorageTx};

pub async fn apply_stored(
    tx: &mut dyn StorageTx,
    memory_id: &str,
    content: &str,
    metadata: &serde_json::Value,
    collection: &str,
    confidence: f64,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO memories (id, content, metadata, collection, created_at, confidence)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
             content = excluded.content,
             metadata = excluded.metadata,
             collection = excluded.collection,
             confidence = excluded.confidence",
        &[
            SqlValue::from(memory_id),
            SqlValue::from(content),
            SqlValue::Json(metadata.clone()),
            SqlValue::from(collection),
            SqlValue::Timestamp(at),
            SqlValue::Real(confidence),
        ],
    )
    .await?;
    Ok(())
}

/// Deletion cascades to the embedding row and the FTS shadow. The embedding
/// delete is explicit rather than a foreign key so that replay's truncation
/// of `memories` cannot destroy vectors the log does not carry.
pub async fn apply_removed(tx: &mut dyn StorageTx, memory_id: &str) -> CoreResult<()> {
    tx.execute(
        "DELETE FROM memory_embeddings WHERE memory_id = ?",
        &[SqlValue::from(memory_id)],
    )
    .await?;
    tx.execute("DELETE FROM memories WHERE id = ?", &[SqlValue::from(memory_id)])
        .await?;
    Ok(())
}

/// Validation resets the decay clock: `created_at` moves to the validation
/// time, nothing else changes.
pub async fn apply_validated(
    tx: &mut dyn StorageTx,
    memory_id: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE memories SET created_at = ? WHERE id = ?",
        &[SqlValue::Timestamp(at), SqlValue::from(memory_id)],
    )
    .await?;
    Ok(())
}
