//! Message and per-recipient read/ack projections.

use chrono::{DateTime, Utc};

use crate::domain::errors::CoreResult;
use crate::domain::models::Importance;
use crate::domain::ports::storage::{SqlValue, StorageTx};

#[allow(clippy::too_many_arguments)]
pub async fn apply_sent(
    tx: &mut dyn StorageTx,
    project: &str,
    message_id: &str,
    from: &str,
    to: &[String],
    subject: &str,
    body: &str,
    thread_id: Option<&str>,
    importance: Importance,
    metadata: Option<&serde_json::Value>,
    sequence: i64,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO messages (id, project_key, from_agent, subject, body, thread_id, importance, metadata, sequence, sent_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO NOTHING",
        &[
            SqlValue::from(message_id),
            SqlValue::from(project),
            SqlValue::from(from),
            SqlValue::from(subject),
            SqlValue::from(body),
            SqlValue::from(thread_id.map(str::to_string)),
            SqlValue::from(importance.as_str()),
            metadata.map_or(SqlValue::Null, |m| SqlValue::Json(m.clone())),
            SqlValue::Integer(sequence),
            SqlValue::Timestamp(at),
        ],
    )
    .await?;

    for recipient in to {
        tx.execute(
            "INSERT INTO message_recipients (message_id, agent_name, read_at, acked_at)
             VALUES (?, ?, NULL, NULL)
             ON CONFLICT (message_id, agent_name) DO NOTHING",
            &[SqlValue::from(message_id), SqlValue::from(recipient.as_str())],
        )
        .await?;
    }
    Ok(())
}

/// Idempotent: a second read of the same `(message, agent)` changes nothing.
pub async fn apply_read(
    tx: &mut dyn StorageTx,
    message_id: &str,
    agent: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE message_recipients SET read_at = ?
         WHERE message_id = ? AND agent_name = ? AND read_at IS NULL",
        &[SqlValue::Timestamp(at), SqlValue::from(message_id), SqlValue::from(agent)],
    )
    .await?;
    Ok(())
}

/// Idempotent like [`apply_read`]. An ack also implies read.
pub async fn apply_acked(
    tx: &mut dyn StorageTx,
    message_id: &str,
    agent: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE message_recipients SET read_at = COALESCE(read_at, ?)
         WHERE message_id = ? AND agent_name = ?",
        &[SqlValue::Timestamp(at), SqlValue::from(message_id), SqlValue::from(agent)],
    )
    .await?;
    tx.execute(
        "UPDATE message_recipients SET acked_at = ?
         WHERE message_id = ? AND agent_name = ? AND acked_at IS NULL",
        &[SqlValue::Timestamp(at), SqlValue::from(message_id), SqlValue::from(agent)],
    )
    .await?;
    Ok(())
}
