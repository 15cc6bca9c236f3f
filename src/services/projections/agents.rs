//! Agent roster projection.

use chrono::{DateTime, Utc};

use crate::domain::errors::CoreResult;
use crate::domain::ports::storage::{SqlValue, StorageTx};

pub async fn apply_registered(
    tx: &mut dyn StorageTx,
    project: &str,
    name: &str,
    program: &str,
    model: &str,
    task_description: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO agents (project_key, name, program, model, task_description, registered_at, last_active_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (project_key, name) DO UPDATE SET
             program = excluded.program,
             model = excluded.model,
             task_description = excluded.task_description,
             last_active_at = excluded.last_active_at",
        &[
            SqlValue::from(project),
            SqlValue::from(name),
            SqlValue::from(program),
            SqlValue::from(model),
            SqlValue::from(task_description),
            SqlValue::Timestamp(at),
            SqlValue::Timestamp(at),
        ],
    )
    .await?;
    Ok(())
}

pub async fn apply_unregistered(
    tx: &mut dyn StorageTx,
    project: &str,
    name: &str,
) -> CoreResult<()> {
    tx.execute(
        "DELETE FROM agents WHERE project_key = ? AND name = ?",
        &[SqlValue::from(project), SqlValue::from(name)],
    )
    .await?;
    Ok(())
}

/// Bump `last_active_at` for an agent named by a later event. A no-op when
/// the agent never registered.
pub async fn touch_activity(
    tx: &mut dyn StorageTx,
    project: &str,
    name: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE agents SET last_active_at = ? WHERE project_key = ? AND name = ?",
        &[SqlValue::Timestamp(at), SqlValue::from(project), SqlValue::from(name)],
    )
    .await?;
    Ok(())
}
