//! Reservation projection.
//!
//! Activity is evaluated against the event's own timestamp, not wall-clock
//! time, so replay reproduces identical rows.

use chrono::{DateTime, Utc};

use crate::domain::errors::CoreResult;
use crate::domain::ports::storage::{SqlValue, StorageTx};

#[allow(clippy::too_many_arguments)]
pub async fn apply_reserved(
    tx: &mut dyn StorageTx,
    project: &str,
    reservation_ids: &[String],
    agent: &str,
    paths: &[String],
    exclusive: bool,
    reason: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    for (index, path) in paths.iter().enumerate() {
        // Idempotent retry: an equivalent active reservation suppresses the
        // duplicate row.
        let existing = tx
            .query(
                "SELECT id FROM reservations
                 WHERE project_key = ? AND agent_name = ? AND path_pattern = ? AND exclusive = ?
                   AND released_at IS NULL
                   AND (expires_at IS NULL OR expires_at > ?)
                 LIMIT 1",
                &[
                    SqlValue::from(project),
                    SqlValue::from(agent),
                    SqlValue::from(path.as_str()),
                    SqlValue::from(exclusive),
                    SqlValue::Timestamp(at),
                ],
            )
            .await?;
        if !existing.is_empty() {
            continue;
        }

        let id = reservation_ids
            .get(index)
            .map_or_else(|| format!("{agent}-{index}"), Clone::clone);
        tx.execute(
            "INSERT INTO reservations (id, project_key, agent_name, path_pattern, exclusive, reason, acquired_at, expires_at, released_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT (id) DO NOTHING",
            &[
                SqlValue::from(id),
                SqlValue::from(project),
                SqlValue::from(agent),
                SqlValue::from(path.as_str()),
                SqlValue::from(exclusive),
                SqlValue::from(reason.map(str::to_string)),
                SqlValue::Timestamp(at),
                SqlValue::from(expires_at),
            ],
        )
        .await?;
    }
    Ok(())
}

pub async fn apply_released(
    tx: &mut dyn StorageTx,
    project: &str,
    agent: &str,
    paths: Option<&[String]>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    match paths {
        None => {
            tx.execute(
                "UPDATE reservations SET released_at = ?
                 WHERE project_key = ? AND agent_name = ? AND released_at IS NULL",
                &[SqlValue::Timestamp(at), SqlValue::from(project), SqlValue::from(agent)],
            )
            .await?;
        }
        Some(paths) => {
            for path in paths {
                tx.execute(
                    "UPDATE reservations SET released_at = ?
                     WHERE project_key = ? AND agent_name = ? AND path_pattern = ?
                       AND released_at IS NULL",
                    &[
                        SqlValue::Timestamp(at),
                        SqlValue::from(project),
                        SqlValue::from(agent),
                        SqlValue::from(path.as_str()),
                    ],
                )
                .await?;
            }
        }
    }
    Ok(())
}
