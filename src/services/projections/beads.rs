//! Bead graph projections and the derived blocked-cache.

use chrono::{DateTime, Utc};

use crate::domain::errors::CoreResult;
use crate::domain::models::{DependencyKind, IssueType};
use crate::domain::ports::storage::{SqlValue, StorageTx};

/// Statuses that make a blocker active. Kept in SQL form for the cache
/// rebuild queries.
const BLOCKING_STATUSES: &str = "('open', 'in_progress', 'blocked')";

#[allow(clippy::too_many_arguments)]
pub async fn apply_created(
    tx: &mut dyn StorageTx,
    project: &str,
    bead_id: &str,
    title: &str,
    description: Option<&str>,
    issue_type: IssueType,
    priority: i64,
    parent_id: Option<&str>,
    assignee: Option<&str>,
    created_at: DateTime<Utc>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO beads (id, project_key, title, description, issue_type, status, priority, parent_id, assignee, created_at, updated_at, dirty)
         VALUES (?, ?, ?, ?, ?, 'open', ?, ?, ?, ?, ?, 1)
         ON CONFLICT (id) DO NOTHING",
        &[
            SqlValue::from(bead_id),
            SqlValue::from(project),
            SqlValue::from(title),
            SqlValue::from(description.map(str::to_string)),
            SqlValue::from(issue_type.as_str()),
            SqlValue::Integer(priority),
            SqlValue::from(parent_id.map(str::to_string)),
            SqlValue::from(assignee.map(str::to_string)),
            SqlValue::Timestamp(created_at),
            SqlValue::Timestamp(at),
        ],
    )
    .await?;
    Ok(())
}

pub async fn apply_updated(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    title: Option<&str>,
    description: Option<&str>,
    priority: Option<i64>,
    assignee: Option<&str>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET
             title = COALESCE(?, title),
             description = COALESCE(?, description),
             priority = COALESCE(?, priority),
             assignee = COALESCE(?, assignee),
             updated_at = ?,
             dirty = 1
         WHERE id = ?",
        &[
            SqlValue::from(title.map(str::to_string)),
            SqlValue::from(description.map(str::to_string)),
            SqlValue::from(priority),
            SqlValue::from(assignee.map(str::to_string)),
            SqlValue::Timestamp(at),
            SqlValue::from(bead_id),
        ],
    )
    .await?;
    Ok(())
}

pub async fn apply_assigned(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    assignee: Option<&str>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET assignee = ?, updated_at = ?, dirty = 1 WHERE id = ?",
        &[
            SqlValue::from(assignee.map(str::to_string)),
            SqlValue::Timestamp(at),
            SqlValue::from(bead_id),
        ],
    )
    .await?;
    Ok(())
}

pub async fn apply_status_changed(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    to: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    // Leaving `closed` clears the closure stamp.
    tx.execute(
        "UPDATE beads SET
             status = ?,
             closed_at = CASE WHEN ? = 'closed' THEN closed_at ELSE NULL END,
             closed_reason = CASE WHEN ? = 'closed' THEN closed_reason ELSE NULL END,
             updated_at = ?,
             dirty = 1
         WHERE id = ?",
        &[
            SqlValue::from(to),
            SqlValue::from(to),
            SqlValue::from(to),
            SqlValue::Timestamp(at),
            SqlValue::from(bead_id),
        ],
    )
    .await?;
    rebuild_dependents_of(tx, bead_id).await
}

pub async fn apply_closed(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET status = 'closed', closed_at = ?, closed_reason = ?, updated_at = ?, dirty = 1
         WHERE id = ?",
        &[
            SqlValue::Timestamp(at),
            SqlValue::from(reason.map(str::to_string)),
            SqlValue::Timestamp(at),
            SqlValue::from(bead_id),
        ],
    )
    .await?;
    rebuild_dependents_of(tx, bead_id).await
}

pub async fn apply_reopened(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET status = 'open', closed_at = NULL, closed_reason = NULL, updated_at = ?, dirty = 1
         WHERE id = ?",
        &[SqlValue::Timestamp(at), SqlValue::from(bead_id)],
    )
    .await?;
    rebuild_dependents_of(tx, bead_id).await
}

pub async fn apply_deleted(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    deleted_by: Option<&str>,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET status = 'tombstone', deleted_at = ?, deleted_by = ?, delete_reason = ?, updated_at = ?, dirty = 1
         WHERE id = ?",
        &[
            SqlValue::Timestamp(at),
            SqlValue::from(deleted_by.map(str::to_string)),
            SqlValue::from(reason.map(str::to_string)),
            SqlValue::Timestamp(at),
            SqlValue::from(bead_id),
        ],
    )
    .await?;
    rebuild_dependents_of(tx, bead_id).await
}

pub async fn apply_dependency_added(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    depends_on_id: &str,
    relationship: DependencyKind,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO bead_dependencies (bead_id, depends_on_id, relationship)
         VALUES (?, ?, ?)
         ON CONFLICT (bead_id, depends_on_id, relationship) DO NOTHING",
        &[
            SqlValue::from(bead_id),
            SqlValue::from(depends_on_id),
            SqlValue::from(relationship.as_str()),
        ],
    )
    .await?;
    mark_bead_dirty(tx, bead_id, at).await?;
    rebuild_blocked_cache(tx, bead_id).await
}

pub async fn apply_dependency_removed(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    depends_on_id: &str,
    relationship: DependencyKind,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "DELETE FROM bead_dependencies
         WHERE bead_id = ? AND depends_on_id = ? AND relationship = ?",
        &[
            SqlValue::from(bead_id),
            SqlValue::from(depends_on_id),
            SqlValue::from(relationship.as_str()),
        ],
    )
    .await?;
    mark_bead_dirty(tx, bead_id, at).await?;
    rebuild_blocked_cache(tx, bead_id).await
}

pub async fn apply_label_added(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    label: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO bead_labels (bead_id, label) VALUES (?, ?)
         ON CONFLICT (bead_id, label) DO NOTHING",
        &[SqlValue::from(bead_id), SqlValue::from(label)],
    )
    .await?;
    mark_bead_dirty(tx, bead_id, at).await
}

pub async fn apply_label_removed(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    label: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "DELETE FROM bead_labels WHERE bead_id = ? AND label = ?",
        &[SqlValue::from(bead_id), SqlValue::from(label)],
    )
    .await?;
    mark_bead_dirty(tx, bead_id, at).await
}

pub async fn apply_comment_added(
    tx: &mut dyn StorageTx,
    comment_id: &str,
    bead_id: &str,
    author: &str,
    body: &str,
    parent_id: Option<&str>,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO bead_comments (id, bead_id, author, body, parent_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO NOTHING",
        &[
            SqlValue::from(comment_id),
            SqlValue::from(bead_id),
            SqlValue::from(author),
            SqlValue::from(body),
            SqlValue::from(parent_id.map(str::to_string)),
            SqlValue::Timestamp(at),
            SqlValue::Timestamp(at),
        ],
    )
    .await?;
    mark_bead_dirty(tx, bead_id, at).await
}

pub async fn apply_comment_updated(
    tx: &mut dyn StorageTx,
    comment_id: &str,
    body: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE bead_comments SET body = ?, updated_at = ? WHERE id = ?",
        &[SqlValue::from(body), SqlValue::Timestamp(at), SqlValue::from(comment_id)],
    )
    .await?;
    tx.execute(
        "UPDATE beads SET dirty = 1
         WHERE id = (SELECT bead_id FROM bead_comments WHERE id = ?)",
        &[SqlValue::from(comment_id)],
    )
    .await?;
    Ok(())
}

pub async fn apply_comment_deleted(tx: &mut dyn StorageTx, comment_id: &str) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET dirty = 1
         WHERE id = (SELECT bead_id FROM bead_comments WHERE id = ?)",
        &[SqlValue::from(comment_id)],
    )
    .await?;
    tx.execute("DELETE FROM bead_comments WHERE id = ?", &[SqlValue::from(comment_id)])
        .await?;
    Ok(())
}

pub async fn apply_epic_child_added(
    tx: &mut dyn StorageTx,
    epic_id: &str,
    child_id: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET parent_id = ?, updated_at = ?, dirty = 1 WHERE id = ?",
        &[SqlValue::from(epic_id), SqlValue::Timestamp(at), SqlValue::from(child_id)],
    )
    .await?;
    Ok(())
}

pub async fn apply_epic_child_removed(
    tx: &mut dyn StorageTx,
    child_id: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET parent_id = NULL, updated_at = ?, dirty = 1 WHERE id = ?",
        &[SqlValue::Timestamp(at), SqlValue::from(child_id)],
    )
    .await?;
    Ok(())
}

/// Recompute the blocked-cache rows for one bead from its current `blocks`
/// dependencies.
pub async fn rebuild_blocked_cache(tx: &mut dyn StorageTx, bead_id: &str) -> CoreResult<()> {
    tx.execute("DELETE FROM bead_blockers WHERE bead_id = ?", &[SqlValue::from(bead_id)])
        .await?;
    tx.execute(
        &format!(
            "INSERT INTO bead_blockers (bead_id, blocker_id)
             SELECT d.bead_id, d.depends_on_id
             FROM bead_dependencies d
             JOIN beads b ON b.id = d.depends_on_id
             WHERE d.bead_id = ? AND d.relationship = 'blocks'
               AND b.status IN {BLOCKING_STATUSES}
               AND b.deleted_at IS NULL"
        ),
        &[SqlValue::from(bead_id)],
    )
    .await?;
    Ok(())
}

/// When a bead's status changes, every bead blocked on it must recompute.
pub async fn rebuild_dependents_of(tx: &mut dyn StorageTx, changed_id: &str) -> CoreResult<()> {
    let dependents = tx
        .query(
            "SELECT DISTINCT bead_id FROM bead_dependencies
             WHERE depends_on_id = ? AND relationship = 'blocks'",
            &[SqlValue::from(changed_id)],
        )
        .await?;
    for row in &dependents {
        let bead_id = row.text("bead_id")?;
        rebuild_blocked_cache(tx, &bead_id).await?;
    }
    Ok(())
}

pub async fn mark_bead_dirty(
    tx: &mut dyn StorageTx,
    bead_id: &str,
    at: DateTime<Utc>,
) -> CoreResult<()> {
    tx.execute(
        "UPDATE beads SET updated_at = ?, dirty = 1 WHERE id = ?",
        &[SqlValue::Timestamp(at), SqlValue::from(bead_id)],
    )
    .await?;
    Ok(())
}
