//! Bead (work item) graph operations.
//!
//! All mutations go through the event log; all queries read the bead
//! projections. Short ids resolve by unique substring; an ambiguous match is
//! a `Conflict`, never a silent pick.

use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    generate_bead_id, now_ms, Bead, BeadComment, BeadDependency, BeadStatus, DependencyKind,
    EventPayload, IssueType, NewEvent,
};
use crate::domain::ports::storage::{with_tx, SqlRow, SqlValue, StorageAdapter};
use crate::services::event_store::EventStore;
use crate::services::projections;

#[derive(Debug, Clone, Default)]
pub struct CreateBeadOptions {
    pub description: Option<String>,
    pub issue_type: IssueType,
    pub priority: Option<i64>,
    pub parent_id: Option<String>,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBeadOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BeadFilter {
    pub status: Option<BeadStatus>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<String>,
    pub parent_id: Option<String>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Bead graph service over the bead projections.
#[derive(Clone)]
pub struct BeadService {
    store: EventStore,
}

impl BeadService {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        self.store.adapter()
    }

    // -- lifecycle --

    pub async fn create_bead(
        &self,
        project: &str,
        title: &str,
        options: CreateBeadOptions,
    ) -> CoreResult<Bead> {
        if title.trim().is_empty() {
            return Err(CoreError::invalid("bead title must not be empty"));
        }
        let priority = options.priority.unwrap_or(crate::domain::models::DEFAULT_PRIORITY);
        if priority < 0 {
            return Err(CoreError::invalid(format!("priority must be >= 0, got {priority}")));
        }

        let bead_id = generate_bead_id(project, now_ms());
        let mut events = vec![NewEvent::new(
            project,
            EventPayload::BeadCreated {
                bead_id: bead_id.clone(),
                title: title.to_string(),
                description: options.description,
                issue_type: options.issue_type,
                priority,
                parent_id: options.parent_id,
                assignee: options.assignee,
                created_at_ms: None,
            },
        )];
        for label in options.labels {
            events.push(NewEvent::new(
                project,
                EventPayload::BeadLabelAdded { bead_id: bead_id.clone(), label },
            ));
        }
        self.store.append_batch(events).await?;

        self.get_bead(project, &bead_id).await
    }

    /// Fetch a bead by id or unique id fragment.
    pub async fn get_bead(&self, project: &str, id_or_fragment: &str) -> CoreResult<Bead> {
        let id = self.resolve_short_id(project, id_or_fragment).await?;
        let rows = self
            .adapter()
            .query(
                &format!("{BEAD_SELECT} WHERE project_key = ? AND id = ?"),
                &[SqlValue::from(project), SqlValue::from(id.as_str())],
            )
            .await?;
        rows.first()
            .map(row_to_bead)
            .transpose()?
            .ok_or_else(|| CoreError::not_found(format!("bead {id} not found")))
    }

    pub async fn query_beads(&self, project: &str, filter: BeadFilter) -> CoreResult<Vec<Bead>> {
        let mut sql = format!("{BEAD_SELECT} WHERE project_key = ?");
        let mut params: Vec<SqlValue> = vec![SqlValue::from(project)];

        if !filter.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params.push(SqlValue::from(status.as_str()));
        }
        if let Some(issue_type) = filter.issue_type {
            sql.push_str(" AND issue_type = ?");
            params.push(SqlValue::from(issue_type.as_str()));
        }
        if let Some(assignee) = &filter.assignee {
            sql.push_str(" AND assignee = ?");
            params.push(SqlValue::from(assignee.as_str()));
        }
        if let Some(parent_id) = &filter.parent_id {
            sql.push_str(" AND parent_id = ?");
            params.push(SqlValue::from(parent_id.as_str()));
        }

        sql.push_str(" ORDER BY priority ASC, created_at ASC");
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(filter.limit.map_or(i64::MAX, i64::from)));
        if let Some(offset) = filter.offset {
            sql.push_str(" OFFSET ?");
            params.push(SqlValue::Integer(i64::from(offset)));
        }

        let rows = self.adapter().query(&sql, &params).await?;
        rows.iter().map(row_to_bead).collect()
    }

    pub async fn update_bead(
        &self,
        project: &str,
        id_or_fragment: &str,
        options: UpdateBeadOptions,
    ) -> CoreResult<Bead> {
        let bead_id = self.resolve_short_id(project, id_or_fragment).await?;
        if let Some(priority) = options.priority {
            if priority < 0 {
                return Err(CoreError::invalid(format!("priority must be >= 0, got {priority}")));
            }
        }
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadUpdated {
                    bead_id: bead_id.clone(),
                    title: options.title,
                    description: options.description,
                    priority: options.priority,
                    assignee: options.assignee,
                },
            ))
            .await?;
        self.get_bead(project, &bead_id).await
    }

    pub async fn change_bead_status(
        &self,
        project: &str,
        id_or_fragment: &str,
        to: BeadStatus,
    ) -> CoreResult<Bead> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        BeadStatus::validate_transition(bead.status, to)?;
        if bead.status == to {
            return Ok(bead);
        }

        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadStatusChanged {
                    bead_id: bead.id.clone(),
                    from: Some(bead.status.as_str().to_string()),
                    to: to.as_str().to_string(),
                },
            ))
            .await?;
        self.get_bead(project, &bead.id).await
    }

    pub async fn close_bead(
        &self,
        project: &str,
        id_or_fragment: &str,
        reason: Option<&str>,
    ) -> CoreResult<Bead> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadClosed {
                    bead_id: bead.id.clone(),
                    reason: reason.map(str::to_string),
                },
            ))
            .await?;
        self.get_bead(project, &bead.id).await
    }

    pub async fn reopen_bead(&self, project: &str, id_or_fragment: &str) -> CoreResult<Bead> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadReopened { bead_id: bead.id.clone() },
            ))
            .await?;
        self.get_bead(project, &bead.id).await
    }

    /// Soft delete. Queries exclude the bead afterwards unless
    /// `include_deleted` is set.
    pub async fn delete_bead(
        &self,
        project: &str,
        id_or_fragment: &str,
        deleted_by: Option<&str>,
        reason: Option<&str>,
    ) -> CoreResult<()> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadDeleted {
                    bead_id: bead.id,
                    deleted_by: deleted_by.map(str::to_string),
                    reason: reason.map(str::to_string),
                },
            ))
            .await?;
        Ok(())
    }

    // -- dependencies and blocking --

    pub async fn add_dependency(
        &self,
        project: &str,
        id_or_fragment: &str,
        depends_on: &str,
        relationship: DependencyKind,
    ) -> CoreResult<()> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let target = self.get_bead(project, depends_on).await?;
        if bead.id == target.id {
            return Err(CoreError::invalid("a bead cannot depend on itself"));
        }

        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadDependencyAdded {
                    bead_id: bead.id,
                    depends_on_id: target.id,
                    relationship,
                },
            ))
            .await?;
        Ok(())
    }

    pub async fn remove_dependency(
        &self,
        project: &str,
        id_or_fragment: &str,
        depends_on: &str,
        relationship: DependencyKind,
    ) -> CoreResult<()> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let target = self.get_bead(project, depends_on).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadDependencyRemoved {
                    bead_id: bead.id,
                    depends_on_id: target.id,
                    relationship,
                },
            ))
            .await?;
        Ok(())
    }

    pub async fn get_dependencies(
        &self,
        project: &str,
        id_or_fragment: &str,
    ) -> CoreResult<Vec<BeadDependency>> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let rows = self
            .adapter()
            .query(
                "SELECT bead_id, depends_on_id, relationship FROM bead_dependencies
                 WHERE bead_id = ? ORDER BY depends_on_id",
                &[SqlValue::from(bead.id.as_str())],
            )
            .await?;
        rows.iter().map(row_to_dependency).collect()
    }

    pub async fn get_dependents(
        &self,
        project: &str,
        id_or_fragment: &str,
    ) -> CoreResult<Vec<BeadDependency>> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let rows = self
            .adapter()
            .query(
                "SELECT bead_id, depends_on_id, relationship FROM bead_dependencies
                 WHERE depends_on_id = ? ORDER BY bead_id",
                &[SqlValue::from(bead.id.as_str())],
            )
            .await?;
        rows.iter().map(row_to_dependency).collect()
    }

    /// True when the blocked-cache holds blockers or any active `blocks`
    /// target is still open. The second clause is a consistency net in case
    /// the cache lags a direct projection edit.
    pub async fn is_blocked(&self, project: &str, id_or_fragment: &str) -> CoreResult<bool> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let rows = self
            .adapter()
            .query(
                "SELECT EXISTS (
                     SELECT 1 FROM bead_blockers WHERE bead_id = ?
                 ) OR EXISTS (
                     SELECT 1 FROM bead_dependencies d
                     JOIN beads b ON b.id = d.depends_on_id
                     WHERE d.bead_id = ? AND d.relationship = 'blocks'
                       AND b.status IN ('open', 'in_progress', 'blocked')
                       AND b.deleted_at IS NULL
                 ) AS blocked",
                &[SqlValue::from(bead.id.as_str()), SqlValue::from(bead.id.as_str())],
            )
            .await?;
        rows.first().map_or(Ok(false), |row| row.boolean("blocked"))
    }

    pub async fn get_blockers(
        &self,
        project: &str,
        id_or_fragment: &str,
    ) -> CoreResult<Vec<Bead>> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let rows = self
            .adapter()
            .query(
                &format!(
                    "{BEAD_SELECT} WHERE id IN (
                         SELECT blocker_id FROM bead_blockers WHERE bead_id = ?
                     ) ORDER BY created_at"
                ),
                &[SqlValue::from(bead.id.as_str())],
            )
            .await?;
        rows.iter().map(row_to_bead).collect()
    }

    /// Recompute the blocked-cache for one bead from current dependencies.
    pub async fn rebuild_blocked_cache(
        &self,
        project: &str,
        id_or_fragment: &str,
    ) -> CoreResult<()> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        with_tx(self.adapter().as_ref(), move |tx| {
            Box::pin(async move { projections::rebuild_blocked_cache(tx, &bead.id).await })
        })
        .await
    }

    // -- labels and comments --

    pub async fn add_label(
        &self,
        project: &str,
        id_or_fragment: &str,
        label: &str,
    ) -> CoreResult<()> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadLabelAdded { bead_id: bead.id, label: label.to_string() },
            ))
            .await?;
        Ok(())
    }

    pub async fn remove_label(
        &self,
        project: &str,
        id_or_fragment: &str,
        label: &str,
    ) -> CoreResult<()> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadLabelRemoved { bead_id: bead.id, label: label.to_string() },
            ))
            .await?;
        Ok(())
    }

    pub async fn get_labels(&self, project: &str, id_or_fragment: &str) -> CoreResult<Vec<String>> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let rows = self
            .adapter()
            .query(
                "SELECT label FROM bead_labels WHERE bead_id = ? ORDER BY label",
                &[SqlValue::from(bead.id.as_str())],
            )
            .await?;
        rows.iter().map(|row| row.text("label")).collect()
    }

    pub async fn add_comment(
        &self,
        project: &str,
        id_or_fragment: &str,
        author: &str,
        body: &str,
        parent_comment_id: Option<&str>,
    ) -> CoreResult<BeadComment> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let comment_id = format!("cmt_{}", uuid::Uuid::new_v4().simple());
        let event = self
            .store
            .append(NewEvent::new(
                project,
                EventPayload::BeadCommentAdded {
                    comment_id: comment_id.clone(),
                    bead_id: bead.id.clone(),
                    author: author.to_string(),
                    body: body.to_string(),
                    parent_id: parent_comment_id.map(str::to_string),
                },
            ))
            .await?;
        let at = crate::domain::models::ms_to_datetime(event.timestamp_ms);
        Ok(BeadComment {
            id: comment_id,
            bead_id: bead.id,
            author: author.to_string(),
            body: body.to_string(),
            parent_id: parent_comment_id.map(str::to_string),
            created_at: at,
            updated_at: at,
        })
    }

    pub async fn update_comment(
        &self,
        project: &str,
        comment_id: &str,
        body: &str,
    ) -> CoreResult<()> {
        self.require_comment(comment_id).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadCommentUpdated {
                    comment_id: comment_id.to_string(),
                    body: body.to_string(),
                },
            ))
            .await?;
        Ok(())
    }

    pub async fn delete_comment(&self, project: &str, comment_id: &str) -> CoreResult<()> {
        self.require_comment(comment_id).await?;
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::BeadCommentDeleted { comment_id: comment_id.to_string() },
            ))
            .await?;
        Ok(())
    }

    pub async fn get_comments(
        &self,
        project: &str,
        id_or_fragment: &str,
    ) -> CoreResult<Vec<BeadComment>> {
        let bead = self.get_bead(project, id_or_fragment).await?;
        let rows = self
            .adapter()
            .query(
                "SELECT id, bead_id, author, body, parent_id, created_at, updated_at
                 FROM bead_comments WHERE bead_id = ? ORDER BY created_at",
                &[SqlValue::from(bead.id.as_str())],
            )
            .await?;
        rows.iter().map(row_to_comment).collect()
    }

    async fn require_comment(&self, comment_id: &str) -> CoreResult<()> {
        let rows = self
            .adapter()
            .query(
                "SELECT id FROM bead_comments WHERE id = ?",
                &[SqlValue::from(comment_id)],
            )
            .await?;
        if rows.is_empty() {
            return Err(CoreError::not_found(format!("comment {comment_id} not found")));
        }
        Ok(())
    }

    // -- epics --

    pub async fn add_child_to_epic(
        &self,
        project: &str,
        epic_fragment: &str,
        child_fragment: &str,
    ) -> CoreResult<()> {
        let epic = self.get_bead(project, epic_fragment).await?;
        if epic.issue_type != IssueType::Epic {
            return Err(CoreError::invalid(format!("bead {} is not an epic", epic.id)));
        }
        if matches!(epic.status, BeadStatus::Closed | BeadStatus::Tombstone) {
            return Err(CoreError::conflict(format!(
                "cannot add a child to closed epic {}",
                epic.id
            )));
        }
        let child = self.get_bead(project, child_fragment).await?;

        self.store
            .append(NewEvent::new(
                project,
                EventPayload::EpicChildAdded { epic_id: epic.id, child_id: child.id },
            ))
            .await?;
        Ok(())
    }

    pub async fn remove_child_from_epic(
        &self,
        project: &str,
        epic_fragment: &str,
        child_fragment: &str,
    ) -> CoreResult<()> {
        let epic = self.get_bead(project, epic_fragment).await?;
        let child = self.get_bead(project, child_fragment).await?;
        if child.parent_id.as_deref() != Some(epic.id.as_str()) {
            return Err(CoreError::invalid(format!(
                "bead {} is not a child of epic {}",
                child.id, epic.id
            )));
        }
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::EpicChildRemoved { epic_id: epic.id, child_id: child.id },
            ))
            .await?;
        Ok(())
    }

    pub async fn get_epic_children(
        &self,
        project: &str,
        epic_fragment: &str,
    ) -> CoreResult<Vec<Bead>> {
        let epic = self.get_bead(project, epic_fragment).await?;
        self.query_beads(
            project,
            BeadFilter { parent_id: Some(epic.id), include_deleted: true, ..Default::default() },
        )
        .await
    }

    /// An epic may close once every child is closed or tombstoned.
    pub async fn is_epic_closure_eligible(
        &self,
        project: &str,
        epic_fragment: &str,
    ) -> CoreResult<bool> {
        let children = self.get_epic_children(project, epic_fragment).await?;
        Ok(children
            .iter()
            .all(|child| matches!(child.status, BeadStatus::Closed | BeadStatus::Tombstone)))
    }

    // -- scheduling queries --

    /// The open, unblocked bead with the smallest priority, ties broken by
    /// creation time.
    pub async fn get_next_ready_bead(&self, project: &str) -> CoreResult<Option<Bead>> {
        let rows = self
            .adapter()
            .query(
                &format!(
                    "{BEAD_SELECT} WHERE project_key = ? AND status = 'open'
                       AND deleted_at IS NULL
                       AND NOT EXISTS (
                           SELECT 1 FROM bead_blockers bb WHERE bb.bead_id = beads.id
                       )
                       AND NOT EXISTS (
                           SELECT 1 FROM bead_dependencies d
                           JOIN beads t ON t.id = d.depends_on_id
                           WHERE d.bead_id = beads.id AND d.relationship = 'blocks'
                             AND t.status IN ('open', 'in_progress', 'blocked')
                             AND t.deleted_at IS NULL
                       )
                     ORDER BY priority ASC, created_at ASC, id ASC
                     LIMIT 1"
                ),
                &[SqlValue::from(project)],
            )
            .await?;
        rows.first().map(row_to_bead).transpose()
    }

    pub async fn get_in_progress_beads(&self, project: &str) -> CoreResult<Vec<Bead>> {
        self.query_beads(
            project,
            BeadFilter { status: Some(BeadStatus::InProgress), ..Default::default() },
        )
        .await
    }

    /// Beads with at least one active blocker, regardless of their own
    /// status column.
    pub async fn get_blocked_beads(&self, project: &str) -> CoreResult<Vec<Bead>> {
        let rows = self
            .adapter()
            .query(
                &format!(
                    "{BEAD_SELECT} WHERE project_key = ? AND deleted_at IS NULL
                       AND EXISTS (
                           SELECT 1 FROM bead_blockers bb WHERE bb.bead_id = beads.id
                       )
                     ORDER BY priority ASC, created_at ASC"
                ),
                &[SqlValue::from(project)],
            )
            .await?;
        rows.iter().map(row_to_bead).collect()
    }

    // -- short ids and the dirty set --

    /// Resolve an id fragment to the full bead id. Succeeds iff exactly one
    /// bead id contains the fragment.
    pub async fn resolve_short_id(&self, project: &str, fragment: &str) -> CoreResult<String> {
        if fragment.trim().is_empty() {
            return Err(CoreError::invalid("bead id fragment must not be empty"));
        }

        // An exact hit wins regardless of other substring matches.
        let exact = self
            .adapter()
            .query(
                "SELECT id FROM beads WHERE project_key = ? AND id = ?",
                &[SqlValue::from(project), SqlValue::from(fragment)],
            )
            .await?;
        if let Some(row) = exact.first() {
            return row.text("id");
        }

        let escaped = fragment.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let rows = self
            .adapter()
            .query(
                "SELECT id FROM beads WHERE project_key = ? AND id LIKE ? ESCAPE '\\'
                 ORDER BY id LIMIT 3",
                &[SqlValue::from(project), SqlValue::Text(format!("%{escaped}%"))],
            )
            .await?;

        match rows.len() {
            0 => Err(CoreError::not_found(format!("no bead id matches '{fragment}'"))),
            1 => rows[0].text("id"),
            _ => {
                let candidates: Vec<String> =
                    rows.iter().filter_map(|row| row.text("id").ok()).collect();
                Err(CoreError::conflict(format!("bead id fragment '{fragment}' is ambiguous"))
                    .with_details(serde_json::json!({ "candidates": candidates })))
            }
        }
    }

    /// Beads mutated since the last export.
    pub async fn get_dirty_beads(&self, project: &str) -> CoreResult<Vec<Bead>> {
        let rows = self
            .adapter()
            .query(
                &format!(
                    "{BEAD_SELECT} WHERE project_key = ? AND dirty = 1 ORDER BY created_at"
                ),
                &[SqlValue::from(project)],
            )
            .await?;
        rows.iter().map(row_to_bead).collect()
    }

    /// Export bookkeeping, not event-sourced state: called after a
    /// successful JSONL export.
    pub async fn clear_dirty(&self, project: &str, bead_ids: &[String]) -> CoreResult<()> {
        if bead_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; bead_ids.len()].join(", ");
        let mut params: Vec<SqlValue> = vec![SqlValue::from(project)];
        params.extend(bead_ids.iter().map(|id| SqlValue::from(id.as_str())));
        self.adapter()
            .execute(
                &format!(
                    "UPDATE beads SET dirty = 0 WHERE project_key = ? AND id IN ({placeholders})"
                ),
                &params,
            )
            .await?;
        Ok(())
    }
}

const BEAD_SELECT: &str = "SELECT id, project_key, title, description, issue_type, status, \
     priority, parent_id, assignee, created_at, updated_at, closed_at, closed_reason, \
     deleted_at, deleted_by, delete_reason FROM beads";

fn row_to_bead(row: &SqlRow) -> CoreResult<Bead> {
    let issue_type_raw = row.text("issue_type")?;
    let status_raw = row.text("status")?;
    Ok(Bead {
        id: row.text("id")?,
        project_key: row.text("project_key")?,
        title: row.text("title")?,
        description: row.opt_text("description")?,
        issue_type: IssueType::from_str(&issue_type_raw).ok_or_else(|| {
            CoreError::corruption(format!("unknown issue_type '{issue_type_raw}'"))
        })?,
        status: BeadStatus::from_str(&status_raw)
            .ok_or_else(|| CoreError::corruption(format!("unknown status '{status_raw}'")))?,
        priority: row.integer("priority")?,
        parent_id: row.opt_text("parent_id")?,
        assignee: row.opt_text("assignee")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
        closed_at: row.opt_datetime("closed_at")?,
        closed_reason: row.opt_text("closed_reason")?,
        deleted_at: row.opt_datetime("deleted_at")?,
        deleted_by: row.opt_text("deleted_by")?,
        delete_reason: row.opt_text("delete_reason")?,
    })
}

fn row_to_dependency(row: &SqlRow) -> CoreResult<BeadDependency> {
    let relationship_raw = row.text("relationship")?;
    Ok(BeadDependency {
        bead_id: row.text("bead_id")?,
        depends_on_id: row.text("depends_on_id")?,
        relationship: DependencyKind::from_str(&relationship_raw).ok_or_else(|| {
            CoreError::corruption(format!("unknown relationship '{relationship_raw}'"))
        })?,
    })
}

fn row_to_comment(row: &SqlRow) -> CoreResult<BeadComment> {
    Ok(BeadComment {
        id: row.text("id")?,
        bead_id: row.text("bead_id")?,
        author: row.text("author")?,
        body: row.text("body")?,
        parent_id: row.opt_text("parent_id")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}
