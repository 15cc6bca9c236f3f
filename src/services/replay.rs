//! Deterministic projection rebuild and JSONL export/import.
//!
//! Replay truncates the projection tables (when asked) and re-applies every
//! event through the projection registry in sequence order, inside one
//! transaction. Export writes the bead graph as one JSON object per line to
//! the project's `.hive/` directory for git synchronisation; import emits
//! events so the log stays the source of truth.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{BeadStatus, EventPayload, IssueType, NewEvent};
use crate::domain::ports::storage::with_tx;
use crate::services::beads::BeadService;
use crate::services::event_store::{build_read_query, row_to_event, EventFilter, EventStore};
use crate::services::projections;

/// File name of the cell export inside the coordination directory.
pub const ISSUES_FILE: &str = "issues.jsonl";

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub project_key: Option<String>,
    pub from_sequence: Option<i64>,
    pub clear_views: bool,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub events_replayed: usize,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub exported: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// One exported cell line. Timestamps are integer milliseconds on the way
/// out; the reader also accepts numeric strings and RFC3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssueLine {
    id: String,
    title: String,
    status: String,
    issue_type: String,
    priority: i64,
    created_at: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed_at: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed_reason: Option<String>,
}

#[derive(Clone)]
pub struct ReplayService {
    store: EventStore,
}

impl ReplayService {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    /// Rebuild projections from the log. Two replays of the same log
    /// produce identical tables.
    pub async fn replay_events(&self, options: ReplayOptions) -> CoreResult<ReplayReport> {
        let started = Instant::now();

        let mut filter = EventFilter::new();
        if let Some(project) = &options.project_key {
            filter = filter.project_key(project.clone());
        }
        if let Some(from) = options.from_sequence {
            filter = filter.after_sequence(from - 1);
        }
        let (sql, params) = build_read_query(&filter);
        let clear_views = options.clear_views;

        let events_replayed = with_tx(self.store.adapter().as_ref(), move |tx| {
            Box::pin(async move {
                if clear_views {
                    projections::truncate_all(tx).await?;
                }
                let rows = tx.query(&sql, &params).await?;
                let mut replayed = 0;
                for row in &rows {
                    let event = row_to_event(row)?;
                    projections::apply(&event, tx).await?;
                    replayed += 1;
                }
                Ok(replayed)
            })
        })
        .await?;

        let report = ReplayReport { events_replayed, duration_ms: started.elapsed().as_millis() };
        tracing::info!(
            events = report.events_replayed,
            duration_ms = report.duration_ms,
            "projection replay complete"
        );
        Ok(report)
    }

    /// Export the project's bead graph to `<hive_dir>/issues.jsonl` and
    /// clear the dirty flags of everything written.
    pub async fn export_issues(&self, project: &str, hive_dir: &Path) -> CoreResult<ExportReport> {
        let beads = BeadService::new(self.store.clone());
        let all = beads
            .query_beads(
                project,
                crate::services::beads::BeadFilter { limit: None, ..Default::default() },
            )
            .await?;

        let mut lines = String::new();
        for bead in &all {
            let line = IssueLine {
                id: bead.id.clone(),
                title: bead.title.clone(),
                status: bead.status.as_str().to_string(),
                issue_type: bead.issue_type.as_str().to_string(),
                priority: bead.priority,
                created_at: serde_json::json!(bead.created_at.timestamp_millis()),
                description: bead.description.clone(),
                parent_id: bead.parent_id.clone(),
                closed_at: bead.closed_at.map(|t| serde_json::json!(t.timestamp_millis())),
                closed_reason: bead.closed_reason.clone(),
            };
            lines.push_str(&serde_json::to_string(&line)?);
            lines.push('\n');
        }

        tokio::fs::create_dir_all(hive_dir)
            .await
            .map_err(|e| CoreError::unavailable(format!("failed to create {}: {e}", hive_dir.display())))?;
        let path = hive_dir.join(ISSUES_FILE);
        tokio::fs::write(&path, lines)
            .await
            .map_err(|e| CoreError::unavailable(format!("failed to write {}: {e}", path.display())))?;

        let ids: Vec<String> = all.iter().map(|b| b.id.clone()).collect();
        beads.clear_dirty(project, &ids).await?;

        Ok(ExportReport { exported: all.len(), path })
    }

    /// Import cells from a JSONL file, skipping ids already present. Each
    /// imported cell goes through the event log so replay still reproduces
    /// it.
    pub async fn import_issues(&self, project: &str, path: &Path) -> CoreResult<ImportReport> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::not_found(format!("cannot read {}: {e}", path.display())))?;

        let beads = BeadService::new(self.store.clone());
        let existing: std::collections::HashSet<String> = beads
            .query_beads(
                project,
                crate::services::beads::BeadFilter { include_deleted: true, ..Default::default() },
            )
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();

        let mut imported = 0;
        let mut skipped = 0;
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let issue: IssueLine = serde_json::from_str(line).map_err(|e| {
                CoreError::invalid(format!("malformed JSONL at line {}: {e}", line_no + 1))
            })?;
            if existing.contains(&issue.id) {
                skipped += 1;
                continue;
            }

            let issue_type = IssueType::from_str(&issue.issue_type).ok_or_else(|| {
                CoreError::invalid(format!("unknown issue_type '{}' at line {}", issue.issue_type, line_no + 1))
            })?;
            let status = BeadStatus::from_str(&issue.status).ok_or_else(|| {
                CoreError::invalid(format!("unknown status '{}' at line {}", issue.status, line_no + 1))
            })?;
            let created_at_ms = lenient_ms(&issue.created_at).ok_or_else(|| {
                CoreError::invalid(format!("bad created_at at line {}", line_no + 1))
            })?;

            let mut events = vec![NewEvent::new(
                project,
                EventPayload::BeadCreated {
                    bead_id: issue.id.clone(),
                    title: issue.title.clone(),
                    description: issue.description.clone(),
                    issue_type,
                    priority: issue.priority,
                    parent_id: issue.parent_id.clone(),
                    assignee: None,
                    created_at_ms: Some(created_at_ms),
                },
            )];
            match status {
                BeadStatus::Open => {}
                BeadStatus::Closed => {
                    events.push(NewEvent::new(
                        project,
                        EventPayload::BeadClosed {
                            bead_id: issue.id.clone(),
                            reason: issue.closed_reason.clone(),
                        },
                    ));
                }
                BeadStatus::Tombstone => {
                    events.push(NewEvent::new(
                        project,
                        EventPayload::BeadDeleted {
                            bead_id: issue.id.clone(),
                            deleted_by: None,
                            reason: None,
                        },
                    ));
                }
                other => {
                    events.push(NewEvent::new(
                        project,
                        EventPayload::BeadStatusChanged {
                            bead_id: issue.id.clone(),
                            from: Some("open".to_string()),
                            to: other.as_str().to_string(),
                        },
                    ));
                }
            }
            self.store.append_batch(events).await?;
            imported += 1;
        }

        Ok(ImportReport { imported, skipped })
    }
}

/// Coerce a JSONL timestamp to integer milliseconds. Storage backends
/// disagree on whether they hand back integers or numeric strings, so both
/// are accepted, as is RFC3339.
#[allow(clippy::cast_possible_truncation)]
fn lenient_ms(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => {
            n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))
        }
        serde_json::Value::String(s) => {
            if let Ok(ms) = s.parse::<i64>() {
                return Some(ms);
            }
            if let Ok(ms) = s.parse::<f64>() {
                return Some(ms as i64);
            }
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.timestamp_millis())
        }
        _ => None,
    }
}

/// Resolve the canonical `.hive/` directory under a project root.
pub fn hive_dir(project_root: &Path) -> PathBuf {
    project_root.join(".hive")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_ms_accepts_all_wire_forms() {
        assert_eq!(lenient_ms(&serde_json::json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
        assert_eq!(lenient_ms(&serde_json::json!("1700000000000")), Some(1_700_000_000_000));
        assert_eq!(lenient_ms(&serde_json::json!(1_700_000_000_000.0)), Some(1_700_000_000_000));
        let rfc = lenient_ms(&serde_json::json!("2024-01-01T00:00:00Z")).unwrap();
        assert_eq!(rfc, 1_704_067_200_000);
        assert_eq!(lenient_ms(&serde_json::json!(null)), None);
        assert_eq!(lenient_ms(&serde_json::json!("not-a-time")), None);
    }

    #[test]
    fn test_hive_dir() {
        assert_eq!(hive_dir(Path::new("/srv/proj")), PathBuf::from("/srv/proj/.hive"));
    }
}
