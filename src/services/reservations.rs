//! Advisory file-reservation arbiter.
//!
//! Conflict detection runs before the `file_reserved` event is emitted, so a
//! conflicting claim never reaches the log. Overlap between two glob
//! patterns uses a conservative syntactic check: `**` crosses directories,
//! `*` stays within one segment, and ambiguity resolves toward overlap
//! (false positives are acceptable for an advisory arbiter).

use chrono::{Duration, Utc};
use globset::GlobBuilder;
use std::future::Future;
use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{EventPayload, NewEvent, Reservation};
use crate::domain::ports::storage::{SqlRow, SqlValue, StorageAdapter};
use crate::services::event_store::EventStore;

#[derive(Debug, Clone)]
pub struct ReserveOptions {
    pub reason: Option<String>,
    pub exclusive: bool,
    pub ttl_seconds: Option<u64>,
}

impl Default for ReserveOptions {
    fn default() -> Self {
        Self { reason: None, exclusive: true, ttl_seconds: None }
    }
}

/// Reservation operations over the reservations projection.
#[derive(Clone)]
pub struct ReservationService {
    store: EventStore,
}

impl ReservationService {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        self.store.adapter()
    }

    /// Claim one or more path patterns for an agent.
    ///
    /// Raises `Conflict` when any overlapping active reservation is
    /// exclusive and owned by another agent, or when this claim is exclusive
    /// and any overlapping active reservation belongs to another agent.
    /// Retrying identical parameters while the claim is active is a no-op
    /// success.
    pub async fn reserve_files(
        &self,
        project: &str,
        agent: &str,
        paths: &[String],
        options: ReserveOptions,
    ) -> CoreResult<Vec<Reservation>> {
        if paths.is_empty() {
            return Err(CoreError::invalid("reserve_files requires at least one path"));
        }

        let now = Utc::now();
        let active = self.active_reservations(project).await?;

        // Idempotent retry: every requested pattern already actively held by
        // this agent at the same exclusivity.
        let held: Vec<&Reservation> = paths
            .iter()
            .filter_map(|path| {
                active.iter().find(|r| {
                    r.agent_name == agent
                        && r.path_pattern == *path
                        && r.exclusive == options.exclusive
                })
            })
            .collect();
        if held.len() == paths.len() {
            return Ok(held.into_iter().cloned().collect());
        }

        for reservation in &active {
            if reservation.agent_name == agent {
                continue;
            }
            for path in paths {
                if patterns_overlap(&reservation.path_pattern, path)
                    && (reservation.exclusive || options.exclusive)
                {
                    return Err(CoreError::conflict(format!(
                        "path '{path}' conflicts with reservation held by '{}' on '{}'",
                        reservation.agent_name, reservation.path_pattern
                    ))
                    .with_details(serde_json::json!({
                        "holder": reservation.agent_name,
                        "held_pattern": reservation.path_pattern,
                        "requested_pattern": path,
                        "exclusive": reservation.exclusive,
                    })));
                }
            }
        }

        let reservation_ids: Vec<String> =
            paths.iter().map(|_| format!("rsv_{}", uuid::Uuid::new_v4().simple())).collect();
        let expires_at = options
            .ttl_seconds
            .map(|ttl| now + Duration::seconds(i64::try_from(ttl).unwrap_or(i64::MAX)));

        let event = self
            .store
            .append(NewEvent::new(
                project,
                EventPayload::FileReserved {
                    reservation_ids: reservation_ids.clone(),
                    agent: agent.to_string(),
                    paths: paths.to_vec(),
                    exclusive: options.exclusive,
                    reason: options.reason.clone(),
                    expires_at_ms: expires_at.map(|t| t.timestamp_millis()),
                },
            ))
            .await?;

        let acquired_at = crate::domain::models::ms_to_datetime(event.timestamp_ms);
        Ok(paths
            .iter()
            .zip(reservation_ids)
            .map(|(path, id)| Reservation {
                id,
                project_key: project.to_string(),
                agent_name: agent.to_string(),
                path_pattern: path.clone(),
                exclusive: options.exclusive,
                reason: options.reason.clone(),
                acquired_at,
                expires_at,
                released_at: None,
            })
            .collect())
    }

    /// Release the agent's reservations matching `paths`, or all of them
    /// when `paths` is `None`.
    pub async fn release_files(
        &self,
        project: &str,
        agent: &str,
        paths: Option<&[String]>,
    ) -> CoreResult<()> {
        self.store
            .append(NewEvent::new(
                project,
                EventPayload::FileReleased {
                    agent: agent.to_string(),
                    paths: paths.map(<[String]>::to_vec),
                },
            ))
            .await?;
        Ok(())
    }

    /// Acquire, run `work`, and release on every exit path including a
    /// failing `work`.
    pub async fn scoped_reservation<T, Fut>(
        &self,
        project: &str,
        agent: &str,
        paths: &[String],
        options: ReserveOptions,
        work: Fut,
    ) -> CoreResult<T>
    where
        Fut: Future<Output = CoreResult<T>> + Send,
        T: Send,
    {
        self.reserve_files(project, agent, paths, options).await?;
        let result = work.await;
        let release = self.release_files(project, agent, Some(paths)).await;
        match (result, release) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), _) => Err(err),
        }
    }

    /// Mark reservations whose deadline passed as released. Expiry is a
    /// derived truth: no event is emitted, and active-queries exclude
    /// expired rows regardless of whether this ran.
    pub async fn expire_tick(&self, project: &str) -> CoreResult<u64> {
        self.adapter()
            .execute(
                "UPDATE reservations SET released_at = expires_at
                 WHERE project_key = ? AND released_at IS NULL
                   AND expires_at IS NOT NULL AND expires_at <= ?",
                &[SqlValue::from(project), SqlValue::Timestamp(Utc::now())],
            )
            .await
    }

    /// Active reservations for a project.
    pub async fn active_reservations(&self, project: &str) -> CoreResult<Vec<Reservation>> {
        let rows = self
            .adapter()
            .query(
                "SELECT id, project_key, agent_name, path_pattern, exclusive, reason,
                        acquired_at, expires_at, released_at
                 FROM reservations
                 WHERE project_key = ? AND released_at IS NULL
                   AND (expires_at IS NULL OR expires_at > ?)
                 ORDER BY acquired_at",
                &[SqlValue::from(project), SqlValue::Timestamp(Utc::now())],
            )
            .await?;
        rows.iter().map(row_to_reservation).collect()
    }
}

fn row_to_reservation(row: &SqlRow) -> CoreResult<Reservation> {
    Ok(Reservation {
        id: row.text("id")?,
        project_key: row.text("project_key")?,
        agent_name: row.text("agent_name")?,
        path_pattern: row.text("path_pattern")?,
        exclusive: row.boolean("exclusive")?,
        reason: row.opt_text("reason")?,
        acquired_at: row.datetime("acquired_at")?,
        expires_at: row.opt_datetime("expires_at")?,
        released_at: row.opt_datetime("released_at")?,
    })
}

/// The text before the first glob metacharacter.
fn literal_prefix(pattern: &str) -> &str {
    let end = pattern
        .find(|c| matches!(c, '*' | '?' | '[' | '{'))
        .unwrap_or(pattern.len());
    &pattern[..end]
}

fn has_meta(pattern: &str) -> bool {
    literal_prefix(pattern).len() != pattern.len()
}

fn matcher_accepts(pattern: &str, path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher().is_match(path))
        .unwrap_or(true) // an unparsable pattern is treated as overlapping
}

/// Two patterns overlap when some path could match both.
///
/// Checks, in order: string equality; either matcher accepting the other's
/// literal prefix; and, when either side carries a metacharacter, mutual
/// literal-prefix containment. The last rule over-reports (`src/*.rs` vs
/// `src/*.md`), which is the conservative direction for an advisory arbiter.
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    let a_prefix = literal_prefix(a).trim_end_matches('/');
    let b_prefix = literal_prefix(b).trim_end_matches('/');

    if matcher_accepts(a, b_prefix) || matcher_accepts(b, a_prefix) {
        return true;
    }
    if matcher_accepts(a, b) || matcher_accepts(b, a) {
        return true;
    }

    if has_meta(a) || has_meta(b) {
        let a_lit = literal_prefix(a);
        let b_lit = literal_prefix(b);
        return a_lit.starts_with(b_lit) || b_lit.starts_with(a_lit);
    }

    false
}
