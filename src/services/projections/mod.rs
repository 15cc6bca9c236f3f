//! Projection registry: the single place projection tables are written.
//!
//! [`apply`] is deterministic with respect to `(event, current state)` so a
//! replay of the same log reproduces identical tables. Log-only event
//! variants (outcomes, checkpoints, workers, sessions) fall through to the
//! actor-activity bump and nothing else.

mod agents;
mod beads;
mod memory;
mod messages;
mod reservations;

pub(crate) use beads::rebuild_blocked_cache;

use crate::domain::errors::CoreResult;
use crate::domain::models::{ms_to_datetime, Event, EventPayload};
use crate::domain::ports::storage::StorageTx;

/// Projection tables in truncation order. Replay with `clear_views` wipes
/// exactly these; the embeddings side table survives because the log does
/// not carry vectors.
pub const PROJECTION_TABLES: &[&str] = &[
    "agents",
    "messages",
    "message_recipients",
    "reservations",
    "beads",
    "bead_dependencies",
    "bead_blockers",
    "bead_labels",
    "bead_comments",
    "memories",
];

/// Apply one event to the projection tables inside the caller's transaction.
pub async fn apply(event: &Event, tx: &mut dyn StorageTx) -> CoreResult<()> {
    let at = ms_to_datetime(event.timestamp_ms);
    let project = event.project_key.as_str();

    match &event.payload {
        EventPayload::AgentRegistered { name, program, model, task_description } => {
            agents::apply_registered(tx, project, name, program, model, task_description, at)
                .await?;
        }
        EventPayload::AgentUnregistered { name, .. } => {
            agents::apply_unregistered(tx, project, name).await?;
        }

        EventPayload::MessageSent {
            message_id,
            from,
            to,
            subject,
            body,
            thread_id,
            importance,
            metadata,
        } => {
            messages::apply_sent(
                tx,
                project,
                message_id,
                from,
                to,
                subject,
                body,
                thread_id.as_deref(),
                *importance,
                metadata.as_ref(),
                event.sequence,
                at,
            )
            .await?;
        }
        EventPayload::MessageRead { message_id, agent } => {
            messages::apply_read(tx, message_id, agent, at).await?;
        }
        EventPayload::MessageAcked { message_id, agent } => {
            messages::apply_acked(tx, message_id, agent, at).await?;
        }

        EventPayload::FileReserved {
            reservation_ids,
            agent,
            paths,
            exclusive,
            reason,
            expires_at_ms,
        } => {
            reservations::apply_reserved(
                tx,
                project,
                reservation_ids,
                agent,
                paths,
                *exclusive,
                reason.as_deref(),
                expires_at_ms.map(ms_to_datetime),
                at,
            )
            .await?;
        }
        EventPayload::FileReleased { agent, paths } => {
            reservations::apply_released(tx, project, agent, paths.as_deref(), at).await?;
        }

        EventPayload::BeadCreated {
            bead_id,
            title,
            description,
            issue_type,
            priority,
            parent_id,
            assignee,
            created_at_ms,
        } => {
            beads::apply_created(
                tx,
                project,
                bead_id,
                title,
                description.as_deref(),
                *issue_type,
                *priority,
                parent_id.as_deref(),
                assignee.as_deref(),
                created_at_ms.map_or(at, ms_to_datetime),
                at,
            )
            .await?;
        }
        EventPayload::BeadUpdated { bead_id, title, description, priority, assignee } => {
            beads::apply_updated(
                tx,
                bead_id,
                title.as_deref(),
                description.as_deref(),
                *priority,
                assignee.as_deref(),
                at,
            )
            .await?;
        }
        EventPayload::BeadAssigned { bead_id, assignee } => {
            beads::apply_assigned(tx, bead_id, assignee.as_deref(), at).await?;
        }
        EventPayload::BeadStatusChanged { bead_id, to, .. } => {
            beads::apply_status_changed(tx, bead_id, to, at).await?;
        }
        EventPayload::BeadClosed { bead_id, reason } => {
            beads::apply_closed(tx, bead_id, reason.as_deref(), at).await?;
        }
        EventPayload::BeadReopened { bead_id } => {
            beads::apply_reopened(tx, bead_id, at).await?;
        }
        EventPayload::BeadDeleted { bead_id, deleted_by, reason } => {
            beads::apply_deleted(tx, bead_id, deleted_by.as_deref(), reason.as_deref(), at)
                .await?;
        }
        EventPayload::BeadDependencyAdded { bead_id, depends_on_id, relationship } => {
            beads::apply_dependency_added(tx, bead_id, depends_on_id, *relationship, at).await?;
        }
        EventPayload::BeadDependencyRemoved { bead_id, depends_on_id, relationship } => {
            beads::apply_dependency_removed(tx, bead_id, depends_on_id, *relationship, at)
                .await?;
        }
        EventPayload::BeadLabelAdded { bead_id, label } => {
            beads::apply_label_added(tx, bead_id, label, at).await?;
        }
        EventPayload::BeadLabelRemoved { bead_id, label } => {
            beads::apply_label_removed(tx, bead_id, label, at).await?;
        }
        EventPayload::BeadCommentAdded { comment_id, bead_id, author, body, parent_id } => {
            beads::apply_comment_added(
                tx,
                comment_id,
                bead_id,
                author,
                body,
                parent_id.as_deref(),
                at,
            )
            .await?;
        }
        EventPayload::BeadCommentUpdated { comment_id, body } => {
            beads::apply_comment_updated(tx, comment_id, body, at).await?;
        }
        EventPayload::BeadCommentDeleted { comment_id } => {
            beads::apply_comment_deleted(tx, comment_id).await?;
        }
        EventPayload::EpicChildAdded { epic_id, child_id } => {
            beads::apply_epic_child_added(tx, epic_id, child_id, at).await?;
        }
        EventPayload::EpicChildRemoved { child_id, .. } => {
            beads::apply_epic_child_removed(tx, child_id, at).await?;
        }

        EventPayload::MemoryStored { memory_id, content, metadata, collection, confidence } => {
            memory::apply_stored(tx, memory_id, content, metadata, collection, *confidence, at)
                .await?;
        }
        EventPayload::MemoryRemoved { memory_id } => {
            memory::apply_removed(tx, memory_id).await?;
        }
        EventPayload::MemoryValidated { memory_id } => {
            memory::apply_validated(tx, memory_id, at).await?;
        }

        // Log-only variants: no projection.
        EventPayload::OutcomeRecorded { .. }
        | EventPayload::LessonRecorded { .. }
        | EventPayload::DecisionRecorded { .. }
        | EventPayload::CheckpointSaved { .. }
        | EventPayload::CheckpointRestored { .. }
        | EventPayload::WorkerSpawned { .. }
        | EventPayload::WorkerStopped { .. }
        | EventPayload::SessionStarted { .. }
        | EventPayload::SessionEnded { .. } => {}
    }

    // Any event naming an agent refreshes its activity clock. The
    // registration event itself already wrote both timestamps.
    if !matches!(event.payload, EventPayload::AgentRegistered { .. }) {
        if let Some(actor) = event.payload.actor() {
            agents::touch_activity(tx, project, actor, at).await?;
        }
    }

    Ok(())
}

/// Truncate every projection table. Used by replay with `clear_views`.
pub async fn truncate_all(tx: &mut dyn StorageTx) -> CoreResult<()> {
    for table in PROJECTION_TABLES {
        tx.execute(&format!("DELETE FROM {table}"), &[]).await?;
    }
    Ok(())
}
