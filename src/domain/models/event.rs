//! Event envelope and the typed payload union.
//!
//! Every write in the kernel is an [`Event`]: an immutable record with a
//! database-assigned, gap-free `sequence`. The payload is a tagged union
//! discriminated by the `type` string; it is persisted as two columns
//! (`event_type`, `data`) so the log can be filtered by type without parsing
//! JSON. The projection registry dispatches on the same union.

use serde::{Deserialize, Serialize};

use crate::domain::models::bead::{DependencyKind, IssueType};
use crate::domain::models::message::Importance;

/// An event as read back from the log, with assigned identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Backend row identifier. Monotonic on a given database, but only
    /// `sequence` carries ordering semantics.
    pub id: i64,
    /// Gap-free, strictly increasing within one database.
    pub sequence: i64,
    /// Tenant discriminator. Cross-project reads are forbidden by default.
    pub project_key: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// An event not yet appended; the store assigns `id` and `sequence`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub project_key: String,
    pub payload: EventPayload,
}

impl NewEvent {
    pub fn new(project_key: impl Into<String>, payload: EventPayload) -> Self {
        Self { project_key: project_key.into(), payload }
    }
}

/// Closed union of everything that can happen in a coordination session.
///
/// Variants in the outcome, checkpoint, and worker groups are log-only: the
/// projection registry deliberately ignores them, and readers tolerate tags
/// they do not handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    // -- agents --
    AgentRegistered {
        name: String,
        program: String,
        model: String,
        task_description: String,
    },
    AgentUnregistered {
        name: String,
        reason: Option<String>,
    },

    // -- messaging --
    MessageSent {
        message_id: String,
        from: String,
        to: Vec<String>,
        subject: String,
        body: String,
        thread_id: Option<String>,
        importance: Importance,
        metadata: Option<serde_json::Value>,
    },
    MessageRead {
        message_id: String,
        agent: String,
    },
    MessageAcked {
        message_id: String,
        agent: String,
    },

    // -- reservations --
    FileReserved {
        /// One pre-generated id per path pattern, so replay reproduces rows.
        reservation_ids: Vec<String>,
        agent: String,
        paths: Vec<String>,
        exclusive: bool,
        reason: Option<String>,
        expires_at_ms: Option<i64>,
    },
    FileReleased {
        agent: String,
        /// `None` releases every active reservation owned by the agent.
        paths: Option<Vec<String>>,
    },

    // -- beads (work items) --
    BeadCreated {
        bead_id: String,
        title: String,
        description: Option<String>,
        issue_type: IssueType,
        priority: i64,
        parent_id: Option<String>,
        assignee: Option<String>,
        /// Set by JSONL import to preserve the original creation time;
        /// absent for beads born in this log.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_at_ms: Option<i64>,
    },
    BeadUpdated {
        bead_id: String,
        title: Option<String>,
        description: Option<String>,
        priority: Option<i64>,
        assignee: Option<String>,
    },
    BeadAssigned {
        bead_id: String,
        assignee: Option<String>,
    },
    BeadStatusChanged {
        bead_id: String,
        from: Option<String>,
        to: String,
    },
    BeadClosed {
        bead_id: String,
        reason: Option<String>,
    },
    BeadReopened {
        bead_id: String,
    },
    BeadDeleted {
        bead_id: String,
        deleted_by: Option<String>,
        reason: Option<String>,
    },
    BeadDependencyAdded {
        bead_id: String,
        depends_on_id: String,
        relationship: DependencyKind,
    },
    BeadDependencyRemoved {
        bead_id: String,
        depends_on_id: String,
        relationship: DependencyKind,
    },
    BeadLabelAdded {
        bead_id: String,
        label: String,
    },
    BeadLabelRemoved {
        bead_id: String,
        label: String,
    },
    BeadCommentAdded {
        comment_id: String,
        bead_id: String,
        author: String,
        body: String,
        parent_id: Option<String>,
    },
    BeadCommentUpdated {
        comment_id: String,
        body: String,
    },
    BeadCommentDeleted {
        comment_id: String,
    },
    EpicChildAdded {
        epic_id: String,
        child_id: String,
    },
    EpicChildRemoved {
        epic_id: String,
        child_id: String,
    },

    // -- memory --
    MemoryStored {
        memory_id: String,
        content: String,
        metadata: serde_json::Value,
        collection: String,
        confidence: f64,
    },
    MemoryRemoved {
        memory_id: String,
    },
    MemoryValidated {
        memory_id: String,
    },

    // -- outcomes (log-only) --
    OutcomeRecorded {
        agent: String,
        bead_id: Option<String>,
        outcome: String,
        notes: Option<String>,
    },
    LessonRecorded {
        agent: Option<String>,
        lesson: String,
        memory_id: Option<String>,
    },
    DecisionRecorded {
        agent: String,
        decision: String,
        rationale: Option<String>,
    },

    // -- checkpoints (log-only) --
    CheckpointSaved {
        checkpoint_id: String,
        label: Option<String>,
        state: serde_json::Value,
    },
    CheckpointRestored {
        checkpoint_id: String,
    },

    // -- workers / sessions (log-only) --
    WorkerSpawned {
        agent: String,
        bead_id: Option<String>,
        program: String,
        model: String,
    },
    WorkerStopped {
        agent: String,
        reason: Option<String>,
    },
    SessionStarted {
        session_id: String,
        coordinator: String,
    },
    SessionEnded {
        session_id: String,
    },
}

impl EventPayload {
    /// The wire tag for this variant, identical to the serde tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentRegistered { .. } => "agent_registered",
            Self::AgentUnregistered { .. } => "agent_unregistered",
            Self::MessageSent { .. } => "message_sent",
            Self::MessageRead { .. } => "message_read",
            Self::MessageAcked { .. } => "message_acked",
            Self::FileReserved { .. } => "file_reserved",
            Self::FileReleased { .. } => "file_released",
            Self::BeadCreated { .. } => "bead_created",
            Self::BeadUpdated { .. } => "bead_updated",
            Self::BeadAssigned { .. } => "bead_assigned",
            Self::BeadStatusChanged { .. } => "bead_status_changed",
            Self::BeadClosed { .. } => "bead_closed",
            Self::BeadReopened { .. } => "bead_reopened",
            Self::BeadDeleted { .. } => "bead_deleted",
            Self::BeadDependencyAdded { .. } => "bead_dependency_added",
            Self::BeadDependencyRemoved { .. } => "bead_dependency_removed",
            Self::BeadLabelAdded { .. } => "bead_label_added",
            Self::BeadLabelRemoved { .. } => "bead_label_removed",
            Self::BeadCommentAdded { .. } => "bead_comment_added",
            Self::BeadCommentUpdated { .. } => "bead_comment_updated",
            Self::BeadCommentDeleted { .. } => "bead_comment_deleted",
            Self::EpicChildAdded { .. } => "epic_child_added",
            Self::EpicChildRemoved { .. } => "epic_child_removed",
            Self::MemoryStored { .. } => "memory_stored",
            Self::MemoryRemoved { .. } => "memory_removed",
            Self::MemoryValidated { .. } => "memory_validated",
            Self::OutcomeRecorded { .. } => "outcome_recorded",
            Self::LessonRecorded { .. } => "lesson_recorded",
            Self::DecisionRecorded { .. } => "decision_recorded",
            Self::CheckpointSaved { .. } => "checkpoint_saved",
            Self::CheckpointRestored { .. } => "checkpoint_restored",
            Self::WorkerSpawned { .. } => "worker_spawned",
            Self::WorkerStopped { .. } => "worker_stopped",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionEnded { .. } => "session_ended",
        }
    }

    /// The agent name this event was performed by, when the payload names
    /// one. Used to bump `agents.last_active_at`.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::AgentRegistered { name, .. } | Self::AgentUnregistered { name, .. } => {
                Some(name)
            }
            Self::MessageSent { from, .. } => Some(from),
            Self::MessageRead { agent, .. }
            | Self::MessageAcked { agent, .. }
            | Self::FileReserved { agent, .. }
            | Self::FileReleased { agent, .. }
            | Self::OutcomeRecorded { agent, .. }
            | Self::DecisionRecorded { agent, .. }
            | Self::WorkerSpawned { agent, .. }
            | Self::WorkerStopped { agent, .. } => Some(agent),
            Self::BeadCommentAdded { author, .. } => Some(author),
            Self::LessonRecorded { agent, .. } => agent.as_deref(),
            _ => None,
        }
    }

    /// Serialise just the `data` half of the tagged representation.
    pub fn data_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let tagged = serde_json::to_value(self)?;
        Ok(tagged.get("data").cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Rebuild a payload from the stored `(event_type, data)` columns.
    pub fn from_parts(
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "type": event_type, "data": data }))
    }
}
