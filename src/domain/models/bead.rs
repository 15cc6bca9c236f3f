//! Beads: typed work items with status, priority, and dependencies.
//!
//! "Bead" and "cell" are equivalent terms for a unit of work. Beads form a
//! graph through typed dependencies; only the `blocks` relationship feeds
//! the blocked-cache.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::errors::{CoreError, CoreResult};

/// Default priority for newly created beads. 0 is highest.
pub const DEFAULT_PRIORITY: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Epic,
    Task,
    Bug,
    Feature,
    Chore,
    Message,
}

impl Default for IssueType {
    fn default() -> Self {
        Self::Task
    }
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Chore => "chore",
            Self::Message => "message",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "epic" => Some(Self::Epic),
            "task" => Some(Self::Task),
            "bug" => Some(Self::Bug),
            "feature" => Some(Self::Feature),
            "chore" => Some(Self::Chore),
            "message" => Some(Self::Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
    Tombstone,
}

impl BeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
            Self::Tombstone => "tombstone",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "closed" => Some(Self::Closed),
            "tombstone" => Some(Self::Tombstone),
            _ => None,
        }
    }

    /// A bead in one of these states blocks its dependents.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Open | Self::InProgress | Self::Blocked)
    }

    /// Any status may transition to any other, except that `tombstone` is
    /// reserved for deletion and cannot be entered through a status change.
    pub fn validate_transition(from: Self, to: Self) -> CoreResult<()> {
        if to == Self::Tombstone {
            return Err(CoreError::invalid(format!(
                "cannot transition {} -> tombstone; tombstone is set by deletion",
                from.as_str()
            )));
        }
        Ok(())
    }
}

/// Typed edge between two beads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    Blocks,
    Related,
    ParentChild,
    DiscoveredFrom,
    RepliesTo,
    Duplicates,
    Supersedes,
    RelatesTo,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
            Self::RepliesTo => "replies-to",
            Self::Duplicates => "duplicates",
            Self::Supersedes => "supersedes",
            Self::RelatesTo => "relates-to",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "blocks" => Some(Self::Blocks),
            "related" => Some(Self::Related),
            "parent-child" => Some(Self::ParentChild),
            "discovered-from" => Some(Self::DiscoveredFrom),
            "replies-to" => Some(Self::RepliesTo),
            "duplicates" => Some(Self::Duplicates),
            "supersedes" => Some(Self::Supersedes),
            "relates-to" => Some(Self::RelatesTo),
            _ => None,
        }
    }
}

/// A work item row from the beads projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bead {
    pub id: String,
    pub project_key: String,
    pub title: String,
    pub description: Option<String>,
    pub issue_type: IssueType,
    pub status: BeadStatus,
    pub priority: i64,
    pub parent_id: Option<String>,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_reason: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub delete_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadDependency {
    pub bead_id: String,
    pub depends_on_id: String,
    pub relationship: DependencyKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeadComment {
    pub id: String,
    pub bead_id: String,
    pub author: String,
    pub body: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generate an opaque bead id: a short hash of the project key, the current
/// time, and a random tail. Substring-unique enough for short-id lookup.
pub fn generate_bead_id(project_key: &str, now_ms: i64) -> String {
    let digest = Sha256::digest(project_key.as_bytes());
    let prefix = hex::encode(&digest[..3]);
    let tail: u16 = rand::thread_rng().gen();
    format!("bd-{prefix}-{now_ms:x}{tail:04x}")
}
