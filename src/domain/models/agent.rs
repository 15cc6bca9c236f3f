//! Agent roster row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered agent within one project.
///
/// Created by an `agent_registered` event; `last_active_at` is bumped by any
/// later event naming this agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub project_key: String,
    pub program: String,
    pub model: String,
    pub task_description: String,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}
