//! Directed inter-agent messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message importance, highest first in inbox ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Importance {
    fn default() -> Self {
        Self::Normal
    }
}

impl Importance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// Sort key: urgent sorts before low.
    pub fn rank(self) -> i64 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// A message as seen by one recipient. Read and ack state are per-recipient;
/// the same `id` appears once per addressee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub project_key: String,
    pub from_agent: String,
    pub to_agent: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub importance: Importance,
    pub metadata: Option<serde_json::Value>,
    /// Sequence of the `message_sent` event; total order within a thread.
    pub sequence: i64,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Inbox summary form: body truncated to at most `max_bytes`, cut on a
    /// char boundary.
    pub fn truncated(mut self, max_bytes: usize) -> Self {
        if self.body.len() > max_bytes {
            let mut end = max_bytes;
            while end > 0 && !self.body.is_char_boundary(end) {
                end -= 1;
            }
            self.body.truncate(end);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_rank_ordering() {
        assert!(Importance::Urgent.rank() < Importance::High.rank());
        assert!(Importance::High.rank() < Importance::Normal.rank());
        assert!(Importance::Normal.rank() < Importance::Low.rank());
    }

    #[test]
    fn test_importance_round_trip() {
        for imp in [Importance::Low, Importance::Normal, Importance::High, Importance::Urgent] {
            assert_eq!(Importance::from_str(imp.as_str()), Some(imp));
        }
        assert_eq!(Importance::from_str("critical"), None);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let msg = Message {
            id: "m1".into(),
            project_key: "p".into(),
            from_agent: "a".into(),
            to_agent: "b".into(),
            subject: "s".into(),
            body: "héllo wörld".into(),
            thread_id: None,
            importance: Importance::Normal,
            metadata: None,
            sequence: 1,
            sent_at: Utc::now(),
            read_at: None,
            acked_at: None,
        };
        let truncated = msg.truncated(2);
        assert!(truncated.body.len() <= 2);
        assert!(truncated.body.is_char_boundary(truncated.body.len()));
    }
}
