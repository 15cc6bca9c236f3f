//! Domain models: events, projection row types, and id generation.

pub mod agent;
pub mod bead;
pub mod event;
pub mod memory;
pub mod message;
pub mod reservation;

pub use agent::Agent;
pub use bead::{
    generate_bead_id, Bead, BeadComment, BeadDependency, BeadStatus, DependencyKind, IssueType,
    DEFAULT_PRIORITY,
};
pub use event::{Event, EventPayload, NewEvent};
pub use memory::{
    cosine_similarity, generate_memory_id, validate_confidence, validate_embedding, MatchType,
    MemoryEntry, MemorySearchResult, DEFAULT_CONFIDENCE, EMBEDDING_DIM,
};
pub use message::{Importance, Message};
pub use reservation::Reservation;

use chrono::{DateTime, TimeZone, Utc};

/// Milliseconds since the Unix epoch, the event-log timestamp unit.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert an event timestamp to a `DateTime`, clamping out-of-range input.
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_round_trip() {
        let ms = 1_700_000_000_123_i64;
        assert_eq!(ms_to_datetime(ms).timestamp_millis(), ms);
    }
}
