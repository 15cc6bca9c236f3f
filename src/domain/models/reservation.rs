//! Advisory file-path reservations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An advisory claim on a file-path glob by one agent.
///
/// Active iff `released_at` is unset and `expires_at` (when present) is in
/// the future. The arbiter never blocks filesystem I/O; it only reports
/// conflicts between claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub project_key: String,
    pub agent_name: String,
    pub path_pattern: String,
    pub exclusive: bool,
    pub reason: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.released_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(expires_at: Option<DateTime<Utc>>, released_at: Option<DateTime<Utc>>) -> Reservation {
        Reservation {
            id: "r1".into(),
            project_key: "p".into(),
            agent_name: "worker".into(),
            path_pattern: "src/**".into(),
            exclusive: true,
            reason: None,
            acquired_at: Utc::now(),
            expires_at,
            released_at,
        }
    }

    #[test]
    fn test_active_without_expiry() {
        assert!(reservation(None, None).is_active(Utc::now()));
    }

    #[test]
    fn test_expired_is_inactive() {
        let past = Utc::now() - Duration::seconds(5);
        assert!(!reservation(Some(past), None).is_active(Utc::now()));
    }

    #[test]
    fn test_released_is_inactive() {
        assert!(!reservation(None, Some(Utc::now())).is_active(Utc::now()));
    }
}
