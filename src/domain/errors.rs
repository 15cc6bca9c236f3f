//! Domain errors for the hivemind coordination kernel.
//!
//! Every fallible operation in the crate returns [`CoreError`], which carries
//! one of a closed set of [`ErrorKind`]s. The adapter layer translates
//! dialect-specific database errors into these kinds before they surface, so
//! callers never see a raw driver error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of error kinds surfaced by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced entity id absent.
    NotFound,
    /// Reservation overlap, ambiguous short-id, child of a closed epic.
    Conflict,
    /// Schema validation, empty recipient list, bad status transition,
    /// embedding dimension mismatch. Never retried.
    Invalid,
    /// Embedder down, database unreachable, daemon not running.
    Unavailable,
    /// Lock timeout or rollback-after-error composite; retry with backoff.
    Transient,
    /// Projection inconsistency detected at read time. Replay recommended.
    Corruption,
    /// Migration failure or schema version collision. Abort the process.
    Fatal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Invalid => "invalid",
            Self::Unavailable => "unavailable",
            Self::Transient => "transient",
            Self::Corruption => "corruption",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type shared by every subsystem of the kernel.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Corruption, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Returns true if the caller may retry the operation with backoff.
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient | ErrorKind::Unavailable)
    }

    /// Boundary envelope: `{"error": {"kind", "message", "details"?}}`.
    ///
    /// Plugin hosts serialise this instead of the Rust error type, so no
    /// language-specific error object crosses the tool surface.
    pub fn to_envelope(&self) -> serde_json::Value {
        let mut inner = serde_json::json!({
            "kind": self.kind.as_str(),
            "message": self.message,
        });
        if let Some(details) = &self.details {
            inner["details"] = details.clone();
        }
        serde_json::json!({ "error": inner })
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found("row not found"),
            sqlx::Error::PoolTimedOut => Self::transient("database pool timed out"),
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                Self::unavailable(err.to_string())
            }
            sqlx::Error::Database(db) => {
                if db.is_unique_violation() {
                    Self::transient(format!("unique constraint violation: {db}"))
                } else if db.is_check_violation() || db.is_foreign_key_violation() {
                    Self::invalid(format!("constraint violation: {db}"))
                } else {
                    Self::new(ErrorKind::Unavailable, format!("database error: {db}"))
                }
            }
            _ => Self::unavailable(format!("database error: {err}")),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid(format!("serialization error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = CoreError::not_found("bead bd-123 not found");
        assert_eq!(err.to_string(), "not_found: bead bd-123 not found");
    }

    #[test]
    fn test_envelope_shape() {
        let err = CoreError::conflict("reservation overlap")
            .with_details(serde_json::json!({"pattern": "src/**"}));
        let envelope = err.to_envelope();
        assert_eq!(envelope["error"]["kind"], "conflict");
        assert_eq!(envelope["error"]["message"], "reservation overlap");
        assert_eq!(envelope["error"]["details"]["pattern"], "src/**");
    }

    #[test]
    fn test_envelope_omits_missing_details() {
        let envelope = CoreError::invalid("empty recipient list").to_envelope();
        assert!(envelope["error"].get("details").is_none());
    }

    #[test]
    fn test_is_transient() {
        assert!(CoreError::transient("lock timeout").is_transient());
        assert!(CoreError::unavailable("embedder down").is_transient());
        assert!(!CoreError::invalid("bad transition").is_transient());
        assert!(!CoreError::fatal("version collision").is_transient());
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err: CoreError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
