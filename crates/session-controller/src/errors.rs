//! Session controller error types.
//!
//! Error types map to wire `ErrorCode` values for client responses. Internal
//! details are logged server-side but not exposed to clients.

use collab_engines::EngineError;
use thiserror::Error;

/// Session controller error type.
///
/// Maps to wire `ErrorCode` values:
/// - `PermissionDenied`: `FORBIDDEN` (3)
/// - `SessionNotFound`, engine NotFound family: `NOT_FOUND` (4)
/// - engine conflicts (`AlreadyAssigned`, `AlreadyQueued`, `AlreadyVoted`,
///   `InsufficientOptions`, `SessionLocked`, ...): `CONFLICT` (5)
/// - `Config`, `Internal`: `INTERNAL_ERROR` (6)
/// - `CapacityExceeded`, `Draining`: `CAPACITY_EXCEEDED` (7)
/// - `CaptureUnavailable`: `DEVICE_UNAVAILABLE` (8)
#[derive(Debug, Error)]
pub enum SessionError {
    /// An engine rejected the operation.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Caller lacks host privileges for this operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Controller is at session capacity.
    #[error("Controller at capacity")]
    CapacityExceeded,

    /// Controller is draining (graceful shutdown).
    #[error("Controller is draining")]
    Draining,

    /// Conflict error (e.g., participant already in session).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns the wire `ErrorCode` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            SessionError::Config(_) | SessionError::Internal(_) => 6, // INTERNAL_ERROR
            SessionError::PermissionDenied(_) => 3,                   // FORBIDDEN
            SessionError::SessionNotFound(_) => 4,                    // NOT_FOUND
            SessionError::Conflict(_) => 5,                           // CONFLICT
            SessionError::CapacityExceeded | SessionError::Draining => 7, // CAPACITY_EXCEEDED
            SessionError::Engine(e) => match e {
                EngineError::RoomNotFound
                | EngineError::EntryNotFound
                | EngineError::PollNotFound
                | EngineError::OptionNotFound
                | EngineError::ParticipantNotFound => 4, // NOT_FOUND
                EngineError::CaptureUnavailable(_) => 8, // DEVICE_UNAVAILABLE
                EngineError::AlreadyAssigned
                | EngineError::AlreadyQueued
                | EngineError::AlreadyVoted
                | EngineError::InsufficientOptions
                | EngineError::SessionLocked
                | EngineError::Conflict(_) => 5, // CONFLICT
            },
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Config(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            SessionError::SessionNotFound(_) => "Session not found".to_string(),
            SessionError::CapacityExceeded => {
                "Server is at capacity, please try again".to_string()
            }
            SessionError::Draining => "Server is shutting down, please reconnect".to_string(),
            // Engine errors are written for end users already.
            SessionError::Engine(e) => e.to_string(),
            SessionError::Conflict(msg) | SessionError::PermissionDenied(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        // Internal errors -> 6
        assert_eq!(SessionError::Internal("boom".to_string()).error_code(), 6);
        assert_eq!(SessionError::Config("bad".to_string()).error_code(), 6);

        // Forbidden -> 3
        assert_eq!(
            SessionError::PermissionDenied("not host".to_string()).error_code(),
            3
        );

        // Not found -> 4
        assert_eq!(
            SessionError::SessionNotFound("class-1".to_string()).error_code(),
            4
        );
        assert_eq!(SessionError::from(EngineError::PollNotFound).error_code(), 4);

        // Conflict -> 5
        assert_eq!(SessionError::from(EngineError::AlreadyVoted).error_code(), 5);
        assert_eq!(SessionError::from(EngineError::SessionLocked).error_code(), 5);
        assert_eq!(
            SessionError::Conflict("already joined".to_string()).error_code(),
            5
        );

        // Capacity -> 7
        assert_eq!(SessionError::CapacityExceeded.error_code(), 7);
        assert_eq!(SessionError::Draining.error_code(), 7);

        // Device -> 8
        assert_eq!(
            SessionError::from(EngineError::CaptureUnavailable("busy".to_string())).error_code(),
            8
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = SessionError::Internal("mailbox closed at 10.0.0.7".to_string());
        assert!(!err.client_message().contains("10.0.0.7"));
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_engine_errors_pass_through() {
        let err = SessionError::from(EngineError::AlreadyQueued);
        assert_eq!(err.client_message(), "Participant already has a raised hand");
    }
}
