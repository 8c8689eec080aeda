//! Engine error types.
//!
//! All engine errors are recoverable at the session level: callers surface a
//! user-facing message and the engine state is left unchanged. None is fatal
//! to the session.

use thiserror::Error;

/// Error type shared by all collaboration engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Participant is already assigned to a different breakout room.
    #[error("Participant is already assigned to another room")]
    AlreadyAssigned,

    /// Participant already has a live hand-raise entry.
    #[error("Participant already has a raised hand")]
    AlreadyQueued,

    /// Participant has already voted on this poll.
    #[error("Participant has already voted on this poll")]
    AlreadyVoted,

    /// Poll was created with fewer than two non-empty options.
    #[error("A poll requires at least two non-empty options")]
    InsufficientOptions,

    /// Breakout membership is frozen while any room is active.
    #[error("Breakout rooms are in session, membership is locked")]
    SessionLocked,

    /// The underlying capture device could not be acquired.
    #[error("Capture device unavailable: {0}")]
    CaptureUnavailable(String),

    /// Unknown breakout room id.
    #[error("Room not found")]
    RoomNotFound,

    /// Unknown hand-raise entry id.
    #[error("Queue entry not found")]
    EntryNotFound,

    /// Unknown poll id.
    #[error("Poll not found")]
    PollNotFound,

    /// Unknown poll option id.
    #[error("Poll option not found")]
    OptionNotFound,

    /// Unknown participant id.
    #[error("Participant not found")]
    ParticipantNotFound,

    /// Operation is not legal in the current state (e.g. launching a poll
    /// that is not a draft, or acknowledging an entry that is not waiting).
    #[error("Conflict: {0}")]
    Conflict(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", EngineError::AlreadyQueued),
            "Participant already has a raised hand"
        );
        assert_eq!(
            format!("{}", EngineError::CaptureUnavailable("no camera".to_string())),
            "Capture device unavailable: no camera"
        );
        assert_eq!(
            format!("{}", EngineError::Conflict("poll is closed".to_string())),
            "Conflict: poll is closed"
        );
    }
}
