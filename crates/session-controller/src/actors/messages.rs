//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Response patterns use `tokio::sync::oneshot` for
//! request-reply semantics. Observers receive [`SequencedEvent`] deltas over
//! a per-session `tokio::sync::broadcast` channel; the sequence number is
//! the session's total order over mutations.

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;

use collab_engines::drawing::{DrawAction, SurfaceId};
use collab_engines::model::Participant;
use collab_engines::polls::Poll;
use collab_engines::queue::{HandRaiseEntry, ReorderDirection};
use collab_engines::recording::{PipelineState, SegmentDescriptor};
use collab_engines::rooms::BreakoutRoom;

use crate::errors::SessionError;

/// Messages sent to `ClassControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Create a new session actor for the given session ID.
    CreateSession {
        session_id: String,
        /// Response channel for the session handle or error.
        respond_to: oneshot::Sender<Result<super::session::SessionActorHandle, SessionError>>,
    },

    /// Get a handle to an existing session actor.
    GetSession {
        session_id: String,
        respond_to: oneshot::Sender<Result<super::session::SessionActorHandle, SessionError>>,
    },

    /// Remove a session (called when the class ends or empties).
    RemoveSession {
        session_id: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Get current status of all sessions (for health checks).
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Initiate graceful shutdown.
    Shutdown {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Messages sent to `SessionActor`.
///
/// `requested_by` carries the acting participant's id for host-authorization
/// checks at the actor boundary.
#[derive(Debug)]
pub enum SessionMessage {
    /// A participant joins the session.
    Join {
        participant_id: String,
        display_name: String,
        is_host: bool,
        respond_to: oneshot::Sender<Result<JoinResult, SessionError>>,
    },

    /// A participant leaves; triggers cross-engine cleanup.
    Leave {
        participant_id: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Get the full current state (late joiners, debugging).
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },

    // -- Breakout rooms (host-only) --------------------------------------
    RoomCreate {
        name: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<String, SessionError>>,
    },
    RoomDelete {
        room_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RoomAssign {
        participant_id: String,
        room_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RoomUnassign {
        participant_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RoomAutoAssign {
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RoomStart {
        duration_minutes: u32,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RoomEndAll {
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    // -- Hand-raise queue (raise/lower self-service, rest host-only) -----
    QueueRaise {
        participant_id: String,
        question: Option<String>,
        respond_to: oneshot::Sender<Result<String, SessionError>>,
    },
    QueueLower {
        participant_id: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    QueueAcknowledge {
        entry_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    QueueAnswer {
        entry_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    QueueRemove {
        entry_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    QueueReorder {
        index: usize,
        direction: ReorderDirection,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    QueueClearAnswered {
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    // -- Polls (create/launch/close/delete host-only, vote self-service) --
    PollCreate {
        question: String,
        options: Vec<String>,
        requested_by: String,
        respond_to: oneshot::Sender<Result<String, SessionError>>,
    },
    PollLaunch {
        poll_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    PollClose {
        poll_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    PollDelete {
        poll_id: String,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    PollVote {
        poll_id: String,
        participant_id: String,
        option_id: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    // -- Drawing (host-only on both surfaces) ----------------------------
    DrawAppend {
        surface: SurfaceId,
        action: DrawAction,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    DrawUndo {
        surface: SurfaceId,
        requested_by: String,
        respond_to: oneshot::Sender<Result<bool, SessionError>>,
    },
    DrawRedo {
        surface: SurfaceId,
        requested_by: String,
        respond_to: oneshot::Sender<Result<bool, SessionError>>,
    },
    DrawClear {
        surface: SurfaceId,
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Leave annotation mode; the overlay is wiped.
    AnnotationExit {
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    // -- Recording (host-only) -------------------------------------------
    RecordingStart {
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RecordingPause {
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RecordingResume {
        requested_by: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    RecordingStop {
        requested_by: String,
        respond_to: oneshot::Sender<Result<SegmentDescriptor, SessionError>>,
    },
    /// A media chunk from the capture transport. Fire-and-forget.
    RecordingChunk { data: Bytes },
    ListSegments {
        respond_to: oneshot::Sender<Vec<SegmentDescriptor>>,
    },

    /// End the session (host or system).
    EndSession {
        reason: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Status of the `ClassControllerActor`.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    /// Total active sessions.
    pub session_count: usize,
    /// Total participants across all sessions.
    pub participant_count: usize,
    /// Whether the controller is draining.
    pub is_draining: bool,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinResult {
    /// The created participant (initials derived server-side).
    pub participant: Participant,
    /// Full state snapshot so late joiners converge immediately.
    pub snapshot: SessionState,
}

/// Full serializable snapshot of one session's state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: String,
    /// Sequence number of the last broadcast delta.
    pub seq: u64,
    pub participants: Vec<Participant>,
    pub rooms: Vec<BreakoutRoom>,
    pub unassigned: Vec<String>,
    pub queue: Vec<HandRaiseEntry>,
    pub polls: Vec<Poll>,
    pub whiteboard: Vec<DrawAction>,
    pub annotation: Vec<DrawAction>,
    pub recording_state: PipelineState,
    pub segments: Vec<SegmentDescriptor>,
    pub is_shutting_down: bool,
}

/// A state delta broadcast to session observers.
///
/// `seq` increases by exactly one per delta, per session; observers converge
/// to the same final state by applying deltas in `seq` order.
#[derive(Debug, Clone, Serialize)]
pub struct SequencedEvent {
    pub seq: u64,
    pub event: SessionEvent,
}

/// State deltas fanned out to all session observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    ParticipantJoined { participant: Participant },
    ParticipantLeft { participant_id: String },
    RoomsChanged {
        rooms: Vec<BreakoutRoom>,
        unassigned: Vec<String>,
    },
    BreakoutStarted { duration_minutes: u32 },
    BreakoutEnded,
    QueueChanged { entries: Vec<HandRaiseEntry> },
    PollsChanged { polls: Vec<Poll> },
    DrawAppended { surface: SurfaceId, action: DrawAction },
    DrawUndone { surface: SurfaceId },
    DrawRedone { surface: SurfaceId },
    DrawCleared { surface: SurfaceId },
    RecordingStateChanged { state: PipelineState },
    SegmentFinalized { descriptor: SegmentDescriptor },
    SessionEnded { reason: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sequenced_event_serializes_with_tag() {
        let event = SequencedEvent {
            seq: 7,
            event: SessionEvent::ParticipantLeft {
                participant_id: "part-1".to_string(),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"seq\":7"));
        assert!(json.contains("\"type\":\"participant_left\""));
    }

    #[test]
    fn test_controller_status_clone() {
        let status = ControllerStatus {
            session_count: 2,
            participant_count: 9,
            is_draining: false,
            mailbox_depth: 0,
        };
        let cloned = status.clone();
        assert_eq!(cloned.session_count, 2);
        assert!(!cloned.is_draining);
    }
}
