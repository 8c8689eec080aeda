//! `SessionActor` - per-class actor that owns all session state.
//!
//! Each `SessionActor`:
//! - Owns the participant roster and all five collaboration engines
//! - Serializes every mutation through its mailbox (the authority of the
//!   authoritative-host model)
//! - Broadcasts sequence-numbered state deltas to observers
//! - Enforces host-only authorization at the message boundary
//! - Runs the server-side breakout countdown and ends rooms when it expires
//! - Performs cross-engine cleanup when a participant leaves: one dispatch
//!   removes them from the roster, the room engine and the hand-raise queue.
//!   Cast votes are final and are not retracted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use collab_engines::drawing::{DrawAction, DrawingEngine, SurfaceId};
use collab_engines::model::{Participant, Role};
use collab_engines::polls::{Poll, PollEngine};
use collab_engines::queue::{QueueEngine, ReorderDirection};
use collab_engines::recording::{RecordingPipeline, SegmentDescriptor};
use collab_engines::rooms::RoomEngine;
use collab_engines::EngineError;

use super::messages::{JoinResult, SequencedEvent, SessionEvent, SessionMessage, SessionState};
use super::metrics::{ActorMetrics, ActorType, ControllerMetrics, MailboxMonitor};
use crate::errors::SessionError;
use crate::media::MediaSourceProvider;

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 500;

/// Limits and wiring a session actor is spawned with.
#[derive(Clone)]
pub struct SessionLimits {
    /// Maximum participants in this session.
    pub max_participants: u32,
    /// Buffer size for the event broadcast channel.
    pub event_channel_buffer: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_participants: crate::config::DEFAULT_MAX_PARTICIPANTS_PER_SESSION,
            event_channel_buffer: crate::config::DEFAULT_EVENT_CHANNEL_BUFFER,
        }
    }
}

/// Handle to a `SessionActor`.
#[derive(Clone)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    events: broadcast::Sender<SequencedEvent>,
    cancel_token: CancellationToken,
    session_id: String,
}

impl std::fmt::Debug for SessionActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionActorHandle")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl SessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Subscribe to the session's sequence-numbered event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.events.subscribe()
    }

    /// Cancel the session actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Join the session.
    pub async fn join(
        &self,
        participant_id: String,
        display_name: String,
        is_host: bool,
    ) -> Result<JoinResult, SessionError> {
        self.request(|tx| SessionMessage::Join {
            participant_id,
            display_name,
            is_host,
            respond_to: tx,
        })
        .await?
    }

    /// Leave the session (explicit leave; triggers cross-engine cleanup).
    pub async fn leave(&self, participant_id: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::Leave {
            participant_id,
            respond_to: tx,
        })
        .await?
    }

    /// Get the full current session state.
    pub async fn get_state(&self) -> Result<SessionState, SessionError> {
        self.request(|tx| SessionMessage::GetState { respond_to: tx })
            .await
    }

    pub async fn room_create(
        &self,
        name: String,
        requested_by: String,
    ) -> Result<String, SessionError> {
        self.request(|tx| SessionMessage::RoomCreate {
            name,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn room_delete(
        &self,
        room_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RoomDelete {
            room_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn room_assign(
        &self,
        participant_id: String,
        room_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RoomAssign {
            participant_id,
            room_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn room_unassign(
        &self,
        participant_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RoomUnassign {
            participant_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn room_auto_assign(&self, requested_by: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RoomAutoAssign {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn room_start(
        &self,
        duration_minutes: u32,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RoomStart {
            duration_minutes,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn room_end_all(&self, requested_by: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RoomEndAll {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn queue_raise(
        &self,
        participant_id: String,
        question: Option<String>,
    ) -> Result<String, SessionError> {
        self.request(|tx| SessionMessage::QueueRaise {
            participant_id,
            question,
            respond_to: tx,
        })
        .await?
    }

    pub async fn queue_lower(&self, participant_id: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::QueueLower {
            participant_id,
            respond_to: tx,
        })
        .await?
    }

    pub async fn queue_acknowledge(
        &self,
        entry_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::QueueAcknowledge {
            entry_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn queue_answer(
        &self,
        entry_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::QueueAnswer {
            entry_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn queue_remove(
        &self,
        entry_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::QueueRemove {
            entry_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn queue_reorder(
        &self,
        index: usize,
        direction: ReorderDirection,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::QueueReorder {
            index,
            direction,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn queue_clear_answered(&self, requested_by: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::QueueClearAnswered {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn poll_create(
        &self,
        question: String,
        options: Vec<String>,
        requested_by: String,
    ) -> Result<String, SessionError> {
        self.request(|tx| SessionMessage::PollCreate {
            question,
            options,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn poll_launch(
        &self,
        poll_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::PollLaunch {
            poll_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn poll_close(
        &self,
        poll_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::PollClose {
            poll_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn poll_delete(
        &self,
        poll_id: String,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::PollDelete {
            poll_id,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn poll_vote(
        &self,
        poll_id: String,
        participant_id: String,
        option_id: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::PollVote {
            poll_id,
            participant_id,
            option_id,
            respond_to: tx,
        })
        .await?
    }

    pub async fn draw_append(
        &self,
        surface: SurfaceId,
        action: DrawAction,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::DrawAppend {
            surface,
            action,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    /// Undo the latest action. Returns whether anything was undone.
    pub async fn draw_undo(
        &self,
        surface: SurfaceId,
        requested_by: String,
    ) -> Result<bool, SessionError> {
        self.request(|tx| SessionMessage::DrawUndo {
            surface,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    /// Redo the latest undone action. Returns whether anything was restored.
    pub async fn draw_redo(
        &self,
        surface: SurfaceId,
        requested_by: String,
    ) -> Result<bool, SessionError> {
        self.request(|tx| SessionMessage::DrawRedo {
            surface,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn draw_clear(
        &self,
        surface: SurfaceId,
        requested_by: String,
    ) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::DrawClear {
            surface,
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    /// Leave annotation mode; the overlay is wiped.
    pub async fn annotation_exit(&self, requested_by: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::AnnotationExit {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn recording_start(&self, requested_by: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RecordingStart {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn recording_pause(&self, requested_by: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RecordingPause {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn recording_resume(&self, requested_by: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::RecordingResume {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    pub async fn recording_stop(
        &self,
        requested_by: String,
    ) -> Result<SegmentDescriptor, SessionError> {
        self.request(|tx| SessionMessage::RecordingStop {
            requested_by,
            respond_to: tx,
        })
        .await?
    }

    /// Feed a media chunk from the capture transport. Fire-and-forget.
    pub async fn recording_chunk(&self, data: Bytes) -> Result<(), SessionError> {
        self.sender
            .send(SessionMessage::RecordingChunk { data })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))
    }

    pub async fn list_segments(&self) -> Result<Vec<SegmentDescriptor>, SessionError> {
        self.request(|tx| SessionMessage::ListSegments { respond_to: tx })
            .await
    }

    /// End the session for everyone.
    pub async fn end_session(&self, reason: String) -> Result<(), SessionError> {
        self.request(|tx| SessionMessage::EndSession {
            reason,
            respond_to: tx,
        })
        .await?
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    session_id: String,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<SequencedEvent>,
    /// Sequence number of the last broadcast delta.
    seq: u64,
    /// Roster by participant id.
    participants: HashMap<String, Participant>,
    drawing: DrawingEngine,
    rooms: RoomEngine,
    queue: QueueEngine,
    polls: PollEngine,
    recording: RecordingPipeline,
    /// Server-enforced breakout end, armed by `RoomStart`.
    breakout_deadline: Option<Instant>,
    rng: StdRng,
    media_provider: Arc<dyn MediaSourceProvider>,
    limits: SessionLimits,
    is_shutting_down: bool,
    metrics: Arc<ActorMetrics>,
    controller_metrics: Arc<ControllerMetrics>,
    mailbox: MailboxMonitor,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        session_id: String,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
        controller_metrics: Arc<ControllerMetrics>,
        media_provider: Arc<dyn MediaSourceProvider>,
        limits: SessionLimits,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(limits.event_channel_buffer);

        let actor = Self {
            session_id: session_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            events: events.clone(),
            seq: 0,
            participants: HashMap::new(),
            drawing: DrawingEngine::new(),
            rooms: RoomEngine::new(),
            queue: QueueEngine::new(),
            polls: PollEngine::new(),
            recording: RecordingPipeline::new(),
            breakout_deadline: None,
            rng: StdRng::from_entropy(),
            media_provider,
            limits,
            is_shutting_down: false,
            metrics,
            controller_metrics,
            mailbox: MailboxMonitor::new(ActorType::Session, &session_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            events,
            cancel_token,
            session_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "lc.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "lc.actor.session",
            session_id = %self.session_id,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "lc.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                // Server-enforced breakout countdown.
                () = maybe_sleep_until(self.breakout_deadline) => {
                    self.handle_breakout_expired();
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "lc.actor.session",
                                session_id = %self.session_id,
                                "SessionActor channel closed, exiting"
                            );
                            self.graceful_shutdown();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "lc.actor.session",
            session_id = %self.session_id,
            participants = self.participants.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    /// Broadcast a delta with the next sequence number.
    fn publish(&mut self, event: SessionEvent) {
        self.seq += 1;
        // A send error only means there are no subscribers right now.
        let _ = self.events.send(SequencedEvent {
            seq: self.seq,
            event,
        });
    }

    fn ensure_host(&self, participant_id: &str) -> Result<(), SessionError> {
        match self.participants.get(participant_id) {
            Some(p) if p.role.is_host() => Ok(()),
            Some(_) => Err(SessionError::PermissionDenied(
                "Only the host can perform this action".to_string(),
            )),
            None => Err(EngineError::ParticipantNotFound.into()),
        }
    }

    fn ensure_member(&self, participant_id: &str) -> Result<(), SessionError> {
        if self.participants.contains_key(participant_id) {
            Ok(())
        } else {
            Err(EngineError::ParticipantNotFound.into())
        }
    }

    fn rooms_changed_event(&self) -> SessionEvent {
        SessionEvent::RoomsChanged {
            rooms: self.rooms.rooms().to_vec(),
            unassigned: self.rooms.unassigned().to_vec(),
        }
    }

    fn queue_changed_event(&self) -> SessionEvent {
        SessionEvent::QueueChanged {
            entries: self.queue.entries().to_vec(),
        }
    }

    fn polls_changed_event(&self) -> SessionEvent {
        SessionEvent::PollsChanged {
            polls: self.polls.polls().into_iter().cloned().collect::<Vec<Poll>>(),
        }
    }

    fn snapshot(&self) -> SessionState {
        SessionState {
            session_id: self.session_id.clone(),
            seq: self.seq,
            participants: self.participants.values().cloned().collect(),
            rooms: self.rooms.rooms().to_vec(),
            unassigned: self.rooms.unassigned().to_vec(),
            queue: self.queue.entries().to_vec(),
            polls: self.polls.polls().into_iter().cloned().collect(),
            whiteboard: self.drawing.render(SurfaceId::Whiteboard).to_vec(),
            annotation: self.drawing.render(SurfaceId::Annotation).to_vec(),
            recording_state: self.recording.state(),
            segments: self
                .recording
                .list_segments()
                .iter()
                .map(collab_engines::recording::RecordingSegment::descriptor)
                .collect(),
            is_shutting_down: self.is_shutting_down,
        }
    }

    /// Handle a single message.
    #[allow(clippy::too_many_lines)] // one arm per operation in the message surface
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                participant_id,
                display_name,
                is_host,
                respond_to,
            } => {
                let result = self.handle_join(participant_id, display_name, is_host);
                let _ = respond_to.send(result);
            }
            SessionMessage::Leave {
                participant_id,
                respond_to,
            } => {
                let result = self.handle_leave(&participant_id);
                let _ = respond_to.send(result);
            }
            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }

            SessionMessage::RoomCreate {
                name,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    let room_id = self.rooms.create_room(name)?;
                    let event = self.rooms_changed_event();
                    self.publish(event);
                    Ok(room_id)
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RoomDelete {
                room_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.rooms.delete_room(&room_id)?;
                    let event = self.rooms_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RoomAssign {
                participant_id,
                room_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.rooms.assign(&participant_id, &room_id)?;
                    let event = self.rooms_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RoomUnassign {
                participant_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.rooms.unassign(&participant_id)?;
                    let event = self.rooms_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RoomAutoAssign {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.rooms.auto_assign(&mut self.rng)?;
                    let event = self.rooms_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RoomStart {
                duration_minutes,
                requested_by,
                respond_to,
            } => {
                let result = self.handle_room_start(duration_minutes, &requested_by);
                let _ = respond_to.send(result);
            }
            SessionMessage::RoomEndAll {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    self.end_breakout();
                });
                let _ = respond_to.send(result);
            }

            SessionMessage::QueueRaise {
                participant_id,
                question,
                respond_to,
            } => {
                let result = self.ensure_member(&participant_id).and_then(|()| {
                    let entry_id = self
                        .queue
                        .raise_hand(&participant_id, question, Utc::now())?;
                    let event = self.queue_changed_event();
                    self.publish(event);
                    Ok(entry_id)
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::QueueLower {
                participant_id,
                respond_to,
            } => {
                let result = self.ensure_member(&participant_id).and_then(|()| {
                    self.queue.lower_hand(&participant_id)?;
                    let event = self.queue_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::QueueAcknowledge {
                entry_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.queue.acknowledge(&entry_id)?;
                    let event = self.queue_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::QueueAnswer {
                entry_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.queue.mark_answered(&entry_id)?;
                    let event = self.queue_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::QueueRemove {
                entry_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.queue.remove(&entry_id)?;
                    let event = self.queue_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::QueueReorder {
                index,
                direction,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    self.queue.reorder(index, direction);
                    let event = self.queue_changed_event();
                    self.publish(event);
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::QueueClearAnswered {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    self.queue.clear_answered();
                    let event = self.queue_changed_event();
                    self.publish(event);
                });
                let _ = respond_to.send(result);
            }

            SessionMessage::PollCreate {
                question,
                options,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    let poll_id = self.polls.create_poll(question, options)?;
                    let event = self.polls_changed_event();
                    self.publish(event);
                    Ok(poll_id)
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::PollLaunch {
                poll_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.polls.launch(&poll_id)?;
                    let event = self.polls_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::PollClose {
                poll_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.polls.close(&poll_id)?;
                    let event = self.polls_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::PollDelete {
                poll_id,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    self.polls.delete(&poll_id)?;
                    let event = self.polls_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::PollVote {
                poll_id,
                participant_id,
                option_id,
                respond_to,
            } => {
                let result = self.ensure_member(&participant_id).and_then(|()| {
                    self.polls.vote(&poll_id, &participant_id, &option_id)?;
                    let event = self.polls_changed_event();
                    self.publish(event);
                    Ok(())
                });
                let _ = respond_to.send(result);
            }

            SessionMessage::DrawAppend {
                surface,
                action,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    self.drawing.append(surface, action.clone());
                    self.publish(SessionEvent::DrawAppended { surface, action });
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::DrawUndo {
                surface,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    let undone = self.drawing.undo(surface);
                    if undone {
                        self.publish(SessionEvent::DrawUndone { surface });
                    }
                    undone
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::DrawRedo {
                surface,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    let redone = self.drawing.redo(surface);
                    if redone {
                        self.publish(SessionEvent::DrawRedone { surface });
                    }
                    redone
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::DrawClear {
                surface,
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    self.drawing.clear(surface);
                    self.publish(SessionEvent::DrawCleared { surface });
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::AnnotationExit {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    self.drawing.exit_annotation();
                    self.publish(SessionEvent::DrawCleared {
                        surface: SurfaceId::Annotation,
                    });
                });
                let _ = respond_to.send(result);
            }

            SessionMessage::RecordingStart {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    let source = self.media_provider.create_source();
                    self.recording
                        .start(source, Instant::now().into_std())?;
                    let state = self.recording.state();
                    self.publish(SessionEvent::RecordingStateChanged { state });
                    Ok(())
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RecordingPause {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    let before = self.recording.state();
                    self.recording.pause(Instant::now().into_std());
                    let state = self.recording.state();
                    if state != before {
                        self.publish(SessionEvent::RecordingStateChanged { state });
                    }
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RecordingResume {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).map(|()| {
                    let before = self.recording.state();
                    self.recording.resume(Instant::now().into_std());
                    let state = self.recording.state();
                    if state != before {
                        self.publish(SessionEvent::RecordingStateChanged { state });
                    }
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RecordingStop {
                requested_by,
                respond_to,
            } => {
                let result = self.ensure_host(&requested_by).and_then(|()| {
                    let segment = self.recording.stop(Instant::now().into_std())?;
                    let descriptor = segment.descriptor();
                    self.publish(SessionEvent::SegmentFinalized {
                        descriptor: descriptor.clone(),
                    });
                    let state = self.recording.state();
                    self.publish(SessionEvent::RecordingStateChanged { state });
                    Ok(descriptor)
                });
                let _ = respond_to.send(result);
            }
            SessionMessage::RecordingChunk { data } => {
                self.recording.push_chunk(data);
            }
            SessionMessage::ListSegments { respond_to } => {
                let segments = self
                    .recording
                    .list_segments()
                    .iter()
                    .map(collab_engines::recording::RecordingSegment::descriptor)
                    .collect();
                let _ = respond_to.send(segments);
            }

            SessionMessage::EndSession { reason, respond_to } => {
                let result = self.handle_end_session(&reason);
                let _ = respond_to.send(result);
            }
        }
    }

    /// Handle a participant joining.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_join(
        &mut self,
        participant_id: String,
        display_name: String,
        is_host: bool,
    ) -> Result<JoinResult, SessionError> {
        if self.is_shutting_down {
            return Err(SessionError::Draining);
        }
        if self.participants.contains_key(&participant_id) {
            return Err(SessionError::Conflict(
                "Participant already in session".to_string(),
            ));
        }
        if self.participants.len() >= self.limits.max_participants as usize {
            return Err(SessionError::CapacityExceeded);
        }

        let role = if is_host { Role::Host } else { Role::Attendee };
        let participant = Participant::new(participant_id.clone(), display_name, role);

        self.participants
            .insert(participant_id.clone(), participant.clone());
        self.rooms.participant_joined(&participant_id);
        self.controller_metrics.increment_participants();

        self.publish(SessionEvent::ParticipantJoined {
            participant: participant.clone(),
        });

        info!(
            target: "lc.actor.session",
            total_participants = self.participants.len(),
            "Participant joined"
        );

        Ok(JoinResult {
            participant,
            snapshot: self.snapshot(),
        })
    }

    /// Handle a participant leaving: one dispatch cleans every engine.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_leave(&mut self, participant_id: &str) -> Result<(), SessionError> {
        if self.participants.remove(participant_id).is_none() {
            return Err(EngineError::ParticipantNotFound.into());
        }

        let queue_len_before = self.queue.len();
        self.rooms.participant_left(participant_id);
        self.queue.participant_left(participant_id);
        // Cast votes are final and stay in the tallies.

        self.controller_metrics.decrement_participants();

        self.publish(SessionEvent::ParticipantLeft {
            participant_id: participant_id.to_string(),
        });
        let rooms_event = self.rooms_changed_event();
        self.publish(rooms_event);
        if self.queue.len() != queue_len_before {
            let queue_event = self.queue_changed_event();
            self.publish(queue_event);
        }

        info!(
            target: "lc.actor.session",
            remaining_participants = self.participants.len(),
            "Participant left"
        );
        Ok(())
    }

    fn handle_room_start(
        &mut self,
        duration_minutes: u32,
        requested_by: &str,
    ) -> Result<(), SessionError> {
        self.ensure_host(requested_by)?;
        self.rooms.start(duration_minutes)?;

        if self.rooms.locked() {
            self.breakout_deadline =
                Some(Instant::now() + Duration::from_secs(u64::from(duration_minutes) * 60));
            self.publish(SessionEvent::BreakoutStarted { duration_minutes });
            let event = self.rooms_changed_event();
            self.publish(event);
        }
        Ok(())
    }

    /// Destroy all rooms and return everyone to the main session.
    fn end_breakout(&mut self) {
        self.breakout_deadline = None;
        self.rooms.end_all();
        self.publish(SessionEvent::BreakoutEnded);
        let event = self.rooms_changed_event();
        self.publish(event);
    }

    fn handle_breakout_expired(&mut self) {
        info!(
            target: "lc.actor.session",
            session_id = %self.session_id,
            "Breakout duration expired, ending all rooms"
        );
        self.end_breakout();
    }

    fn handle_end_session(&mut self, reason: &str) -> Result<(), SessionError> {
        info!(
            target: "lc.actor.session",
            session_id = %self.session_id,
            reason = %reason,
            participants = self.participants.len(),
            "Ending session"
        );

        self.is_shutting_down = true;
        self.publish(SessionEvent::SessionEnded {
            reason: reason.to_string(),
        });

        // Release the capture device before the actor goes away.
        self.recording.shutdown();
        self.cancel_token.cancel();
        Ok(())
    }

    /// Perform graceful shutdown.
    fn graceful_shutdown(&mut self) {
        self.is_shutting_down = true;
        self.recording.shutdown();

        for _ in self.participants.drain() {
            self.controller_metrics.decrement_participants();
        }

        debug!(
            target: "lc.actor.session",
            session_id = %self.session_id,
            "Graceful shutdown complete"
        );
    }
}

/// Sleep until the deadline, or forever when none is armed.
async fn maybe_sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::media::NullCaptureProvider;
    use collab_engines::drawing::Shape;
    use collab_engines::model::{Color, Point};
    use collab_engines::recording::{MediaSource, PipelineState};
    use std::num::NonZeroU32;

    /// Provider whose sources always acquire successfully.
    struct FakeProvider;

    struct FakeSource;

    impl MediaSource for FakeSource {
        fn open(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn close(&mut self) {}
        fn content_type(&self) -> &str {
            "video/webm"
        }
        fn file_extension(&self) -> &str {
            "webm"
        }
    }

    impl MediaSourceProvider for FakeProvider {
        fn create_source(&self) -> Box<dyn MediaSource> {
            Box::new(FakeSource)
        }
    }

    fn spawn_session(provider: Arc<dyn MediaSourceProvider>) -> SessionActorHandle {
        let (handle, _task) = SessionActor::spawn(
            "class-1".to_string(),
            CancellationToken::new(),
            ActorMetrics::new(),
            ControllerMetrics::new(),
            provider,
            SessionLimits::default(),
        );
        handle
    }

    async fn join_host_and_students(handle: &SessionActorHandle, students: usize) {
        handle
            .join("host".to_string(), "Ada Lovelace".to_string(), true)
            .await
            .unwrap();
        for i in 0..students {
            handle
                .join(format!("s{i}"), format!("Student {i}"), false)
                .await
                .unwrap();
        }
    }

    fn pen_action() -> DrawAction {
        DrawAction::new(
            Color::new(0, 0, 0),
            NonZeroU32::new(2).unwrap(),
            Shape::Path {
                points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            },
        )
    }

    #[tokio::test]
    async fn test_join_and_duplicate_join() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));

        let result = handle
            .join("part-1".to_string(), "Grace Hopper".to_string(), false)
            .await
            .unwrap();
        assert_eq!(result.participant.initials, "GH");
        assert_eq!(result.snapshot.participants.len(), 1);

        let dup = handle
            .join("part-1".to_string(), "Grace Hopper".to_string(), false)
            .await;
        assert!(matches!(dup, Err(SessionError::Conflict(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let (handle, _task) = SessionActor::spawn(
            "class-cap".to_string(),
            CancellationToken::new(),
            ActorMetrics::new(),
            ControllerMetrics::new(),
            Arc::new(NullCaptureProvider),
            SessionLimits {
                max_participants: 2,
                event_channel_buffer: 16,
            },
        );

        join_host_and_students(&handle, 1).await;
        let result = handle
            .join("s-extra".to_string(), "One Too Many".to_string(), false)
            .await;
        assert!(matches!(result, Err(SessionError::CapacityExceeded)));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_host_only_operations_denied_for_attendee() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 1).await;

        let err = handle
            .room_create("Group A".to_string(), "s0".to_string())
            .await;
        assert!(matches!(err, Err(SessionError::PermissionDenied(_))));

        let err = handle
            .draw_append(SurfaceId::Whiteboard, pen_action(), "s0".to_string())
            .await;
        assert!(matches!(err, Err(SessionError::PermissionDenied(_))));

        let err = handle
            .poll_create("q".to_string(), vec!["a".to_string(), "b".to_string()], "s0".to_string())
            .await;
        assert!(matches!(err, Err(SessionError::PermissionDenied(_))));

        let err = handle.recording_start("s0".to_string()).await;
        assert!(matches!(err, Err(SessionError::PermissionDenied(_))));

        // Unknown requester is NotFound, not PermissionDenied.
        let err = handle
            .room_create("Group A".to_string(), "ghost".to_string())
            .await;
        assert!(matches!(
            err,
            Err(SessionError::Engine(EngineError::ParticipantNotFound))
        ));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_room_flow_and_auto_assign() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 6).await;

        let host = "host".to_string();
        handle.room_create("A".to_string(), host.clone()).await.unwrap();
        handle.room_create("B".to_string(), host.clone()).await.unwrap();
        handle.room_create("C".to_string(), host.clone()).await.unwrap();

        handle.room_auto_assign(host.clone()).await.unwrap();

        // 7 participants over 3 rooms -> sizes {3,2,2}, pool empty.
        let state = handle.get_state().await.unwrap();
        let mut sizes: Vec<usize> = state.rooms.iter().map(|r| r.participant_ids.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 2, 3]);
        assert!(state.unassigned.is_empty());

        handle.room_start(15, host.clone()).await.unwrap();
        let err = handle.room_create("D".to_string(), host.clone()).await;
        assert!(matches!(
            err,
            Err(SessionError::Engine(EngineError::SessionLocked))
        ));

        handle.room_end_all(host).await.unwrap();
        let state = handle.get_state().await.unwrap();
        assert!(state.rooms.is_empty());
        assert_eq!(state.unassigned.len(), 7);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakout_auto_terminates_when_duration_expires() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 2).await;

        let host = "host".to_string();
        let room = handle.room_create("A".to_string(), host.clone()).await.unwrap();
        handle
            .room_assign("s0".to_string(), room, host.clone())
            .await
            .unwrap();
        handle.room_start(1, host.clone()).await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.rooms.len(), 1);

        // Just before the 1-minute deadline the rooms are still active.
        tokio::time::advance(Duration::from_secs(55)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.rooms.len(), 1);

        // Past the deadline the breakout ends on its own.
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = handle.get_state().await.unwrap();
        assert!(state.rooms.is_empty());
        assert_eq!(state.unassigned.len(), 3);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_leave_cleans_rooms_and_queue_but_not_votes() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 2).await;
        let host = "host".to_string();

        let room = handle.room_create("A".to_string(), host.clone()).await.unwrap();
        handle
            .room_assign("s0".to_string(), room, host.clone())
            .await
            .unwrap();
        handle
            .queue_raise("s0".to_string(), Some("why?".to_string()))
            .await
            .unwrap();

        let poll = handle
            .poll_create(
                "Ready?".to_string(),
                vec!["Yes".to_string(), "No".to_string()],
                host.clone(),
            )
            .await
            .unwrap();
        handle.poll_launch(poll.clone(), host.clone()).await.unwrap();
        let state = handle.get_state().await.unwrap();
        let option_id = state.polls[0].options[0].option_id.clone();
        handle
            .poll_vote(poll.clone(), "s0".to_string(), option_id)
            .await
            .unwrap();

        handle.leave("s0".to_string()).await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.participants.len(), 2);
        assert!(state.rooms[0].participant_ids.is_empty());
        assert!(state.queue.is_empty());
        // Votes are final: the tally still counts the departed participant.
        assert_eq!(state.polls[0].total_votes, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_queue_flow_self_service_and_moderation() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 2).await;
        let host = "host".to_string();

        let entry = handle.queue_raise("s0".to_string(), None).await.unwrap();
        handle.queue_raise("s1".to_string(), None).await.unwrap();

        // Double raise rejected.
        let err = handle.queue_raise("s0".to_string(), None).await;
        assert!(matches!(
            err,
            Err(SessionError::Engine(EngineError::AlreadyQueued))
        ));

        // Moderation requires the host.
        let err = handle
            .queue_acknowledge(entry.clone(), "s1".to_string())
            .await;
        assert!(matches!(err, Err(SessionError::PermissionDenied(_))));

        handle.queue_acknowledge(entry.clone(), host.clone()).await.unwrap();
        handle.queue_answer(entry, host.clone()).await.unwrap();
        handle.queue_clear_answered(host).await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.queue[0].participant_id, "s1");

        handle.cancel();
    }

    #[tokio::test]
    async fn test_drawing_flow_and_event_sequence() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        let mut events = handle.subscribe();
        join_host_and_students(&handle, 0).await;
        let host = "host".to_string();

        handle
            .draw_append(SurfaceId::Whiteboard, pen_action(), host.clone())
            .await
            .unwrap();
        assert!(handle.draw_undo(SurfaceId::Whiteboard, host.clone()).await.unwrap());
        assert!(handle.draw_redo(SurfaceId::Whiteboard, host.clone()).await.unwrap());
        // Nothing left to redo.
        assert!(!handle.draw_redo(SurfaceId::Whiteboard, host.clone()).await.unwrap());

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.whiteboard.len(), 1);

        // Deltas arrive with strictly consecutive sequence numbers.
        let mut last_seq = 0;
        for _ in 0..4 {
            let event = events.recv().await.unwrap();
            assert_eq!(event.seq, last_seq + 1);
            last_seq = event.seq;
        }

        handle.cancel();
    }

    #[tokio::test]
    async fn test_annotation_exit_wipes_overlay_only() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 0).await;
        let host = "host".to_string();

        handle
            .draw_append(SurfaceId::Whiteboard, pen_action(), host.clone())
            .await
            .unwrap();
        handle
            .draw_append(SurfaceId::Annotation, pen_action(), host.clone())
            .await
            .unwrap();
        handle.annotation_exit(host).await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert!(state.annotation.is_empty());
        assert_eq!(state.whiteboard.len(), 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_recording_unavailable_degrades_gracefully() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 0).await;
        let host = "host".to_string();

        let err = handle.recording_start(host.clone()).await;
        assert!(matches!(
            err,
            Err(SessionError::Engine(EngineError::CaptureUnavailable(_)))
        ));

        // The rest of the toolkit keeps working.
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.recording_state, PipelineState::Idle);
        handle.room_create("A".to_string(), host).await.unwrap();

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_full_cycle_with_paused_stretch() {
        let handle = spawn_session(Arc::new(FakeProvider));
        join_host_and_students(&handle, 0).await;
        let host = "host".to_string();

        handle.recording_start(host.clone()).await.unwrap();
        handle
            .recording_chunk(Bytes::from_static(b"chunk-1"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        handle.recording_pause(host.clone()).await.unwrap();

        // Paused time must not count toward the duration.
        tokio::time::advance(Duration::from_secs(120)).await;
        handle.recording_resume(host.clone()).await.unwrap();

        tokio::time::advance(Duration::from_secs(15)).await;
        let descriptor = handle.recording_stop(host.clone()).await.unwrap();

        assert!((descriptor.duration_seconds - 45.0).abs() < 0.5);
        assert!(descriptor.file_name.starts_with("class-recording-"));
        assert!(descriptor.file_name.ends_with(".webm"));
        assert_eq!(descriptor.size_bytes, 7);

        let segments = handle.list_segments().await.unwrap();
        assert_eq!(segments.len(), 1);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.recording_state, PipelineState::Idle);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_end_session_broadcasts_and_cancels() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        let mut events = handle.subscribe();
        join_host_and_students(&handle, 1).await;

        handle.end_session("class dismissed".to_string()).await.unwrap();
        assert!(handle.is_cancelled());

        // Drain up to the SessionEnded event.
        let mut saw_ended = false;
        while let Ok(event) = events.recv().await {
            if matches!(event.event, SessionEvent::SessionEnded { .. }) {
                saw_ended = true;
                break;
            }
        }
        assert!(saw_ended);
    }

    #[tokio::test]
    async fn test_join_after_shutdown_is_draining() {
        let handle = spawn_session(Arc::new(NullCaptureProvider));
        join_host_and_students(&handle, 0).await;
        handle.end_session("done".to_string()).await.unwrap();

        // The actor may already be gone; either Draining or a dead mailbox
        // is acceptable, but never a successful join.
        let result = handle
            .join("late".to_string(), "Late Comer".to_string(), false)
            .await;
        assert!(result.is_err());
    }
}
