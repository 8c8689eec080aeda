//! `ClassControllerActor` - singleton supervisor for session actors.
//!
//! The `ClassControllerActor` is the top-level actor in the hierarchy:
//!
//! - Singleton per controller instance
//! - Supervises N `SessionActor` instances
//! - Handles session creation/removal and capacity limits
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the controller:
//! 1. Sets `accepting_new = false`
//! 2. Cancels the root `CancellationToken` (propagates to all sessions)
//! 3. Waits for session tasks to complete

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::messages::{ControllerMessage, ControllerStatus};
use super::metrics::{ActorMetrics, ActorType, ControllerMetrics, MailboxMonitor};
use super::session::{SessionActor, SessionActorHandle, SessionLimits};
use crate::errors::SessionError;
use crate::media::MediaSourceProvider;

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `ClassControllerActor`.
///
/// This is the public interface for interacting with the controller.
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct ClassControllerActorHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
}

impl ClassControllerActorHandle {
    /// Create a new `ClassControllerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(
        instance_id: String,
        metrics: Arc<ActorMetrics>,
        controller_metrics: Arc<ControllerMetrics>,
        media_provider: Arc<dyn MediaSourceProvider>,
        max_sessions: u32,
        session_limits: SessionLimits,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = ClassControllerActor::new(
            instance_id,
            receiver,
            cancel_token.clone(),
            metrics,
            controller_metrics,
            media_provider,
            max_sessions,
            session_limits,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Create a new session for a live class.
    ///
    /// Returns a handle to the new session actor.
    pub async fn create_session(
        &self,
        session_id: String,
    ) -> Result<SessionActorHandle, SessionError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::CreateSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get a handle to an existing session.
    pub async fn get_session(
        &self,
        session_id: String,
    ) -> Result<SessionActorHandle, SessionError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a session (called when the class ends or empties).
    pub async fn remove_session(&self, session_id: String) -> Result<(), SessionError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::RemoveSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current controller status.
    pub async fn get_status(&self) -> Result<ControllerStatus, SessionError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the controller.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed session.
struct ManagedSession {
    /// Handle to the session actor.
    handle: SessionActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
}

/// The `ClassControllerActor` implementation.
///
/// This struct owns the actor state and runs the message loop.
pub struct ClassControllerActor {
    /// Controller instance ID.
    instance_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Managed sessions by ID.
    sessions: HashMap<String, ManagedSession>,
    /// Whether the controller is accepting new sessions.
    accepting_new: bool,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Controller-level gauges.
    controller_metrics: Arc<ControllerMetrics>,
    /// Capture source provider handed to each session.
    media_provider: Arc<dyn MediaSourceProvider>,
    /// Maximum concurrent sessions.
    max_sessions: u32,
    /// Limits applied to each spawned session.
    session_limits: SessionLimits,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl ClassControllerActor {
    #[allow(clippy::too_many_arguments)]
    fn new(
        instance_id: String,
        receiver: mpsc::Receiver<ControllerMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
        controller_metrics: Arc<ControllerMetrics>,
        media_provider: Arc<dyn MediaSourceProvider>,
        max_sessions: u32,
        session_limits: SessionLimits,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Controller, &instance_id);

        Self {
            instance_id,
            receiver,
            cancel_token,
            sessions: HashMap::new(),
            accepting_new: true,
            metrics,
            controller_metrics,
            media_provider,
            max_sessions,
            session_limits,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "lc.actor.controller", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "lc.actor.controller",
            instance_id = %self.instance_id,
            "ClassControllerActor started"
        );

        loop {
            // Reap terminated session actors
            self.check_session_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "lc.actor.controller",
                        instance_id = %self.instance_id,
                        "ClassControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
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
                                target: "lc.actor.controller",
                                instance_id = %self.instance_id,
                                "ClassControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "lc.actor.controller",
            instance_id = %self.instance_id,
            sessions_remaining = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "ClassControllerActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::CreateSession {
                session_id,
                respond_to,
            } => {
                let result = self.create_session(session_id);
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let result = self.get_session(&session_id);
                let _ = respond_to.send(result);
            }

            ControllerMessage::RemoveSession {
                session_id,
                respond_to,
            } => {
                let result = self.remove_session(&session_id);
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let status = self.get_status();
                let _ = respond_to.send(status);
            }

            ControllerMessage::Shutdown { respond_to } => {
                let result = self.initiate_shutdown();
                let _ = respond_to.send(result);
            }
        }
    }

    /// Create a new session actor.
    fn create_session(&mut self, session_id: String) -> Result<SessionActorHandle, SessionError> {
        if !self.accepting_new {
            return Err(SessionError::Draining);
        }
        if self.sessions.contains_key(&session_id) {
            return Err(SessionError::Conflict("Session already exists".to_string()));
        }
        if self.sessions.len() >= self.max_sessions as usize {
            return Err(SessionError::CapacityExceeded);
        }

        debug!(
            target: "lc.actor.controller",
            instance_id = %self.instance_id,
            session_id = %session_id,
            "Creating new session actor"
        );

        let session_token = self.cancel_token.child_token();
        let (handle, task_handle) = SessionActor::spawn(
            session_id.clone(),
            session_token,
            Arc::clone(&self.metrics),
            Arc::clone(&self.controller_metrics),
            Arc::clone(&self.media_provider),
            self.session_limits.clone(),
        );

        self.sessions.insert(
            session_id.clone(),
            ManagedSession {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.controller_metrics.increment_sessions();

        info!(
            target: "lc.actor.controller",
            instance_id = %self.instance_id,
            session_id = %session_id,
            total_sessions = self.sessions.len(),
            "Session actor created"
        );

        Ok(handle)
    }

    /// Get a handle to an existing session.
    fn get_session(&self, session_id: &str) -> Result<SessionActorHandle, SessionError> {
        self.sessions
            .get(session_id)
            .map(|managed| managed.handle.clone())
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    /// Remove a session.
    ///
    /// Initiates removal but does not block on the session actor task; the
    /// cleanup wait is spawned as a background task so the message loop keeps
    /// draining.
    fn remove_session(&mut self, session_id: &str) -> Result<(), SessionError> {
        match self.sessions.remove(session_id) {
            Some(managed) => {
                debug!(
                    target: "lc.actor.controller",
                    instance_id = %self.instance_id,
                    session_id = %session_id,
                    "Removing session actor"
                );

                managed.handle.cancel();

                let session_id_owned = session_id.to_string();
                let instance_id = self.instance_id.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
                        Ok(Ok(())) => {
                            debug!(
                                target: "lc.actor.controller",
                                instance_id = %instance_id,
                                session_id = %session_id_owned,
                                "Session actor task completed cleanly"
                            );
                        }
                        Ok(Err(e)) => {
                            warn!(
                                target: "lc.actor.controller",
                                instance_id = %instance_id,
                                session_id = %session_id_owned,
                                error = ?e,
                                "Session actor task panicked during removal"
                            );
                        }
                        Err(_) => {
                            warn!(
                                target: "lc.actor.controller",
                                instance_id = %instance_id,
                                session_id = %session_id_owned,
                                "Session actor task cleanup timed out"
                            );
                        }
                    }
                });

                self.controller_metrics.decrement_sessions();

                info!(
                    target: "lc.actor.controller",
                    instance_id = %self.instance_id,
                    session_id = %session_id,
                    total_sessions = self.sessions.len(),
                    "Session actor removed"
                );

                Ok(())
            }
            None => Err(SessionError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Get current controller status.
    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            session_count: self.sessions.len(),
            participant_count: self.controller_metrics.participant_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Initiate graceful shutdown.
    fn initiate_shutdown(&mut self) -> Result<(), SessionError> {
        info!(
            target: "lc.actor.controller",
            instance_id = %self.instance_id,
            session_count = self.sessions.len(),
            "Initiating graceful shutdown"
        );

        // Stop accepting new sessions
        self.accepting_new = false;

        // Cancel the root token (propagates to all sessions)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "lc.actor.controller",
            instance_id = %self.instance_id,
            session_count = self.sessions.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        // Cancel all session actors (already done via parent token, but be explicit)
        for (session_id, managed) in &self.sessions {
            debug!(
                target: "lc.actor.controller",
                instance_id = %self.instance_id,
                session_id = %session_id,
                "Cancelling session actor"
            );
            managed.handle.cancel();
        }

        // Wait for all session tasks to complete
        for (session_id, managed) in self.sessions.drain() {
            match tokio::time::timeout(Duration::from_secs(30), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "lc.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        "Session actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "lc.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        error = ?e,
                        "Session actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "lc.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        "Session actor shutdown timed out"
                    );
                }
            }
        }

        info!(
            target: "lc.actor.controller",
            instance_id = %self.instance_id,
            "Graceful shutdown complete"
        );
    }

    /// Check health of managed session actors.
    async fn check_session_health(&mut self) {
        let mut finished_sessions = Vec::new();

        for (session_id, managed) in &self.sessions {
            if managed.task_handle.is_finished() {
                finished_sessions.push(session_id.clone());
            }
        }

        for session_id in finished_sessions {
            if let Some(managed) = self.sessions.remove(&session_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        // Clean exit, the class ended naturally
                        info!(
                            target: "lc.actor.controller",
                            instance_id = %self.instance_id,
                            session_id = %session_id,
                            "Session actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "lc.actor.controller",
                                instance_id = %self.instance_id,
                                session_id = %session_id,
                                error = ?join_error,
                                "Session actor panicked"
                            );
                            self.metrics.record_panic(ActorType::Session);
                        }
                    }
                }

                self.controller_metrics.decrement_sessions();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::NullCaptureProvider;

    fn test_handle(instance_id: &str, max_sessions: u32) -> ClassControllerActorHandle {
        ClassControllerActorHandle::new(
            instance_id.to_string(),
            ActorMetrics::new(),
            ControllerMetrics::new(),
            Arc::new(NullCaptureProvider),
            max_sessions,
            SessionLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_controller_handle_create_session() {
        let handle = test_handle("lc-test-001", 10);

        let session = handle.create_session("class-123".to_string()).await;
        assert!(session.is_ok());

        let fetched = handle.get_session("class-123".to_string()).await.unwrap();
        assert_eq!(fetched.session_id(), "class-123");

        handle.cancel();
    }

    #[tokio::test]
    async fn test_controller_handle_duplicate_session() {
        let handle = test_handle("lc-test-002", 10);

        handle.create_session("class-456".to_string()).await.unwrap();
        let result = handle.create_session("class-456".to_string()).await;
        assert!(matches!(result, Err(SessionError::Conflict(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_controller_handle_get_nonexistent_session() {
        let handle = test_handle("lc-test-003", 10);

        let result = handle.get_session("nonexistent".to_string()).await;
        assert!(matches!(result, Err(SessionError::SessionNotFound(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_controller_handle_session_capacity() {
        let handle = test_handle("lc-test-004", 2);

        handle.create_session("c1".to_string()).await.unwrap();
        handle.create_session("c2".to_string()).await.unwrap();
        let result = handle.create_session("c3".to_string()).await;
        assert!(matches!(result, Err(SessionError::CapacityExceeded)));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_controller_handle_remove_session() {
        let handle = test_handle("lc-test-005", 10);

        handle.create_session("class-789".to_string()).await.unwrap();
        handle.remove_session("class-789".to_string()).await.unwrap();

        let result = handle.get_session("class-789".to_string()).await;
        assert!(matches!(result, Err(SessionError::SessionNotFound(_))));

        // Removing twice is NotFound.
        let result = handle.remove_session("class-789".to_string()).await;
        assert!(matches!(result, Err(SessionError::SessionNotFound(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_controller_handle_status() {
        let handle = test_handle("lc-test-006", 10);

        let status = handle.get_status().await.unwrap();
        assert_eq!(status.session_count, 0);
        assert!(!status.is_draining);

        handle.create_session("c1".to_string()).await.unwrap();
        handle.create_session("c2".to_string()).await.unwrap();

        let status = handle.get_status().await.unwrap();
        assert_eq!(status.session_count, 2);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_controller_handle_shutdown_stops_new_sessions() {
        let handle = test_handle("lc-test-007", 10);

        handle.create_session("class-shutdown".to_string()).await.unwrap();
        handle.shutdown().await.unwrap();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_session_usable_through_controller() {
        let handle = test_handle("lc-test-008", 10);

        let session = handle.create_session("class-1".to_string()).await.unwrap();
        session
            .join("host".to_string(), "Ada Lovelace".to_string(), true)
            .await
            .unwrap();

        let state = session.get_state().await.unwrap();
        assert_eq!(state.participants.len(), 1);

        handle.cancel();
    }
}
