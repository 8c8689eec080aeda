//! Actor model implementation for the live-class session controller.
//!
//! ```text
//! ClassControllerActor (singleton per instance)
//! └── supervises N SessionActors
//!     └── SessionActor (one per live class)
//!         ├── owns the participant roster
//!         ├── owns all five collaboration engines
//!         └── broadcasts sequence-numbered deltas to observers
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per session**: every mutation flows through one mailbox, so
//!   concurrent requests are serialized into a single total order
//! - **CancellationToken propagation**: the controller passes child tokens to
//!   sessions for graceful shutdown
//! - **Mailbox monitoring**: depth thresholds with metrics (100/500)
//! - **Message passing**: all inter-actor communication via
//!   `tokio::sync::mpsc` channels; observers via `tokio::sync::broadcast`
//!
//! # Modules
//!
//! - [`controller`] - `ClassControllerActor` singleton that supervises sessions
//! - [`session`] - `SessionActor` per live class, owns session state
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod controller;
pub mod messages;
pub mod metrics;
pub mod session;

// Re-export primary types
pub use controller::{ClassControllerActor, ClassControllerActorHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ControllerMetrics, MailboxMonitor};
pub use session::{SessionActor, SessionActorHandle, SessionLimits};
