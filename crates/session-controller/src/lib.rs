//! Live-Class Session Controller Library
//!
//! This library provides the authoritative state service for the live-class
//! collaboration toolkit: the shared whiteboard/annotation surfaces, breakout
//! rooms, hand-raise queue, live polls and session recording defined in the
//! `collab-engines` crate.
//!
//! # Architecture
//!
//! The controller uses an actor model hierarchy:
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
//! - **Authoritative host**: exactly one `SessionActor` owns a session's
//!   state; every mutation is a message through its mailbox, so concurrent
//!   requests are serialized into one total order. Each broadcast delta
//!   carries a monotonically increasing sequence number.
//! - **Single-dispatch leave cleanup**: a participant leaving is handled in
//!   one place - the session actor removes them from the room engine and the
//!   hand-raise queue atomically with the roster update. Cast votes are
//!   final and are not retracted.
//! - **Host authorization at the boundary**: drawing, room management, queue
//!   moderation, polls and recording are host-only; raising and lowering
//!   one's own hand is self-service.
//! - **Scoped capture**: the recording device is released on stop, on session
//!   end and on drop.
//!
//! # Modules
//!
//! - [`actors`] - actor model implementation
//! - [`config`] - service configuration from environment
//! - [`errors`] - error types with wire error codes
//! - [`media`] - capture device acquisition seam
//! - [`observability`] - health endpoints and actor metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod media;
pub mod observability;
