//! Live-class collaboration engines.
//!
//! Five independent, synchronous state machines that together make up the
//! in-class collaboration toolkit:
//!
//! - [`drawing`] - append-only action log for the shared whiteboard and the
//!   screen-share annotation overlay
//! - [`rooms`] - breakout room lifecycle and membership
//! - [`queue`] - ordered hand-raise queue with per-entry states
//! - [`polls`] - live polls with one-vote-per-participant tallies
//! - [`recording`] - media capture pipeline producing timed segments
//!
//! Each engine is scoped to one session and owns only its own state; the
//! participant roster lives with the session coordinator (see the
//! `session-controller` crate), which serializes all mutations and fans the
//! resulting deltas out to observers. Engines are deliberately free of any
//! async runtime so their invariants can be tested directly.
//!
//! # Error Handling
//!
//! Every operation returns `Result<_, EngineError>`. All errors are
//! recoverable: a failed operation leaves engine state untouched.

pub mod drawing;
pub mod error;
pub mod model;
pub mod polls;
pub mod queue;
pub mod recording;
pub mod rooms;

pub use error::EngineError;
