//! Shared data model for the collaboration toolkit.
//!
//! Participants are owned by the session coordinator; engines reference them
//! by id only. All types derive serde so state snapshots and deltas are
//! wire-ready.

use serde::{Deserialize, Serialize};

/// Role of a participant within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The teacher running the class. Elevated authoring rights: drawing,
    /// room assignment, queue moderation, polls, recording.
    Host,
    /// A student attending the class.
    Attendee,
}

impl Role {
    /// Whether this role carries host privileges.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

/// A participant in a live-class session.
///
/// Created on join, removed on leave. Referenced by id from every engine;
/// never copied mutably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Participant id, unique within the session.
    pub participant_id: String,
    /// Display name shown to other participants.
    pub display_name: String,
    /// Initials for avatar rendering, derived from the display name.
    pub initials: String,
    /// Role within the session.
    pub role: Role,
}

impl Participant {
    /// Create a participant, deriving initials from the display name.
    #[must_use]
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        let display_name = display_name.into();
        let initials = derive_initials(&display_name);
        Self {
            participant_id: participant_id.into(),
            display_name,
            initials,
            role,
        }
    }
}

/// Derive up-to-two uppercase initials from a display name.
///
/// Takes the first character of the first and last whitespace-separated
/// words. A single-word name yields one initial; an empty name yields `"?"`.
#[must_use]
pub fn derive_initials(display_name: &str) -> String {
    let mut words = display_name.split_whitespace();
    let first = words.next().and_then(|w| w.chars().next());
    let last = words.last().and_then(|w| w.chars().next());

    match (first, last) {
        (Some(f), Some(l)) => format!("{}{}", f.to_uppercase(), l.to_uppercase()),
        (Some(f), None) => f.to_uppercase().to_string(),
        _ => "?".to_string(),
    }
}

/// A 2D point on a drawing surface, in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(&self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Default whiteboard background (white).
    pub const BACKGROUND: Color = Color::new(255, 255, 255);
}
