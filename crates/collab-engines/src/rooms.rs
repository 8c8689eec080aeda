//! Room assignment engine - breakout room lifecycle and membership.
//!
//! Invariants:
//!
//! - A participant belongs to at most one room at a time; the union of all
//!   rooms' membership sets is disjoint.
//! - Participants not assigned to a room live in the engine's unassigned
//!   pool (the main session).
//! - While any room is `active`, membership is frozen: create, delete,
//!   assign, unassign and auto-assign are rejected with `SessionLocked`.
//!   A participant leaving the session is the one exception - leave cleanup
//!   always removes them.
//!
//! Room state machine: `waiting -> active -> destroyed`. Only `waiting`
//! rooms are mutable for membership.

use std::collections::{BTreeSet, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;

/// Status of a breakout room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Created, membership mutable, not yet started.
    Waiting,
    /// In session; membership frozen.
    Active,
}

/// A breakout room: a temporary sub-group with isolated membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutRoom {
    /// Room id, unique within the session.
    pub room_id: String,
    /// Host-chosen display name.
    pub name: String,
    /// Member participant ids. Ordered set for stable snapshots.
    pub participant_ids: BTreeSet<String>,
    /// Current status.
    pub status: RoomStatus,
    /// Advisory countdown shown to clients, stamped by `start`.
    pub duration_minutes: Option<u32>,
}

/// Breakout room engine for one session.
#[derive(Debug, Default)]
pub struct RoomEngine {
    /// Rooms in creation order (round-robin distribution order).
    rooms: Vec<BreakoutRoom>,
    /// Participant id -> room id, for O(1) membership lookup and removal.
    assignment: HashMap<String, String>,
    /// Participants in the main session, in join order.
    unassigned: Vec<String>,
}

impl RoomEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether membership is frozen (any room active).
    #[must_use]
    pub fn locked(&self) -> bool {
        self.rooms.iter().any(|r| r.status == RoomStatus::Active)
    }

    /// All rooms in creation order.
    #[must_use]
    pub fn rooms(&self) -> &[BreakoutRoom] {
        &self.rooms
    }

    /// The unassigned pool, in join order.
    #[must_use]
    pub fn unassigned(&self) -> &[String] {
        &self.unassigned
    }

    /// The room a participant is currently assigned to, if any.
    #[must_use]
    pub fn room_of(&self, participant_id: &str) -> Option<&str> {
        self.assignment.get(participant_id).map(String::as_str)
    }

    fn is_known(&self, participant_id: &str) -> bool {
        self.assignment.contains_key(participant_id)
            || self.unassigned.iter().any(|p| p == participant_id)
    }

    fn room_mut(&mut self, room_id: &str) -> Result<&mut BreakoutRoom, EngineError> {
        self.rooms
            .iter_mut()
            .find(|r| r.room_id == room_id)
            .ok_or(EngineError::RoomNotFound)
    }

    /// Track a participant who joined the session. Idempotent.
    pub fn participant_joined(&mut self, participant_id: &str) {
        if !self.is_known(participant_id) {
            self.unassigned.push(participant_id.to_string());
        }
    }

    /// Remove a participant from every room and the pool.
    ///
    /// Called from session leave cleanup; deliberately bypasses the lock.
    pub fn participant_left(&mut self, participant_id: &str) {
        if let Some(room_id) = self.assignment.remove(participant_id) {
            if let Some(room) = self.rooms.iter_mut().find(|r| r.room_id == room_id) {
                room.participant_ids.remove(participant_id);
            }
        }
        self.unassigned.retain(|p| p != participant_id);
    }

    /// Create a new room in `waiting` state.
    pub fn create_room(&mut self, name: impl Into<String>) -> Result<String, EngineError> {
        if self.locked() {
            return Err(EngineError::SessionLocked);
        }

        let room_id = Uuid::new_v4().to_string();
        self.rooms.push(BreakoutRoom {
            room_id: room_id.clone(),
            name: name.into(),
            participant_ids: BTreeSet::new(),
            status: RoomStatus::Waiting,
            duration_minutes: None,
        });

        debug!(target: "lc.engine.rooms", room_id = %room_id, "Room created");
        Ok(room_id)
    }

    /// Delete a room, returning its members to the unassigned pool.
    pub fn delete_room(&mut self, room_id: &str) -> Result<(), EngineError> {
        if self.locked() {
            return Err(EngineError::SessionLocked);
        }

        let index = self
            .rooms
            .iter()
            .position(|r| r.room_id == room_id)
            .ok_or(EngineError::RoomNotFound)?;

        let room = self.rooms.remove(index);
        for participant_id in room.participant_ids {
            self.assignment.remove(&participant_id);
            self.unassigned.push(participant_id);
        }
        Ok(())
    }

    /// Assign a participant to a room.
    ///
    /// Fails with `AlreadyAssigned` if the participant is in a different room
    /// (the caller must `unassign` first). Idempotent when reassigning to the
    /// same room.
    pub fn assign(&mut self, participant_id: &str, room_id: &str) -> Result<(), EngineError> {
        if self.locked() {
            return Err(EngineError::SessionLocked);
        }
        if !self.is_known(participant_id) {
            return Err(EngineError::ParticipantNotFound);
        }

        match self.assignment.get(participant_id) {
            Some(current) if current == room_id => return Ok(()),
            Some(_) => return Err(EngineError::AlreadyAssigned),
            None => {}
        }

        let room = self.room_mut(room_id)?;
        room.participant_ids.insert(participant_id.to_string());
        self.assignment
            .insert(participant_id.to_string(), room_id.to_string());
        self.unassigned.retain(|p| p != participant_id);
        Ok(())
    }

    /// Return a participant to the unassigned pool.
    ///
    /// A no-op if the participant is known but not assigned.
    pub fn unassign(&mut self, participant_id: &str) -> Result<(), EngineError> {
        if self.locked() {
            return Err(EngineError::SessionLocked);
        }
        if !self.is_known(participant_id) {
            return Err(EngineError::ParticipantNotFound);
        }

        if let Some(room_id) = self.assignment.remove(participant_id) {
            if let Some(room) = self.rooms.iter_mut().find(|r| r.room_id == room_id) {
                room.participant_ids.remove(participant_id);
            }
            self.unassigned.push(participant_id.to_string());
        }
        Ok(())
    }

    /// Distribute the whole unassigned pool across existing rooms.
    ///
    /// Round-robin over a shuffled copy of the pool, in room creation order.
    /// Guarantees a difference of at most one participant between any two
    /// rooms' sizes and empties the pool. A no-op with zero rooms. The rng is
    /// injected so distribution is seedable in tests.
    pub fn auto_assign<R: Rng>(&mut self, rng: &mut R) -> Result<(), EngineError> {
        if self.locked() {
            return Err(EngineError::SessionLocked);
        }
        if self.rooms.is_empty() {
            return Ok(());
        }

        let mut pool = std::mem::take(&mut self.unassigned);
        pool.shuffle(rng);

        let room_count = self.rooms.len();
        for (i, participant_id) in pool.into_iter().enumerate() {
            // room_count > 0 guaranteed above
            if let Some(room) = self.rooms.get_mut(i % room_count) {
                self.assignment
                    .insert(participant_id.clone(), room.room_id.clone());
                room.participant_ids.insert(participant_id);
            }
        }

        debug!(target: "lc.engine.rooms", rooms = room_count, "Auto-assign complete");
        Ok(())
    }

    /// Start the breakout: all `waiting` rooms become `active` with the given
    /// advisory duration. Membership is frozen until `end_all`.
    ///
    /// A no-op with zero rooms. A zero-minute duration is rejected, as is
    /// starting while already in session.
    pub fn start(&mut self, duration_minutes: u32) -> Result<(), EngineError> {
        if self.locked() {
            return Err(EngineError::Conflict("Breakout already in session".to_string()));
        }
        if duration_minutes == 0 {
            return Err(EngineError::Conflict(
                "Breakout duration must be at least one minute".to_string(),
            ));
        }

        for room in &mut self.rooms {
            room.status = RoomStatus::Active;
            room.duration_minutes = Some(duration_minutes);
        }
        Ok(())
    }

    /// End the breakout: destroy every room and return all participants to
    /// the main session.
    pub fn end_all(&mut self) {
        for room in self.rooms.drain(..) {
            for participant_id in room.participant_ids {
                self.assignment.remove(&participant_id);
                self.unassigned.push(participant_id);
            }
        }
    }
}
