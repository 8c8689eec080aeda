//! Queue engine - ordered hand-raise queue with per-entry state transitions.
//!
//! Invariant: at most one live entry per participant. Queue order is
//! significant and host-mutable via neighbor swaps.
//!
//! Entry state machine: `waiting -> acknowledged -> answered`; `remove` is
//! legal from any state and deletes the entry. Hosts may mark an entry
//! answered directly from `waiting` without acknowledging it first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// State of a hand-raise entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Raised, not yet seen by the host.
    Waiting,
    /// Seen by the host, pending an answer.
    Acknowledged,
    /// Answered; kept in the queue until removed or cleared.
    Answered,
}

/// One raised hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandRaiseEntry {
    /// Entry id, unique within the session.
    pub entry_id: String,
    /// Owning participant.
    pub participant_id: String,
    /// When the hand was raised. Wait time is derived (`now - raised_at`),
    /// never stored.
    pub raised_at: DateTime<Utc>,
    /// Current state.
    pub status: EntryStatus,
    /// Optional question text supplied when raising.
    pub question: Option<String>,
}

/// Direction for a manual reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderDirection {
    Up,
    Down,
}

/// Hand-raise queue for one session.
#[derive(Debug, Default)]
pub struct QueueEngine {
    /// Entries in queue order.
    entries: Vec<HandRaiseEntry>,
    /// Participant id -> entry id, for the one-live-entry invariant and
    /// O(1) leave cleanup.
    by_participant: HashMap<String, String>,
}

impl QueueEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in queue order.
    #[must_use]
    pub fn entries(&self) -> &[HandRaiseEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, entry_id: &str) -> Result<&mut HandRaiseEntry, EngineError> {
        self.entries
            .iter_mut()
            .find(|e| e.entry_id == entry_id)
            .ok_or(EngineError::EntryNotFound)
    }

    /// Raise a hand. Fails with `AlreadyQueued` if the participant already
    /// has a live entry.
    pub fn raise_hand(
        &mut self,
        participant_id: &str,
        question: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        if self.by_participant.contains_key(participant_id) {
            return Err(EngineError::AlreadyQueued);
        }

        let entry_id = Uuid::new_v4().to_string();
        self.entries.push(HandRaiseEntry {
            entry_id: entry_id.clone(),
            participant_id: participant_id.to_string(),
            raised_at: now,
            status: EntryStatus::Waiting,
            question,
        });
        self.by_participant
            .insert(participant_id.to_string(), entry_id.clone());
        Ok(entry_id)
    }

    /// Lower a hand (self-service removal of the participant's own entry).
    pub fn lower_hand(&mut self, participant_id: &str) -> Result<(), EngineError> {
        let entry_id = self
            .by_participant
            .remove(participant_id)
            .ok_or(EngineError::EntryNotFound)?;
        self.entries.retain(|e| e.entry_id != entry_id);
        Ok(())
    }

    /// Acknowledge a waiting entry (host action).
    pub fn acknowledge(&mut self, entry_id: &str) -> Result<(), EngineError> {
        let entry = self.entry_mut(entry_id)?;
        if entry.status != EntryStatus::Waiting {
            return Err(EngineError::Conflict(
                "Only waiting entries can be acknowledged".to_string(),
            ));
        }
        entry.status = EntryStatus::Acknowledged;
        Ok(())
    }

    /// Mark an entry answered (host action). Legal from `waiting` or
    /// `acknowledged`.
    pub fn mark_answered(&mut self, entry_id: &str) -> Result<(), EngineError> {
        let entry = self.entry_mut(entry_id)?;
        if entry.status == EntryStatus::Answered {
            return Err(EngineError::Conflict("Entry is already answered".to_string()));
        }
        entry.status = EntryStatus::Answered;
        Ok(())
    }

    /// Remove an entry (host action, legal from any state).
    pub fn remove(&mut self, entry_id: &str) -> Result<(), EngineError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.entry_id == entry_id)
            .ok_or(EngineError::EntryNotFound)?;
        let entry = self.entries.remove(index);
        self.by_participant.remove(&entry.participant_id);
        Ok(())
    }

    /// Swap the entry at `index` with its neighbor in the given direction.
    ///
    /// Out-of-range moves are no-ops, not errors.
    pub fn reorder(&mut self, index: usize, direction: ReorderDirection) {
        let target = match direction {
            ReorderDirection::Up => index.checked_sub(1),
            ReorderDirection::Down => index.checked_add(1),
        };
        if let Some(target) = target {
            if index < self.entries.len() && target < self.entries.len() {
                self.entries.swap(index, target);
            }
        }
    }

    /// Drop every answered entry.
    pub fn clear_answered(&mut self) {
        let removed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.status == EntryStatus::Answered)
            .map(|e| e.participant_id.clone())
            .collect();
        self.entries.retain(|e| e.status != EntryStatus::Answered);
        for participant_id in removed {
            self.by_participant.remove(&participant_id);
        }
    }

    /// Drop a leaving participant's entry, if any. Leave cleanup hook.
    pub fn participant_left(&mut self, participant_id: &str) {
        if let Some(entry_id) = self.by_participant.remove(participant_id) {
            self.entries.retain(|e| e.entry_id != entry_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_raise_hand_single_entry_invariant() {
        let mut queue = QueueEngine::new();
        queue.raise_hand("part-1", None, now()).unwrap();

        // Spec scenario: a second raise returns AlreadyQueued and the queue
        // length stays 1.
        assert!(matches!(
            queue.raise_hand("part-1", Some("again?".to_string()), now()),
            Err(EngineError::AlreadyQueued)
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_lower_hand_allows_raising_again() {
        let mut queue = QueueEngine::new();
        queue.raise_hand("part-1", None, now()).unwrap();
        queue.lower_hand("part-1").unwrap();
        assert!(queue.is_empty());
        queue.raise_hand("part-1", None, now()).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_lower_hand_without_entry() {
        let mut queue = QueueEngine::new();
        assert!(matches!(
            queue.lower_hand("part-1"),
            Err(EngineError::EntryNotFound)
        ));
    }

    #[test]
    fn test_entry_state_machine() {
        let mut queue = QueueEngine::new();
        let id = queue
            .raise_hand("part-1", Some("What is ownership?".to_string()), now())
            .unwrap();

        queue.acknowledge(&id).unwrap();
        assert_eq!(queue.entries()[0].status, EntryStatus::Acknowledged);

        // Acknowledging twice is a conflict.
        assert!(matches!(queue.acknowledge(&id), Err(EngineError::Conflict(_))));

        queue.mark_answered(&id).unwrap();
        assert_eq!(queue.entries()[0].status, EntryStatus::Answered);
        assert!(matches!(queue.mark_answered(&id), Err(EngineError::Conflict(_))));
    }

    #[test]
    fn test_mark_answered_directly_from_waiting() {
        let mut queue = QueueEngine::new();
        let id = queue.raise_hand("part-1", None, now()).unwrap();
        queue.mark_answered(&id).unwrap();
        assert_eq!(queue.entries()[0].status, EntryStatus::Answered);
    }

    #[test]
    fn test_remove_from_any_state_frees_participant() {
        let mut queue = QueueEngine::new();
        let id = queue.raise_hand("part-1", None, now()).unwrap();
        queue.acknowledge(&id).unwrap();
        queue.remove(&id).unwrap();
        assert!(queue.is_empty());

        // The participant may raise again after removal.
        queue.raise_hand("part-1", None, now()).unwrap();
    }

    #[test]
    fn test_reorder_swaps_neighbors() {
        let mut queue = QueueEngine::new();
        queue.raise_hand("part-1", None, now()).unwrap();
        queue.raise_hand("part-2", None, now()).unwrap();
        queue.raise_hand("part-3", None, now()).unwrap();

        queue.reorder(2, ReorderDirection::Up);
        let order: Vec<&str> = queue.entries().iter().map(|e| e.participant_id.as_str()).collect();
        assert_eq!(order, vec!["part-1", "part-3", "part-2"]);

        queue.reorder(0, ReorderDirection::Down);
        let order: Vec<&str> = queue.entries().iter().map(|e| e.participant_id.as_str()).collect();
        assert_eq!(order, vec!["part-3", "part-1", "part-2"]);
    }

    #[test]
    fn test_reorder_out_of_range_is_noop() {
        let mut queue = QueueEngine::new();
        queue.raise_hand("part-1", None, now()).unwrap();
        queue.raise_hand("part-2", None, now()).unwrap();

        queue.reorder(0, ReorderDirection::Up);
        queue.reorder(1, ReorderDirection::Down);
        queue.reorder(9, ReorderDirection::Up);

        let order: Vec<&str> = queue.entries().iter().map(|e| e.participant_id.as_str()).collect();
        assert_eq!(order, vec!["part-1", "part-2"]);
    }

    #[test]
    fn test_clear_answered() {
        let mut queue = QueueEngine::new();
        let a = queue.raise_hand("part-1", None, now()).unwrap();
        queue.raise_hand("part-2", None, now()).unwrap();
        let c = queue.raise_hand("part-3", None, now()).unwrap();

        queue.mark_answered(&a).unwrap();
        queue.mark_answered(&c).unwrap();
        queue.clear_answered();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries()[0].participant_id, "part-2");

        // Cleared participants can raise again.
        queue.raise_hand("part-1", None, now()).unwrap();
    }

    #[test]
    fn test_participant_left_drops_entry() {
        let mut queue = QueueEngine::new();
        queue.raise_hand("part-1", None, now()).unwrap();
        queue.raise_hand("part-2", None, now()).unwrap();

        queue.participant_left("part-1");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries()[0].participant_id, "part-2");

        // Unknown participants are ignored.
        queue.participant_left("ghost");
    }
}
