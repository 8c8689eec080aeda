//! Poll engine - live polls with one-vote-per-participant tallies.
//!
//! Poll state machine: `draft -> active -> closed`. Votes are accepted only
//! while `active`. A participant casts at most one vote total per poll,
//! regardless of option count, and votes are final - a later vote never
//! overwrites an earlier one.
//!
//! Tally invariant: `total_votes == sum(option.votes)`, maintained inside
//! `vote` by incrementing both counters together.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;

/// Status of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    /// Created, not yet visible to attendees.
    Draft,
    /// Launched; accepting votes.
    Active,
    /// Closed; results frozen.
    Closed,
}

/// One answer option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    /// Option id, unique within the poll.
    pub option_id: String,
    /// Display text.
    pub text: String,
    /// Vote count.
    pub votes: u32,
}

/// A live poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    /// Poll id, unique within the session.
    pub poll_id: String,
    /// The question being asked.
    pub question: String,
    /// Answer options in creation order.
    pub options: Vec<PollOption>,
    /// Current status.
    pub status: PollStatus,
    /// Total votes cast. Always equals the sum of option votes.
    pub total_votes: u32,
    /// Participants who have voted (one vote total per participant).
    #[serde(skip)]
    voters: HashSet<String>,
}

impl Poll {
    /// Whether the given participant has voted on this poll.
    #[must_use]
    pub fn has_voted(&self, participant_id: &str) -> bool {
        self.voters.contains(participant_id)
    }
}

/// Poll engine for one session.
#[derive(Debug, Default)]
pub struct PollEngine {
    polls: HashMap<String, Poll>,
    /// Poll ids in creation order, for stable listing.
    order: Vec<String>,
}

impl PollEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Polls in creation order.
    #[must_use]
    pub fn polls(&self) -> Vec<&Poll> {
        self.order.iter().filter_map(|id| self.polls.get(id)).collect()
    }

    /// Look up one poll.
    #[must_use]
    pub fn poll(&self, poll_id: &str) -> Option<&Poll> {
        self.polls.get(poll_id)
    }

    fn poll_mut(&mut self, poll_id: &str) -> Result<&mut Poll, EngineError> {
        self.polls.get_mut(poll_id).ok_or(EngineError::PollNotFound)
    }

    /// Create a poll in `draft` state.
    ///
    /// Rejects with `InsufficientOptions` if fewer than two non-empty options
    /// remain after trimming whitespace.
    pub fn create_poll(
        &mut self,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> Result<String, EngineError> {
        let options: Vec<PollOption> = options
            .into_iter()
            .filter_map(|text| {
                let trimmed = text.trim().to_string();
                (!trimmed.is_empty()).then(|| PollOption {
                    option_id: Uuid::new_v4().to_string(),
                    text: trimmed,
                    votes: 0,
                })
            })
            .collect();

        if options.len() < 2 {
            return Err(EngineError::InsufficientOptions);
        }

        let poll_id = Uuid::new_v4().to_string();
        self.polls.insert(
            poll_id.clone(),
            Poll {
                poll_id: poll_id.clone(),
                question: question.into(),
                options,
                status: PollStatus::Draft,
                total_votes: 0,
                voters: HashSet::new(),
            },
        );
        self.order.push(poll_id.clone());

        debug!(target: "lc.engine.polls", poll_id = %poll_id, "Poll created");
        Ok(poll_id)
    }

    /// Launch a draft poll, making it accept votes.
    pub fn launch(&mut self, poll_id: &str) -> Result<(), EngineError> {
        let poll = self.poll_mut(poll_id)?;
        if poll.status != PollStatus::Draft {
            return Err(EngineError::Conflict(
                "Only draft polls can be launched".to_string(),
            ));
        }
        poll.status = PollStatus::Active;
        Ok(())
    }

    /// Close an active poll, freezing its results.
    pub fn close(&mut self, poll_id: &str) -> Result<(), EngineError> {
        let poll = self.poll_mut(poll_id)?;
        if poll.status != PollStatus::Active {
            return Err(EngineError::Conflict(
                "Only active polls can be closed".to_string(),
            ));
        }
        poll.status = PollStatus::Closed;
        Ok(())
    }

    /// Delete a poll in any state.
    pub fn delete(&mut self, poll_id: &str) -> Result<(), EngineError> {
        self.polls.remove(poll_id).ok_or(EngineError::PollNotFound)?;
        self.order.retain(|id| id != poll_id);
        Ok(())
    }

    /// Cast a vote.
    ///
    /// Accepted only while the poll is `active`. Fails with `AlreadyVoted` if
    /// the participant has voted on this poll before; the earlier vote is
    /// never overwritten. The option count and total count are incremented
    /// together, keeping the tally invariant.
    pub fn vote(
        &mut self,
        poll_id: &str,
        participant_id: &str,
        option_id: &str,
    ) -> Result<(), EngineError> {
        let poll = self.poll_mut(poll_id)?;
        if poll.status != PollStatus::Active {
            return Err(EngineError::Conflict("Poll is not accepting votes".to_string()));
        }
        if poll.voters.contains(participant_id) {
            return Err(EngineError::AlreadyVoted);
        }

        let option = poll
            .options
            .iter_mut()
            .find(|o| o.option_id == option_id)
            .ok_or(EngineError::OptionNotFound)?;

        option.votes += 1;
        poll.total_votes += 1;
        poll.voters.insert(participant_id.to_string());
        Ok(())
    }
}
