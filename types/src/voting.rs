//! MVP voting: events, per-voter records, per-candidate tallies.

use serde::{Deserialize, Serialize};

use crate::{EventId, ParticipantId, Timestamp};

/// Voting state of one event. `concluded` is the idempotency flag for the
/// final result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingEvent {
    pub event_id: EventId,
    /// Confirmed participants: the only eligible voters and candidates.
    pub participants: Vec<ParticipantId>,
    pub opened_at: Timestamp,
    pub closes_at: Timestamp,
    #[serde(default)]
    pub total_votes: u64,
    #[serde(default)]
    pub concluded: bool,
    #[serde(default)]
    pub winner: Option<ParticipantId>,
    #[serde(default)]
    pub winning_votes: u64,
    #[serde(default)]
    pub concluded_at: Option<Timestamp>,
}

impl VotingEvent {
    pub fn is_participant(&self, id: &ParticipantId) -> bool {
        self.participants.contains(id)
    }
}

/// One accepted vote. Stored at the deterministic `(event, voter)` key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub event_id: EventId,
    pub voter_id: ParticipantId,
    pub candidate_id: ParticipantId,
    pub cast_at: Timestamp,
}

/// Additive vote counter for one candidate of one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub event_id: EventId,
    pub candidate_id: ParticipantId,
    pub vote_count: u64,
}
