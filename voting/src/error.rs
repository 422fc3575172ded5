use gamify_store::StoreError;
use gamify_types::{EventId, ParticipantId, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VotingError {
    #[error("voting event {0} not found")]
    NotFound(EventId),

    #[error("voting for {0} is closed")]
    VotingClosed(EventId),

    #[error("{participant} is not confirmed for {event}")]
    NotEligible {
        event: EventId,
        participant: ParticipantId,
    },

    #[error("participants cannot vote for themselves")]
    SelfVote,

    #[error("{voter} already voted in {event}")]
    DuplicateVote { event: EventId, voter: ParticipantId },

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Storage(#[from] StoreError),
}

impl VotingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VotingError::Storage(e) if e.is_transient())
    }
}
