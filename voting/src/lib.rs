//! Atomic tally service for MVP voting.
//!
//! One vote per `(event, voter)` is enforced by the deterministic vote
//! record key; the record, the candidate tally and the event counter are
//! written in one store transaction. Conclusion is gated by the event's
//! `concluded` flag so the result is computed and written once.

pub mod error;
pub mod tally;

pub use error::VotingError;
pub use tally::{ConcludeOutcome, TallyService};
