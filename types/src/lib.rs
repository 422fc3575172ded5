//! Fundamental types for the gamify ledger engine.
//!
//! This crate defines the data model shared across every other crate in the
//! workspace: identifiers, timestamps, ledger transactions, score state,
//! badges, voting records and competition periods.

pub mod badge;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod period;
pub mod score;
pub mod time;
pub mod voting;

pub use badge::{BadgeGrant, BadgeId};
pub use error::ValidationError;
pub use ids::{validate_id, EventId, ParticipantId, PeriodId, TransactionId, MAX_ID_LEN};
pub use ledger::{Activity, LedgerTransaction, MatchPerformance, MatchResult, Position};
pub use period::{
    ClosureStatus, CompetitionPeriod, FinalStanding, LeagueDivision, PeriodType,
    SeasonParticipation,
};
pub use score::ParticipantScoreState;
pub use time::{Clock, SystemClock, Timestamp};
pub use voting::{VoteRecord, VoteTally, VotingEvent};
