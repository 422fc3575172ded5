//! Deterministic document identities.
//!
//! Every record that must be created at most once lives at a key derived
//! from its logical attributes, so creation is naturally idempotent.
//! Callers validate identifiers (no `/` or `:`) before building keys.

use gamify_types::{BadgeId, EventId, ParticipantId, PeriodId, TransactionId};

use crate::DocKey;

pub const LEDGER_TRANSACTIONS: &str = "ledger_transactions";
pub const PARTICIPANT_SCORES: &str = "participant_scores";
pub const BADGE_GRANTS: &str = "badge_grants";
pub const VOTING_EVENTS: &str = "voting_events";
pub const VOTE_RECORDS: &str = "vote_records";
pub const VOTE_TALLIES: &str = "vote_tallies";
pub const COMPETITION_PERIODS: &str = "competition_periods";
pub const SEASON_PARTICIPATION: &str = "season_participation";
pub const FINAL_STANDINGS: &str = "final_standings";
pub const RATE_LIMITS: &str = "rate_limits";

fn pair(a: &str, b: &str) -> String {
    format!("{a}:{b}")
}

pub fn ledger_transaction(participant: &ParticipantId, transaction: &TransactionId) -> DocKey {
    DocKey::new(
        LEDGER_TRANSACTIONS,
        pair(participant.as_str(), transaction.as_str()),
    )
}

pub fn participant_score(participant: &ParticipantId) -> DocKey {
    DocKey::new(PARTICIPANT_SCORES, participant.as_str())
}

pub fn badge_grant(participant: &ParticipantId, badge: BadgeId) -> DocKey {
    DocKey::new(BADGE_GRANTS, pair(participant.as_str(), badge.as_str()))
}

pub fn voting_event(event: &EventId) -> DocKey {
    DocKey::new(VOTING_EVENTS, event.as_str())
}

pub fn vote_record(event: &EventId, voter: &ParticipantId) -> DocKey {
    DocKey::new(VOTE_RECORDS, pair(event.as_str(), voter.as_str()))
}

pub fn vote_tally(event: &EventId, candidate: &ParticipantId) -> DocKey {
    DocKey::new(VOTE_TALLIES, pair(event.as_str(), candidate.as_str()))
}

pub fn competition_period(period: &PeriodId) -> DocKey {
    DocKey::new(COMPETITION_PERIODS, period.as_str())
}

pub fn season_participation(period: &PeriodId, participant: &ParticipantId) -> DocKey {
    DocKey::new(
        SEASON_PARTICIPATION,
        pair(period.as_str(), participant.as_str()),
    )
}

pub fn final_standing(period: &PeriodId, participant: &ParticipantId) -> DocKey {
    DocKey::new(FINAL_STANDINGS, pair(period.as_str(), participant.as_str()))
}

pub fn rate_limit(operation: &str, caller: &str) -> DocKey {
    DocKey::new(RATE_LIMITS, pair(operation, caller))
}
