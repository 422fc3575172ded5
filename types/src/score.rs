//! Per-participant cumulative score state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{ParticipantId, Timestamp};

/// Running totals for one participant.
///
/// Written only as the result of recording a new ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantScoreState {
    pub participant_id: ParticipantId,
    pub total_score: i64,
    pub level: u32,
    pub current_streak: u32,
    pub games_played: u32,
    pub games_won: u32,
    pub mvp_streak: u32,
    #[serde(default)]
    pub score_by_category: BTreeMap<String, i64>,
    /// Milestone labels ever unlocked; each appears once.
    #[serde(default)]
    pub milestones_achieved: BTreeSet<String>,
    #[serde(default)]
    pub transactions_applied: u64,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl ParticipantScoreState {
    /// The zero state of a participant with no recorded transactions.
    pub fn new(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            total_score: 0,
            level: 0,
            current_streak: 0,
            games_played: 0,
            games_won: 0,
            mvp_streak: 0,
            score_by_category: BTreeMap::new(),
            milestones_achieved: BTreeSet::new(),
            transactions_applied: 0,
            updated_at: None,
        }
    }
}
