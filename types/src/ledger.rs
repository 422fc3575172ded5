//! Ledger transactions: the idempotent unit of score mutation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{validate_id, ParticipantId, PeriodId, Timestamp, TransactionId, ValidationError};

/// Lowest amount a single transaction may carry.
pub const MIN_AMOUNT: i64 = -100;
/// Highest amount a single transaction may carry.
pub const MAX_AMOUNT: i64 = 500;
/// Upper bound on any single per-event stat (goals, assists, saves).
pub const MAX_STAT_PER_EVENT: u32 = 50;
/// Upper bound on milestone labels attached to one transaction.
pub const MAX_MILESTONES: usize = 10;

/// Field position played during an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Goalkeeper,
    Field,
}

/// Outcome of an event from the participant's side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    /// League points awarded for this result.
    pub fn points(self) -> i64 {
        match self {
            MatchResult::Win => 3,
            MatchResult::Draw => 1,
            MatchResult::Loss => 0,
        }
    }
}

/// Per-event statistics of one participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPerformance {
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub saves: u32,
    pub position: Position,
    pub result: MatchResult,
    #[serde(default)]
    pub was_mvp: bool,
    /// Goals conceded by the participant's team, when known.
    #[serde(default)]
    pub goals_conceded: Option<u32>,
}

impl MatchPerformance {
    pub fn new(position: Position, result: MatchResult) -> Self {
        Self {
            goals: 0,
            assists: 0,
            saves: 0,
            position,
            result,
            was_mvp: false,
            goals_conceded: None,
        }
    }

    pub fn with_goals(mut self, goals: u32) -> Self {
        self.goals = goals;
        self
    }

    pub fn with_assists(mut self, assists: u32) -> Self {
        self.assists = assists;
        self
    }

    pub fn with_saves(mut self, saves: u32) -> Self {
        self.saves = saves;
        self
    }

    pub fn with_mvp(mut self, was_mvp: bool) -> Self {
        self.was_mvp = was_mvp;
        self
    }

    pub fn with_goals_conceded(mut self, conceded: u32) -> Self {
        self.goals_conceded = Some(conceded);
        self
    }
}

/// What the transaction records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activity {
    /// Participation in an event; advances streaks and game counters.
    Match(MatchPerformance),
    /// Confirmed but absent; resets the attendance streak.
    NoShow,
    /// Manual score correction; touches only the score.
    Adjustment,
}

/// One idempotent score mutation, keyed by `(participant_id, transaction_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: TransactionId,
    pub participant_id: ParticipantId,
    pub amount: i64,
    #[serde(default)]
    pub breakdown: BTreeMap<String, i64>,
    pub activity: Activity,
    /// Competition period the activity counts towards, if any.
    #[serde(default)]
    pub period_id: Option<PeriodId>,
    #[serde(default)]
    pub milestones: Vec<String>,
    pub applied_at: Timestamp,
}

impl LedgerTransaction {
    pub fn new(
        transaction_id: impl Into<TransactionId>,
        participant_id: impl Into<ParticipantId>,
        amount: i64,
        activity: Activity,
        applied_at: Timestamp,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            participant_id: participant_id.into(),
            amount,
            breakdown: BTreeMap::new(),
            activity,
            period_id: None,
            milestones: Vec::new(),
            applied_at,
        }
    }

    pub fn with_breakdown(mut self, category: impl Into<String>, value: i64) -> Self {
        self.breakdown.insert(category.into(), value);
        self
    }

    pub fn with_period(mut self, period_id: impl Into<PeriodId>) -> Self {
        self.period_id = Some(period_id.into());
        self
    }

    pub fn with_milestone(mut self, label: impl Into<String>) -> Self {
        self.milestones.push(label.into());
        self
    }

    /// The match statistics, if this transaction records participation.
    pub fn performance(&self) -> Option<&MatchPerformance> {
        match &self.activity {
            Activity::Match(perf) => Some(perf),
            _ => None,
        }
    }

    /// Absolute difference between the breakdown total and `amount`.
    pub fn breakdown_drift(&self) -> i64 {
        if self.breakdown.is_empty() {
            return 0;
        }
        let total = self
            .breakdown
            .values()
            .fold(0i64, |acc, v| acc.saturating_add(*v));
        total.saturating_sub(self.amount).saturating_abs()
    }

    /// Structural validation. Runs before any store access.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.transaction_id.validate()?;
        self.participant_id.validate()?;
        if let Some(period) = &self.period_id {
            period.validate()?;
        }
        if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&self.amount) {
            return Err(ValidationError::AmountOutOfRange {
                amount: self.amount,
                min: MIN_AMOUNT,
                max: MAX_AMOUNT,
            });
        }
        if let Some(perf) = self.performance() {
            for (stat, value) in [
                ("goals", perf.goals),
                ("assists", perf.assists),
                ("saves", perf.saves),
            ] {
                if value > MAX_STAT_PER_EVENT {
                    return Err(ValidationError::StatOutOfRange {
                        stat,
                        value,
                        max: MAX_STAT_PER_EVENT,
                    });
                }
            }
        }
        if self.milestones.len() > MAX_MILESTONES {
            return Err(ValidationError::TooManyMilestones {
                count: self.milestones.len(),
                max: MAX_MILESTONES,
            });
        }
        for (category, value) in &self.breakdown {
            validate_id("breakdown category", category)?;
            if !(MIN_AMOUNT..=MAX_AMOUNT).contains(value) {
                return Err(ValidationError::BreakdownOutOfRange {
                    category: category.clone(),
                    value: *value,
                    min: MIN_AMOUNT,
                    max: MAX_AMOUNT,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_tx(amount: i64) -> LedgerTransaction {
        LedgerTransaction::new(
            "game_1",
            "p1",
            amount,
            Activity::Match(MatchPerformance::new(Position::Field, MatchResult::Win)),
            Timestamp::new(1_000),
        )
    }

    #[test]
    fn valid_transaction_passes() {
        assert!(match_tx(40).validate().is_ok());
        assert!(match_tx(MIN_AMOUNT).validate().is_ok());
        assert!(match_tx(MAX_AMOUNT).validate().is_ok());
    }

    #[test]
    fn amount_out_of_range_rejected() {
        assert!(matches!(
            match_tx(MAX_AMOUNT + 1).validate(),
            Err(ValidationError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            match_tx(MIN_AMOUNT - 1).validate(),
            Err(ValidationError::AmountOutOfRange { .. })
        ));
    }

    #[test]
    fn excessive_stats_rejected() {
        let mut tx = match_tx(10);
        tx.activity = Activity::Match(
            MatchPerformance::new(Position::Goalkeeper, MatchResult::Draw).with_saves(51),
        );
        assert_eq!(
            tx.validate(),
            Err(ValidationError::StatOutOfRange {
                stat: "saves",
                value: 51,
                max: MAX_STAT_PER_EVENT
            })
        );
    }

    #[test]
    fn too_many_milestones_rejected() {
        let mut tx = match_tx(10);
        for i in 0..=MAX_MILESTONES {
            tx = tx.with_milestone(format!("m{i}"));
        }
        assert!(matches!(
            tx.validate(),
            Err(ValidationError::TooManyMilestones { .. })
        ));
    }

    #[test]
    fn bad_period_id_rejected() {
        let tx = match_tx(10).with_period("monthly/2026");
        assert!(matches!(
            tx.validate(),
            Err(ValidationError::ReservedChar { field: "period_id", .. })
        ));
    }

    #[test]
    fn breakdown_drift_measures_mismatch() {
        let tx = match_tx(40)
            .with_breakdown("participation", 10)
            .with_breakdown("result", 20);
        assert_eq!(tx.breakdown_drift(), 10);
        assert_eq!(match_tx(40).breakdown_drift(), 0);
    }

    #[test]
    fn oversized_breakdown_rejected() {
        let tx = LedgerTransaction::new("t1", "p1", 10, Activity::Adjustment, Timestamp::new(0))
            .with_breakdown("a", i64::MAX)
            .with_breakdown("b", 1);
        assert_eq!(
            tx.validate(),
            Err(ValidationError::BreakdownOutOfRange {
                category: "a".to_string(),
                value: i64::MAX,
                min: MIN_AMOUNT,
                max: MAX_AMOUNT,
            })
        );
    }

    #[test]
    fn breakdown_drift_saturates() {
        let tx = LedgerTransaction::new("t1", "p1", -100, Activity::Adjustment, Timestamp::new(0))
            .with_breakdown("a", i64::MAX)
            .with_breakdown("b", 1);
        assert_eq!(tx.breakdown_drift(), i64::MAX);

        let tx = LedgerTransaction::new("t1", "p1", 500, Activity::Adjustment, Timestamp::new(0))
            .with_breakdown("a", i64::MIN);
        assert_eq!(tx.breakdown_drift(), i64::MAX);
    }

    #[test]
    fn activity_is_tagged_in_json() {
        let tx = match_tx(10);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["activity"]["kind"], "match");
        assert_eq!(json["activity"]["result"], "win");
        let back: LedgerTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
