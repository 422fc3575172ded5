//! Competition periods ("seasons") and their per-participant records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{ParticipantId, PeriodId, Timestamp, ValidationError};

/// Calendar granularity of a period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Weekly,
    Monthly,
    Quarterly,
    /// Arbitrary range; never renewed automatically.
    Custom,
}

impl PeriodType {
    pub fn auto_renews(self) -> bool {
        !matches!(self, PeriodType::Custom)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Custom => "custom",
        }
    }
}

/// Closure progress of a period: `Open -> Closing -> Closed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureStatus {
    #[default]
    Open,
    /// Deactivated; standings or successor may still be outstanding.
    Closing,
    Closed,
}

/// A time-bound competition period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionPeriod {
    pub period_id: PeriodId,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    #[serde(default)]
    pub closure_status: ClosureStatus,
    #[serde(default)]
    pub closed_at: Option<Timestamp>,
    #[serde(default)]
    pub predecessor: Option<PeriodId>,
}

impl CompetitionPeriod {
    /// A fresh active period. Rejects inverted ranges.
    pub fn new(
        period_id: impl Into<PeriodId>,
        period_type: PeriodType,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let period_id = period_id.into();
        period_id.validate()?;
        if end_date < start_date {
            return Err(ValidationError::InvalidDateRange(format!(
                "{period_id}: end {end_date} precedes start {start_date}"
            )));
        }
        Ok(Self {
            period_id,
            period_type,
            start_date,
            end_date,
            is_active: true,
            closure_status: ClosureStatus::Open,
            closed_at: None,
            predecessor: None,
        })
    }

    /// Whether the period is past its end as of `today`.
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.end_date < today
    }
}

/// League tier a participant competes in during a period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeagueDivision {
    #[default]
    Bronze,
    Silver,
    Gold,
    Diamond,
}

/// Live per-period totals of one participant, keyed `(period, participant)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonParticipation {
    pub period_id: PeriodId,
    pub participant_id: ParticipantId,
    #[serde(default)]
    pub division: LeagueDivision,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub goals_scored: u32,
    #[serde(default)]
    pub goals_conceded: u32,
    #[serde(default)]
    pub mvp_count: u32,
}

impl SeasonParticipation {
    pub fn new(period_id: PeriodId, participant_id: ParticipantId) -> Self {
        Self {
            period_id,
            participant_id,
            division: LeagueDivision::default(),
            points: 0,
            games_played: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            goals_scored: 0,
            goals_conceded: 0,
            mvp_count: 0,
        }
    }
}

/// Immutable end-of-period snapshot, keyed `(period, participant)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStanding {
    pub period_id: PeriodId,
    pub participant_id: ParticipantId,
    /// 1-based position by points, then wins, then participant id.
    pub rank: u32,
    pub division: LeagueDivision,
    pub points: i64,
    pub games_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_scored: u32,
    pub mvp_count: u32,
    pub frozen_at: Timestamp,
}

impl FinalStanding {
    pub fn freeze(participation: &SeasonParticipation, rank: u32, frozen_at: Timestamp) -> Self {
        Self {
            period_id: participation.period_id.clone(),
            participant_id: participation.participant_id.clone(),
            rank,
            division: participation.division,
            points: participation.points,
            games_played: participation.games_played,
            wins: participation.wins,
            draws: participation.draws,
            losses: participation.losses,
            goals_scored: participation.goals_scored,
            mvp_count: participation.mvp_count,
            frozen_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn inverted_range_rejected() {
        let err = CompetitionPeriod::new(
            "custom_x",
            PeriodType::Custom,
            date(2026, 10, 2),
            date(2026, 10, 1),
        );
        assert!(matches!(err, Err(ValidationError::InvalidDateRange(_))));
    }

    #[test]
    fn past_due_is_strict() {
        let p = CompetitionPeriod::new(
            "monthly_2026_09",
            PeriodType::Monthly,
            date(2026, 9, 1),
            date(2026, 9, 30),
        )
        .unwrap();
        assert!(!p.is_past_due(date(2026, 9, 30)));
        assert!(p.is_past_due(date(2026, 10, 1)));
    }

    #[test]
    fn dates_serialize_as_iso_strings() {
        let p = CompetitionPeriod::new(
            "weekly_2026_W42",
            PeriodType::Weekly,
            date(2026, 10, 12),
            date(2026, 10, 18),
        )
        .unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["end_date"], "2026-10-18");
        assert_eq!(json["closure_status"], "open");
    }

    #[test]
    fn only_custom_does_not_renew() {
        assert!(PeriodType::Weekly.auto_renews());
        assert!(PeriodType::Monthly.auto_renews());
        assert!(PeriodType::Quarterly.auto_renews());
        assert!(!PeriodType::Custom.auto_renews());
    }
}
