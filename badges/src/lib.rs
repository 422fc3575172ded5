//! Badge rule evaluation.
//!
//! [`evaluate`] maps a performance snapshot to the set of badges it
//! qualifies for. Every rule in [`RULES`] is an independent predicate;
//! all are evaluated and their results unioned, so a snapshot clearing a
//! higher threshold also yields every lower one. No persistence here:
//! grant idempotency is the caller's concern.

use std::collections::BTreeSet;

use gamify_types::{BadgeId, MatchPerformance, ParticipantScoreState, Position};

/// Input to the rule table: cumulative state after a transaction, plus the
/// per-event stats of that transaction when it recorded a match.
#[derive(Clone, Copy, Debug)]
pub struct BadgeSnapshot<'a> {
    pub state: &'a ParticipantScoreState,
    pub performance: Option<&'a MatchPerformance>,
}

impl<'a> BadgeSnapshot<'a> {
    pub fn new(
        state: &'a ParticipantScoreState,
        performance: Option<&'a MatchPerformance>,
    ) -> Self {
        Self { state, performance }
    }

    fn goals(&self) -> u32 {
        self.performance.map_or(0, |p| p.goals)
    }

    fn assists(&self) -> u32 {
        self.performance.map_or(0, |p| p.assists)
    }

    fn goalkeeper(&self) -> Option<&'a MatchPerformance> {
        self.performance
            .filter(|p| p.position == Position::Goalkeeper)
    }

    /// Goalkeeper whose team conceded nothing. Unknown score is not clean.
    fn clean_sheet(&self) -> bool {
        self.goalkeeper()
            .is_some_and(|p| p.goals_conceded == Some(0))
    }
}

/// One row of the rule table.
pub struct Rule {
    pub badge: BadgeId,
    pub qualifies: fn(&BadgeSnapshot<'_>) -> bool,
}

pub const RULES: &[Rule] = &[
    // Goals in a single event
    Rule {
        badge: BadgeId::HatTrick,
        qualifies: |s| s.goals() >= 3,
    },
    Rule {
        badge: BadgeId::Poker,
        qualifies: |s| s.goals() >= 4,
    },
    Rule {
        badge: BadgeId::Manita,
        qualifies: |s| s.goals() >= 5,
    },
    // Assists and combined
    Rule {
        badge: BadgeId::Playmaker,
        qualifies: |s| s.assists() >= 3,
    },
    Rule {
        badge: BadgeId::BalancedPlayer,
        qualifies: |s| s.goals() >= 2 && s.assists() >= 2,
    },
    // Attendance streak
    Rule {
        badge: BadgeId::Streak7,
        qualifies: |s| s.state.current_streak >= 7,
    },
    Rule {
        badge: BadgeId::IronMan,
        qualifies: |s| s.state.current_streak >= 10,
    },
    Rule {
        badge: BadgeId::Streak30,
        qualifies: |s| s.state.current_streak >= 30,
    },
    Rule {
        badge: BadgeId::MvpStreak3,
        qualifies: |s| s.state.mvp_streak >= 3,
    },
    // Milestone game counts
    Rule {
        badge: BadgeId::Veteran50,
        qualifies: |s| s.state.games_played >= 50,
    },
    Rule {
        badge: BadgeId::Veteran100,
        qualifies: |s| s.state.games_played >= 100,
    },
    // Levels
    Rule {
        badge: BadgeId::Level5,
        qualifies: |s| s.state.level >= 5,
    },
    Rule {
        badge: BadgeId::Level10,
        qualifies: |s| s.state.level >= 10,
    },
    // Goalkeeper
    Rule {
        badge: BadgeId::CleanSheet,
        qualifies: |s| s.clean_sheet(),
    },
    Rule {
        badge: BadgeId::Paredao,
        qualifies: |s| s.clean_sheet() && s.goalkeeper().is_some_and(|p| p.saves >= 5),
    },
    Rule {
        badge: BadgeId::DefensiveWall,
        qualifies: |s| s.goalkeeper().is_some_and(|p| p.saves >= 10),
    },
    // Wins
    Rule {
        badge: BadgeId::Winner25,
        qualifies: |s| s.state.games_won >= 25,
    },
    Rule {
        badge: BadgeId::Winner50,
        qualifies: |s| s.state.games_won >= 50,
    },
];

/// Every badge the snapshot qualifies for.
pub fn evaluate(snapshot: &BadgeSnapshot<'_>) -> BTreeSet<BadgeId> {
    RULES
        .iter()
        .filter(|rule| (rule.qualifies)(snapshot))
        .map(|rule| rule.badge)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamify_types::{MatchResult, ParticipantId};

    fn state() -> ParticipantScoreState {
        ParticipantScoreState::new(ParticipantId::new("p1"))
    }

    fn field() -> MatchPerformance {
        MatchPerformance::new(Position::Field, MatchResult::Win)
    }

    fn keeper() -> MatchPerformance {
        MatchPerformance::new(Position::Goalkeeper, MatchResult::Draw)
    }

    fn badges(state: &ParticipantScoreState, perf: Option<&MatchPerformance>) -> BTreeSet<BadgeId> {
        evaluate(&BadgeSnapshot::new(state, perf))
    }

    fn set(ids: &[BadgeId]) -> BTreeSet<BadgeId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn every_badge_has_exactly_one_rule() {
        let ruled: BTreeSet<BadgeId> = RULES.iter().map(|r| r.badge).collect();
        assert_eq!(ruled.len(), RULES.len());
        assert_eq!(ruled, BadgeId::ALL.iter().copied().collect());
    }

    #[test]
    fn goal_thresholds_are_cumulative() {
        let s = state();
        let table = [
            (0, set(&[])),
            (2, set(&[])),
            (3, set(&[BadgeId::HatTrick])),
            (4, set(&[BadgeId::HatTrick, BadgeId::Poker])),
            (5, set(&[BadgeId::HatTrick, BadgeId::Poker, BadgeId::Manita])),
            (9, set(&[BadgeId::HatTrick, BadgeId::Poker, BadgeId::Manita])),
        ];
        for (goals, expected) in table {
            let perf = field().with_goals(goals);
            assert_eq!(badges(&s, Some(&perf)), expected, "goals = {goals}");
        }
    }

    #[test]
    fn assists_and_balanced() {
        let s = state();
        let perf = field().with_assists(3);
        assert_eq!(badges(&s, Some(&perf)), set(&[BadgeId::Playmaker]));

        let perf = field().with_goals(2).with_assists(2);
        assert_eq!(badges(&s, Some(&perf)), set(&[BadgeId::BalancedPlayer]));

        let perf = field().with_goals(2).with_assists(1);
        assert!(badges(&s, Some(&perf)).is_empty());
    }

    #[test]
    fn streak_tiers() {
        let mut s = state();
        let table = [
            (6, set(&[])),
            (7, set(&[BadgeId::Streak7])),
            (10, set(&[BadgeId::Streak7, BadgeId::IronMan])),
            (29, set(&[BadgeId::Streak7, BadgeId::IronMan])),
            (30, set(&[BadgeId::Streak7, BadgeId::IronMan, BadgeId::Streak30])),
        ];
        for (streak, expected) in table {
            s.current_streak = streak;
            assert_eq!(badges(&s, None), expected, "streak = {streak}");
        }
    }

    #[test]
    fn mvp_streak() {
        let mut s = state();
        s.mvp_streak = 2;
        assert!(badges(&s, None).is_empty());
        s.mvp_streak = 3;
        assert_eq!(badges(&s, None), set(&[BadgeId::MvpStreak3]));
    }

    #[test]
    fn milestones_levels_and_wins() {
        let mut s = state();
        s.games_played = 100;
        s.level = 10;
        s.games_won = 50;
        assert_eq!(
            badges(&s, None),
            set(&[
                BadgeId::Veteran50,
                BadgeId::Veteran100,
                BadgeId::Level5,
                BadgeId::Level10,
                BadgeId::Winner25,
                BadgeId::Winner50,
            ])
        );

        s.games_played = 49;
        s.level = 4;
        s.games_won = 24;
        assert!(badges(&s, None).is_empty());
    }

    #[test]
    fn goalkeeper_rules_need_goalkeeper_position() {
        let s = state();
        let outfield = MatchPerformance::new(Position::Field, MatchResult::Win)
            .with_saves(12)
            .with_goals_conceded(0);
        assert!(badges(&s, Some(&outfield)).is_empty());

        let wall = keeper().with_saves(12).with_goals_conceded(0);
        assert_eq!(
            badges(&s, Some(&wall)),
            set(&[BadgeId::CleanSheet, BadgeId::Paredao, BadgeId::DefensiveWall])
        );
    }

    #[test]
    fn clean_sheet_requires_known_zero() {
        let s = state();
        let unknown = keeper().with_saves(6);
        assert!(badges(&s, Some(&unknown)).is_empty());

        let conceded = keeper().with_saves(6).with_goals_conceded(1);
        assert!(badges(&s, Some(&conceded)).is_empty());

        let clean = keeper().with_saves(4).with_goals_conceded(0);
        assert_eq!(badges(&s, Some(&clean)), set(&[BadgeId::CleanSheet]));
    }

    #[test]
    fn event_badges_need_performance() {
        let s = state();
        assert!(badges(&s, None).is_empty());
    }
}
