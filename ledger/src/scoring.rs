//! Pure state transitions applied by a ledger transaction.

use gamify_types::{
    Activity, LedgerTransaction, MatchPerformance, MatchResult, ParticipantScoreState,
    SeasonParticipation, Timestamp,
};

use crate::level_for_score;

/// State after adding `tx` to `prior`. Score never drops below zero.
pub fn next_state(
    prior: &ParticipantScoreState,
    tx: &LedgerTransaction,
    now: Timestamp,
) -> ParticipantScoreState {
    let mut state = prior.clone();
    state.total_score = prior.total_score.saturating_add(tx.amount).max(0);
    state.level = level_for_score(state.total_score);

    for (category, value) in &tx.breakdown {
        let total = state.score_by_category.entry(category.clone()).or_insert(0);
        *total = total.saturating_add(*value);
    }

    state
        .milestones_achieved
        .extend(tx.milestones.iter().cloned());

    match &tx.activity {
        Activity::Match(perf) => {
            state.games_played = state.games_played.saturating_add(1);
            state.current_streak = state.current_streak.saturating_add(1);
            if perf.result == MatchResult::Win {
                state.games_won = state.games_won.saturating_add(1);
            }
            state.mvp_streak = if perf.was_mvp {
                state.mvp_streak.saturating_add(1)
            } else {
                0
            };
        }
        Activity::NoShow => state.current_streak = 0,
        Activity::Adjustment => {}
    }

    state.transactions_applied = state.transactions_applied.saturating_add(1);
    state.updated_at = Some(now);
    state
}

/// Period totals after one more event.
pub fn next_participation(
    prior: &SeasonParticipation,
    perf: &MatchPerformance,
) -> SeasonParticipation {
    let mut next = prior.clone();
    next.points = next.points.saturating_add(perf.result.points());
    next.games_played = next.games_played.saturating_add(1);
    match perf.result {
        MatchResult::Win => next.wins = next.wins.saturating_add(1),
        MatchResult::Draw => next.draws = next.draws.saturating_add(1),
        MatchResult::Loss => next.losses = next.losses.saturating_add(1),
    }
    next.goals_scored = next.goals_scored.saturating_add(perf.goals);
    next.goals_conceded = next
        .goals_conceded
        .saturating_add(perf.goals_conceded.unwrap_or(0));
    if perf.was_mvp {
        next.mvp_count = next.mvp_count.saturating_add(1);
    }
    next
}
