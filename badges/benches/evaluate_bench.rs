use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gamify_badges::{evaluate, BadgeSnapshot};
use gamify_types::{MatchPerformance, MatchResult, ParticipantId, ParticipantScoreState, Position};

fn bench_evaluate(c: &mut Criterion) {
    let mut state = ParticipantScoreState::new(ParticipantId::new("bench"));
    state.current_streak = 12;
    state.games_played = 100;
    state.games_won = 30;
    state.level = 6;
    let perf = MatchPerformance::new(Position::Goalkeeper, MatchResult::Win)
        .with_goals(1)
        .with_saves(11)
        .with_goals_conceded(0);

    let mut group = c.benchmark_group("badge_rules");
    group.bench_function("evaluate_with_match", |b| {
        b.iter(|| evaluate(black_box(&BadgeSnapshot::new(&state, Some(&perf)))));
    });
    group.bench_function("evaluate_state_only", |b| {
        b.iter(|| evaluate(black_box(&BadgeSnapshot::new(&state, None))));
    });
    group.finish();
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
