//! End-to-end flows through the engine's invocation surface.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use gamify_engine::{Engine, EngineConfig, EngineError, StoreBackend, StoreRateLimiter};
use gamify_nullables::{NullClock, NullStore};
use gamify_store::{decode, keys};
use gamify_types::{
    Activity, ClosureStatus, CompetitionPeriod, EventId, FinalStanding, LedgerTransaction,
    MatchPerformance, MatchResult, ParticipantId, PeriodId, PeriodType, Position, Timestamp,
};
use tempfile::TempDir;

/// 2026-09-20T00:00:00Z
const SEPT_20: u64 = 1_789_862_400;
const DAY: u64 = 86_400;

struct Harness {
    store: Arc<NullStore>,
    clock: Arc<NullClock>,
    engine: Engine,
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.jitter = false;
    config.dispatcher.group_size = 10;
    config.dispatcher.max_in_flight = 4;
    config
}

fn harness(config: EngineConfig) -> Harness {
    let store = Arc::new(NullStore::with_ceiling(config.store.batch_ceiling));
    let clock = Arc::new(NullClock::new(SEPT_20));
    let limiter = Arc::new(StoreRateLimiter::new(
        store.clone(),
        clock.clone(),
        config.rate_limits.clone(),
    ));
    let engine = Engine::with_parts(config, store.clone(), clock.clone(), limiter).unwrap();
    Harness {
        store,
        clock,
        engine,
    }
}

fn game(tx: &str, participant: &str, result: MatchResult, goals: u32) -> LedgerTransaction {
    let perf = MatchPerformance::new(Position::Field, result).with_goals(goals);
    let amount = 20 + 10 * i64::from(goals);
    LedgerTransaction::new(tx, participant, amount, Activity::Match(perf), Timestamp::new(SEPT_20))
        .with_breakdown("participation", 20)
        .with_breakdown("goals", 10 * i64::from(goals))
}

#[tokio::test]
async fn replayed_transaction_is_reported_not_reapplied() {
    let h = harness(config());
    let tx = game("g1-ana", "ana", MatchResult::Win, 3);

    let first = h.engine.apply_transaction("ana", &tx).await.unwrap();
    let second = h.engine.apply_transaction("ana", &tx).await.unwrap();
    assert!(!first.already_applied);
    assert!(second.already_applied);
    assert_eq!(first.state, second.state);
    assert_eq!(first.state.total_score, 50);
    assert_eq!(h.store.count(keys::LEDGER_TRANSACTIONS), 1);
    assert_eq!(h.store.count(keys::BADGE_GRANTS), 1);

    let metrics = h.engine.metrics();
    assert_eq!(metrics.transactions_applied.get(), 1);
    assert_eq!(metrics.transactions_duplicate.get(), 1);
    assert_eq!(metrics.badges_granted.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn batch_with_duplicates_applies_each_transaction_once() {
    let h = harness(config());
    h.store.set_write_latency(Duration::from_millis(2));

    let mut batch: Vec<LedgerTransaction> = (0..60)
        .map(|i| game(&format!("g1-p{i}"), &format!("p{i}"), MatchResult::Draw, 0))
        .collect();
    // Same logical events resent later in the batch, landing in other groups.
    batch.extend((0..5).map(|i| game(&format!("g1-p{i}"), &format!("p{i}"), MatchResult::Draw, 0)));

    let results = h.engine.apply_batch("scheduler", batch).await.unwrap();
    assert_eq!(results.len(), 65);
    assert!(results.iter().all(|r| r.is_ok()));
    let duplicates = results
        .iter()
        .filter(|r| r.as_ref().is_ok_and(|receipt| receipt.already_applied))
        .count();
    assert_eq!(duplicates, 5);
    assert_eq!(h.store.count(keys::LEDGER_TRANSACTIONS), 60);
    assert_eq!(h.store.count(keys::PARTICIPANT_SCORES), 60);
}

#[tokio::test]
async fn batch_admission_is_rate_limited() {
    let h = harness(config());
    for i in 0..5 {
        let batch = vec![game(&format!("t{i}"), "ana", MatchResult::Loss, 0)];
        h.engine.apply_batch("coach", batch).await.unwrap();
    }
    let writes_before = h.store.count(keys::LEDGER_TRANSACTIONS);

    let err = h
        .engine
        .apply_batch("coach", vec![game("t5", "ana", MatchResult::Loss, 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RateLimited { .. }));
    assert!(!err.is_transient());
    assert_eq!(h.store.count(keys::LEDGER_TRANSACTIONS), writes_before);
    assert_eq!(h.engine.metrics().rate_limited.get(), 1);

    // A minute later the window has room again.
    h.clock.advance(61);
    h.engine
        .apply_batch("coach", vec![game("t5", "ana", MatchResult::Loss, 0)])
        .await
        .unwrap();
}

#[tokio::test]
async fn malformed_caller_is_rejected() {
    let h = harness(config());
    let err = h
        .engine
        .apply_transaction("a/b", &game("t1", "ana", MatchResult::Win, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn voting_round_trip() {
    let h = harness(config());
    let event = EventId::new("game-7");
    let players: Vec<ParticipantId> = ["ana", "bia", "caio"].map(ParticipantId::new).to_vec();
    h.engine
        .open_voting(&event, &players, Timestamp::new(SEPT_20 + DAY))
        .await
        .unwrap();

    let ana = ParticipantId::new("ana");
    let bia = ParticipantId::new("bia");
    let caio = ParticipantId::new("caio");
    h.engine.cast_vote(&ana, &event, &bia).await.unwrap();
    h.engine.cast_vote(&caio, &event, &bia).await.unwrap();
    let dup = h.engine.cast_vote(&ana, &event, &caio).await.unwrap_err();
    assert!(matches!(
        dup,
        EngineError::Voting(gamify_voting::VotingError::DuplicateVote { .. })
    ));

    let outcome = h.engine.conclude_voting("organizer", &event).await.unwrap();
    assert_eq!(outcome.winner, Some(bia.clone()));
    let again = h.engine.conclude_voting("organizer", &event).await.unwrap();
    assert!(again.already_concluded);
    assert_eq!(again.winner, Some(bia));

    assert_eq!(h.engine.metrics().votes_cast.get(), 2);
    assert_eq!(h.engine.metrics().votes_rejected.get(), 1);
}

#[tokio::test]
async fn season_closes_with_standings_from_applied_games() {
    let h = harness(config());
    let september = CompetitionPeriod::new(
        "monthly_2026_09",
        PeriodType::Monthly,
        NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
    )
    .unwrap();
    h.store
        .seed(keys::competition_period(&september.period_id), &september)
        .unwrap();

    let games = [
        ("g1-ana", "ana", MatchResult::Win),
        ("g1-bia", "bia", MatchResult::Loss),
        ("g2-ana", "ana", MatchResult::Draw),
        ("g2-bia", "bia", MatchResult::Draw),
    ];
    let batch = games
        .iter()
        .map(|(tx, p, result)| game(tx, p, *result, 1).with_period("monthly_2026_09"))
        .collect();
    let results = h.engine.apply_batch("scheduler", batch).await.unwrap();
    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|r| r.participation_updated)));

    // Not due yet.
    assert_eq!(h.engine.run_closure().await.unwrap().periods_closed, 0);

    h.clock.set(SEPT_20 + 26 * DAY); // 2026-10-16
    let report = h.engine.run_closure().await.unwrap();
    assert_eq!(report.periods_closed, 1);
    assert_eq!(report.standings_written, 2);
    assert_eq!(report.successors_created, 1);

    let period = PeriodId::new("monthly_2026_09");
    let ana: FinalStanding = decode(
        &h.store
            .doc(&keys::final_standing(&period, &ParticipantId::new("ana")))
            .unwrap(),
    )
    .unwrap();
    assert_eq!((ana.rank, ana.points, ana.wins, ana.draws), (1, 4, 1, 1));

    let closed: CompetitionPeriod =
        decode(&h.store.doc(&keys::competition_period(&period)).unwrap()).unwrap();
    assert_eq!(closed.closure_status, ClosureStatus::Closed);
    assert!(h
        .store
        .doc(&keys::competition_period(&PeriodId::new("monthly_2026_10")))
        .is_some());

    // Games sent after closure no longer move the frozen period.
    let late = game("g3-ana", "ana", MatchResult::Win, 0).with_period("monthly_2026_09");
    let receipt = h.engine.apply_transaction("ana", &late).await.unwrap();
    assert!(!receipt.participation_updated);
    assert_eq!(h.engine.metrics().periods_closed.get(), 1);
}

#[tokio::test]
async fn lmdb_backend_is_idempotent_across_restarts() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.store.backend = StoreBackend::Lmdb;
    config.store.data_dir = dir.path().to_path_buf();
    config.store.map_size_mb = 64;
    let tx = game("g1-ana", "ana", MatchResult::Win, 5);

    {
        let engine = Engine::open(config.clone()).unwrap();
        let first = engine.apply_transaction("ana", &tx).await.unwrap();
        let second = engine.apply_transaction("ana", &tx).await.unwrap();
        assert!(!first.already_applied);
        assert!(second.already_applied);
        assert_eq!(first.badges_granted, 3);
        assert_eq!(second.badges_granted, 0);
    }

    let engine = Engine::open(config).unwrap();
    let replay = engine.apply_transaction("ana", &tx).await.unwrap();
    assert!(replay.already_applied);
    assert_eq!(replay.state.total_score, 70);
    assert_eq!(replay.state.transactions_applied, 1);
}
