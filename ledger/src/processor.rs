//! Exactly-once application of ledger transactions.
//!
//! The existence check on the ledger record and the writes of the record,
//! the new score state and the period participation all happen inside one
//! store transaction, so no observer sees a half-applied transaction and a
//! replay finds the record and changes nothing. That whole unit is what the
//! backoff executor retries.
//!
//! Badges are granted afterwards with create-if-absent writes. A replay
//! re-issues them from the recorded post-transaction state, which repairs
//! a crash between the two steps.

use std::collections::BTreeSet;
use std::sync::Arc;

use gamify_badges::BadgeSnapshot;
use gamify_store::{
    encode, keys, transact, BatchCommitCoordinator, DocumentStore, Transaction, Write,
};
use gamify_types::{
    BadgeGrant, BadgeId, Clock, CompetitionPeriod, LedgerTransaction, MatchPerformance,
    ParticipantId, ParticipantScoreState, SeasonParticipation, Timestamp, TransactionId,
};
use gamify_utils::{ErrorClass, RetryPolicy};

use crate::{scoring, LedgerError, LedgerRecord};

/// Breakdown totals may differ from `amount` by this much without a warning.
pub const BREAKDOWN_TOLERANCE: i64 = 5;

/// Outcome of [`IdempotentProcessor::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyReceipt {
    /// Current participant state.
    pub state: ParticipantScoreState,
    /// The transaction had been recorded before; nothing changed.
    pub already_applied: bool,
    /// Badges the post-transaction state qualifies for.
    pub badges: BTreeSet<BadgeId>,
    /// Badge grants created by this call.
    pub badges_granted: usize,
    pub participation_updated: bool,
}

/// Result of the atomic read-check-write.
struct Applied {
    state: ParticipantScoreState,
    already_applied: bool,
    badge_basis: ParticipantScoreState,
    performance: Option<MatchPerformance>,
    participation_updated: bool,
}

pub struct IdempotentProcessor {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl IdempotentProcessor {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            retry,
            clock,
        }
    }

    /// Apply `tx` at most once and grant any badges it unlocks.
    pub async fn apply(&self, tx: &LedgerTransaction) -> Result<ApplyReceipt, LedgerError> {
        tx.validate()?;
        let drift = tx.breakdown_drift();
        if drift > BREAKDOWN_TOLERANCE {
            tracing::warn!(
                participant = %tx.participant_id,
                transaction = %tx.transaction_id,
                amount = tx.amount,
                drift,
                "breakdown does not add up to amount"
            );
        }

        let applied = self
            .retry
            .execute(
                "apply_transaction",
                || self.apply_once(tx),
                |e: &LedgerError| ErrorClass::from_transient(e.is_transient()),
            )
            .await?;

        let badges = gamify_badges::evaluate(&BadgeSnapshot::new(
            &applied.badge_basis,
            applied.performance.as_ref(),
        ));
        let badges_granted = self
            .grant_badges(&tx.participant_id, &tx.transaction_id, &badges)
            .await?;

        if applied.already_applied {
            tracing::debug!(
                participant = %tx.participant_id,
                transaction = %tx.transaction_id,
                badges_granted,
                "transaction already applied"
            );
        } else {
            tracing::info!(
                participant = %tx.participant_id,
                transaction = %tx.transaction_id,
                amount = tx.amount,
                total_score = applied.state.total_score,
                level = applied.state.level,
                badges_granted,
                "transaction applied"
            );
        }
        if !applied.participation_updated {
            if let (Some(period), Some(_)) = (&tx.period_id, tx.performance()) {
                tracing::debug!(period = %period, "period not open, participation unchanged");
            }
        }

        Ok(ApplyReceipt {
            state: applied.state,
            already_applied: applied.already_applied,
            badges,
            badges_granted,
            participation_updated: applied.participation_updated,
        })
    }

    /// Create a grant for each badge unless one already exists.
    /// Returns how many grants were created.
    pub async fn grant_badges(
        &self,
        participant: &ParticipantId,
        source: &TransactionId,
        badges: &BTreeSet<BadgeId>,
    ) -> Result<usize, LedgerError> {
        if badges.is_empty() {
            return Ok(0);
        }
        let granted_at = self.clock.now();
        let mut batch =
            BatchCommitCoordinator::new(self.store.as_ref()).with_retry(self.retry.clone());
        for badge in badges {
            let grant = BadgeGrant {
                participant_id: participant.clone(),
                badge_id: *badge,
                granted_at,
                source_transaction: source.clone(),
            };
            batch.stage(Write::create_if_absent(
                keys::badge_grant(participant, *badge),
                encode(&grant)?,
            ));
            batch.flush_if_full().await?;
        }
        let report = batch.flush_remaining().await?;
        Ok(report.applied)
    }

    /// Current state of a participant, if any transaction was applied.
    pub async fn score_state(
        &self,
        participant: &ParticipantId,
    ) -> Result<Option<ParticipantScoreState>, LedgerError> {
        participant.validate()?;
        let doc = self.store.get(&keys::participant_score(participant)).await?;
        Ok(doc.map(|d| gamify_store::decode(&d)).transpose()?)
    }

    /// The recorded audit entry of a transaction.
    pub async fn ledger_record(
        &self,
        participant: &ParticipantId,
        transaction: &TransactionId,
    ) -> Result<Option<LedgerRecord>, LedgerError> {
        participant.validate()?;
        transaction.validate()?;
        let doc = self
            .store
            .get(&keys::ledger_transaction(participant, transaction))
            .await?;
        Ok(doc.map(|d| gamify_store::decode(&d)).transpose()?)
    }

    async fn apply_once(&self, tx: &LedgerTransaction) -> Result<Applied, LedgerError> {
        let now = self.clock.now();
        transact(self.store.as_ref(), |txn| apply_in_txn(txn, tx, now)).await
    }
}

fn apply_in_txn(
    txn: &mut dyn Transaction,
    tx: &LedgerTransaction,
    now: Timestamp,
) -> Result<Applied, LedgerError> {
    let participant = &tx.participant_id;
    let ledger_key = keys::ledger_transaction(participant, &tx.transaction_id);
    let score_key = keys::participant_score(participant);

    if let Some(record) = txn.get_as::<LedgerRecord>(&ledger_key)? {
        let current = txn
            .get_as::<ParticipantScoreState>(&score_key)?
            .unwrap_or_else(|| record.state_after.clone());
        return Ok(Applied {
            state: current,
            already_applied: true,
            performance: record.transaction.performance().cloned(),
            badge_basis: record.state_after,
            participation_updated: false,
        });
    }

    let prior = txn
        .get_as::<ParticipantScoreState>(&score_key)?
        .unwrap_or_else(|| ParticipantScoreState::new(participant.clone()));
    let next = scoring::next_state(&prior, tx, now);

    let record = LedgerRecord {
        transaction: tx.clone(),
        score_before: prior.total_score,
        level_before: prior.level,
        state_after: next.clone(),
        recorded_at: now,
    };
    txn.set_as(ledger_key, &record)?;
    txn.set_as(score_key, &next)?;

    let mut participation_updated = false;
    if let (Some(period_id), Some(perf)) = (&tx.period_id, tx.performance()) {
        let period = txn.get_as::<CompetitionPeriod>(&keys::competition_period(period_id))?;
        if period.is_some_and(|p| p.is_active) {
            let key = keys::season_participation(period_id, participant);
            let prior = txn
                .get_as::<SeasonParticipation>(&key)?
                .unwrap_or_else(|| {
                    SeasonParticipation::new(period_id.clone(), participant.clone())
                });
            txn.set_as(key, &scoring::next_participation(&prior, perf))?;
            participation_updated = true;
        }
    }

    Ok(Applied {
        state: next.clone(),
        already_applied: false,
        badge_basis: next,
        performance: tx.performance().cloned(),
        participation_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gamify_nullables::{FaultScope, NullClock, NullStore};
    use gamify_store::StoreError;
    use gamify_types::{
        Activity, MatchResult, PeriodId, PeriodType, Position, ValidationError,
    };
    use std::time::Duration;

    fn fixture() -> (Arc<NullStore>, IdempotentProcessor) {
        let store = Arc::new(NullStore::new());
        let retry = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        let processor =
            IdempotentProcessor::new(store.clone(), retry, Arc::new(NullClock::new(1_000)));
        (store, processor)
    }

    fn goals(n: u32) -> Activity {
        Activity::Match(MatchPerformance::new(Position::Field, MatchResult::Win).with_goals(n))
    }

    fn tx(id: &str, amount: i64) -> LedgerTransaction {
        LedgerTransaction::new(id, "p1", amount, goals(0), Timestamp::new(900))
    }

    fn p1() -> ParticipantId {
        ParticipantId::new("p1")
    }

    fn active_period(store: &NullStore, id: &str, active: bool) {
        let start = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 10, 31).unwrap();
        let mut period = CompetitionPeriod::new(id, PeriodType::Monthly, start, end).unwrap();
        period.is_active = active;
        store
            .seed(keys::competition_period(&PeriodId::new(id)), &period)
            .unwrap();
    }

    #[tokio::test]
    async fn replay_changes_nothing() {
        let (store, processor) = fixture();
        let first = processor.apply(&tx("t1", 120)).await.unwrap();
        assert!(!first.already_applied);
        assert_eq!(first.state.total_score, 120);
        assert_eq!(first.state.level, 1);

        let second = processor.apply(&tx("t1", 120)).await.unwrap();
        assert!(second.already_applied);
        assert_eq!(second.state, first.state);
        assert_eq!(store.count(keys::LEDGER_TRANSACTIONS), 1);

        let record = processor
            .ledger_record(&p1(), &TransactionId::new("t1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.score_before, 0);
        assert_eq!(record.state_after, first.state);
    }

    #[tokio::test]
    async fn distinct_transactions_accumulate() {
        let (_store, processor) = fixture();
        processor.apply(&tx("t1", 80)).await.unwrap();
        let receipt = processor.apply(&tx("t2", 40)).await.unwrap();
        assert_eq!(receipt.state.total_score, 120);
        assert_eq!(receipt.state.transactions_applied, 2);
        assert_eq!(receipt.state.games_played, 2);
    }

    #[tokio::test]
    async fn negative_amounts_floor_at_zero() {
        let (_store, processor) = fixture();
        processor.apply(&tx("t1", 30)).await.unwrap();
        let penalty = LedgerTransaction::new("t2", "p1", -100, Activity::NoShow, Timestamp::new(5));
        let receipt = processor.apply(&penalty).await.unwrap();
        assert_eq!(receipt.state.total_score, 0);
        assert_eq!(receipt.state.current_streak, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_duplicates_apply_once() {
        let (store, processor) = fixture();
        store.set_write_latency(Duration::from_millis(5));
        let processor = Arc::new(processor);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let processor = processor.clone();
                tokio::spawn(async move { processor.apply(&tx("dup", 50)).await })
            })
            .collect();
        let mut fresh = 0;
        for handle in handles {
            let receipt = handle.await.unwrap().unwrap();
            if !receipt.already_applied {
                fresh += 1;
            }
            assert_eq!(receipt.state.total_score, 50);
        }

        assert_eq!(fresh, 1);
        assert_eq!(store.count(keys::LEDGER_TRANSACTIONS), 1);
        let state = processor.score_state(&p1()).await.unwrap().unwrap();
        assert_eq!(state.transactions_applied, 1);
        assert!(store.conflicts() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_qualifying_transactions_grant_each_badge_once() {
        let (store, processor) = fixture();
        store.set_write_latency(Duration::from_millis(5));
        let processor = Arc::new(processor);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let processor = processor.clone();
                let tx = LedgerTransaction::new(
                    format!("g{i}"),
                    "p1",
                    40,
                    goals(3),
                    Timestamp::new(900),
                );
                tokio::spawn(async move { processor.apply(&tx).await })
            })
            .collect();
        let mut granted = 0;
        let mut seen = BTreeSet::new();
        for handle in handles {
            let receipt = handle.await.unwrap().unwrap();
            assert!(receipt.badges.contains(&BadgeId::HatTrick));
            granted += receipt.badges_granted;
            seen.extend(receipt.badges);
        }

        // Eight games in a row also unlock the seven-game streak.
        assert_eq!(seen, BTreeSet::from([BadgeId::HatTrick, BadgeId::Streak7]));
        assert_eq!(granted, seen.len());
        assert_eq!(store.count(keys::BADGE_GRANTS), seen.len());
        assert!(store
            .doc(&keys::badge_grant(&p1(), BadgeId::HatTrick))
            .is_some());
    }

    #[tokio::test]
    async fn milestones_are_recorded_once() {
        let (_store, processor) = fixture();
        let first = tx("t1", 10)
            .with_milestone("first_goal")
            .with_milestone("ten_games");
        processor.apply(&first).await.unwrap();
        let replay = processor.apply(&first).await.unwrap();
        assert!(replay.already_applied);

        let again = tx("t2", 10).with_milestone("first_goal");
        let receipt = processor.apply(&again).await.unwrap();
        assert_eq!(
            receipt.state.milestones_achieved,
            BTreeSet::from(["first_goal".to_string(), "ten_games".to_string()])
        );
        let stored = processor.score_state(&p1()).await.unwrap().unwrap();
        assert_eq!(stored.milestones_achieved.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_distinct_transactions_all_land() {
        let (store, processor) = fixture();
        store.set_write_latency(Duration::from_millis(5));
        let processor = Arc::new(processor);

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let processor = processor.clone();
                tokio::spawn(async move { processor.apply(&tx(&format!("t{i}"), 10)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = processor.score_state(&p1()).await.unwrap().unwrap();
        assert_eq!(state.total_score, 60);
        assert_eq!(state.transactions_applied, 6);
        assert_eq!(store.count(keys::LEDGER_TRANSACTIONS), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let (store, processor) = fixture();
        store.fail_next(2, FaultScope::Any, StoreError::Unavailable("blip".into()));

        let receipt = processor.apply(&tx("t1", 25)).await.unwrap();
        assert!(!receipt.already_applied);
        assert_eq!(store.count(keys::LEDGER_TRANSACTIONS), 1);
        assert_eq!(store.transactions_committed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let (store, processor) = fixture();
        store.fail_next(1, FaultScope::Any, StoreError::PermissionDenied("rules".into()));

        let err = processor.apply(&tx("t1", 25)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Storage(StoreError::PermissionDenied(_))
        ));
        assert_eq!(store.transaction_runs(), 0);
        assert!(processor.score_state(&p1()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_transaction_never_reaches_the_store() {
        let (store, processor) = fixture();
        let err = processor.apply(&tx("t1", 501)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::AmountOutOfRange { .. })
        ));
        let err = processor.apply(&tx("a/b", 10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let overflowing = tx("t2", 10)
            .with_breakdown("a", i64::MAX)
            .with_breakdown("b", 1);
        let err = processor.apply(&overflowing).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::BreakdownOutOfRange { .. })
        ));
        assert_eq!(store.transaction_runs(), 0);
    }

    #[tokio::test]
    async fn badges_are_granted_once() {
        let (store, processor) = fixture();
        let hat_trick = LedgerTransaction::new("t1", "p1", 60, goals(5), Timestamp::new(1));

        let receipt = processor.apply(&hat_trick).await.unwrap();
        assert!(receipt.badges.contains(&BadgeId::HatTrick));
        assert!(receipt.badges.contains(&BadgeId::Poker));
        assert!(receipt.badges.contains(&BadgeId::Manita));
        assert_eq!(receipt.badges_granted, receipt.badges.len());

        let replay = processor.apply(&hat_trick).await.unwrap();
        assert_eq!(replay.badges, receipt.badges);
        assert_eq!(replay.badges_granted, 0);
        assert_eq!(store.count(keys::BADGE_GRANTS), receipt.badges.len());
    }

    #[tokio::test]
    async fn replay_repairs_missing_badges() {
        let (store, processor) = fixture();
        let hat_trick = LedgerTransaction::new("t1", "p1", 60, goals(3), Timestamp::new(1));
        let state_after = scoring::next_state(
            &ParticipantScoreState::new(p1()),
            &hat_trick,
            Timestamp::new(1),
        );
        // Atomic step committed, badge step never ran.
        store
            .seed(
                keys::ledger_transaction(&p1(), &TransactionId::new("t1")),
                &LedgerRecord {
                    transaction: hat_trick.clone(),
                    score_before: 0,
                    level_before: 0,
                    state_after: state_after.clone(),
                    recorded_at: Timestamp::new(1),
                },
            )
            .unwrap();
        store
            .seed(keys::participant_score(&p1()), &state_after)
            .unwrap();

        let receipt = processor.apply(&hat_trick).await.unwrap();
        assert!(receipt.already_applied);
        assert_eq!(receipt.badges_granted, 1);
        assert!(store
            .doc(&keys::badge_grant(&p1(), BadgeId::HatTrick))
            .is_some());
    }

    #[tokio::test]
    async fn participation_tracks_only_active_periods() {
        let (store, processor) = fixture();
        active_period(&store, "monthly_2026_10", true);
        active_period(&store, "monthly_2026_09", false);

        let open = tx("t1", 30).with_period("monthly_2026_10");
        assert!(processor.apply(&open).await.unwrap().participation_updated);
        let closed = tx("t2", 30).with_period("monthly_2026_09");
        assert!(!processor.apply(&closed).await.unwrap().participation_updated);

        let key = keys::season_participation(&PeriodId::new("monthly_2026_10"), &p1());
        let participation: SeasonParticipation =
            gamify_store::decode(&store.doc(&key).unwrap()).unwrap();
        assert_eq!(participation.points, 3);
        assert_eq!(participation.wins, 1);
        assert_eq!(store.count(keys::SEASON_PARTICIPATION), 1);
    }
}
