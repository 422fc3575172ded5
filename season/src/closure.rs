//! Resumable period-closure job.
//!
//! Per run: scan, then for each due period deactivate it, snapshot its
//! standings in chunks, create its successor and mark it closed. The time
//! budget is checked before every unit of work; when it trips the job
//! stops at a chunk boundary, so nothing is ever left staged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use gamify_store::{
    keys, transact, BatchCommitCoordinator, CommitReport, Direction, DocumentStore, FilterOp,
    Query, StoreError, Transaction, Write,
};
use gamify_types::{
    ClosureStatus, Clock, CompetitionPeriod, FinalStanding, PeriodId, SeasonParticipation,
    Timestamp,
};
use gamify_utils::{format_duration, ErrorClass, RetryPolicy};
use tokio::time::Instant;

use crate::{calendar, SeasonError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosureConfig {
    /// Wall-clock limit of one run.
    pub time_budget: Duration,
    /// Part of the budget kept free for the final commit and summary.
    pub cleanup_reserve: Duration,
    /// Standings per committed chunk.
    pub chunk_size: usize,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(540),
            cleanup_reserve: Duration::from_secs(30),
            chunk_size: 100,
        }
    }
}

/// Summary of one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClosureReport {
    pub periods_closed: usize,
    /// Due periods left for the next run.
    pub periods_remaining: usize,
    pub standings_written: usize,
    /// Standings that a previous or concurrent run had already written.
    pub standings_existing: usize,
    pub successors_created: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

enum Progress {
    Done,
    OutOfTime,
}

struct Budget {
    started: Instant,
    deadline: Instant,
}

impl Budget {
    fn start(config: &ClosureConfig) -> Self {
        let started = Instant::now();
        let usable = config.time_budget.saturating_sub(config.cleanup_reserve);
        Self {
            started,
            deadline: started + usable,
        }
    }

    fn exhausted(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

pub struct PeriodClosureJob {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    config: ClosureConfig,
}

impl PeriodClosureJob {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
        config: ClosureConfig,
    ) -> Self {
        Self {
            store,
            retry,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ClosureConfig {
        &self.config
    }

    /// Close every due period the budget allows.
    ///
    /// Safe to run more often than scheduled and concurrently with itself:
    /// every write is either gated by a transactional status check or a
    /// create-if-absent on a deterministic key.
    pub async fn run(&self) -> Result<ClosureReport, SeasonError> {
        let budget = Budget::start(&self.config);
        let today = self.clock.now().utc_date();
        let due = self.scan(today).await?;
        let mut report = ClosureReport::default();

        for (index, period) in due.iter().enumerate() {
            match self.close_period(period, &budget, &mut report).await? {
                Progress::Done => report.periods_closed += 1,
                Progress::OutOfTime => {
                    report.timed_out = true;
                    report.periods_remaining = due.len() - index;
                    break;
                }
            }
        }
        report.elapsed = budget.elapsed();

        if report.timed_out {
            tracing::warn!(
                periods_closed = report.periods_closed,
                periods_remaining = report.periods_remaining,
                standings_written = report.standings_written,
                elapsed = %format_duration(report.elapsed),
                "closure budget exhausted, remaining periods left for next run"
            );
        } else {
            tracing::info!(
                periods_closed = report.periods_closed,
                standings_written = report.standings_written,
                standings_existing = report.standings_existing,
                successors_created = report.successors_created,
                elapsed = %format_duration(report.elapsed),
                "closure run complete"
            );
        }
        Ok(report)
    }

    /// Active periods that ended before `today`, plus periods a previous
    /// run left half-closed. Ordered by end date, then id.
    pub async fn scan(&self, today: NaiveDate) -> Result<Vec<CompetitionPeriod>, SeasonError> {
        let past_due = Query::new(keys::COMPETITION_PERIODS)
            .where_eq("is_active", true)
            .filter("end_date", FilterOp::Lt, today.to_string())
            .order_by("end_date", Direction::Asc);
        let closing = Query::new(keys::COMPETITION_PERIODS)
            .where_eq("closure_status", "closing")
            .order_by("end_date", Direction::Asc);

        let mut found: BTreeMap<(NaiveDate, PeriodId), CompetitionPeriod> = BTreeMap::new();
        for query in [&past_due, &closing] {
            let hits = self
                .retry
                .execute(
                    "scan_periods",
                    || self.store.query(query),
                    |e: &StoreError| ErrorClass::from_transient(e.is_transient()),
                )
                .await?;
            for hit in hits {
                let period: CompetitionPeriod = hit.decode()?;
                found.insert((period.end_date, period.period_id.clone()), period);
            }
        }
        Ok(found.into_values().collect())
    }

    async fn close_period(
        &self,
        period: &CompetitionPeriod,
        budget: &Budget,
        report: &mut ClosureReport,
    ) -> Result<Progress, SeasonError> {
        if budget.exhausted() {
            return Ok(Progress::OutOfTime);
        }
        if period.closure_status == ClosureStatus::Open {
            self.transition(&period.period_id, ClosureStatus::Closing)
                .await?;
            tracing::debug!(period = %period.period_id, "period deactivated");
        }

        let standings = self.rank(&period.period_id).await?;
        let mut batch =
            BatchCommitCoordinator::with_ceiling(self.store.as_ref(), self.config.chunk_size)
                .with_retry(self.retry.clone());
        let frozen_at = self.clock.now();
        let mut out_of_time = false;
        for chunk in standings.chunks(batch.ceiling()) {
            if budget.exhausted() {
                out_of_time = true;
                break;
            }
            for (rank, participation) in chunk {
                let standing = FinalStanding::freeze(participation, *rank, frozen_at);
                batch.stage(Write::create_if_absent(
                    keys::final_standing(&period.period_id, &participation.participant_id),
                    gamify_store::encode(&standing)?,
                ));
            }
            batch.flush_remaining().await?;
        }
        record_standings(report, batch.report());
        if out_of_time || budget.exhausted() {
            return Ok(Progress::OutOfTime);
        }

        if let Some(next) = calendar::successor(period)? {
            if self.create_successor(&next).await? {
                report.successors_created += 1;
                tracing::info!(
                    period = %period.period_id,
                    successor = %next.period_id,
                    start = %next.start_date,
                    end = %next.end_date,
                    "successor period created"
                );
            }
        }

        self.transition(&period.period_id, ClosureStatus::Closed)
            .await?;
        tracing::info!(
            period = %period.period_id,
            participants = standings.len(),
            "period closed"
        );
        Ok(Progress::Done)
    }

    /// Participations of a period in final order: points desc, wins desc,
    /// participant id asc. Ranks start at 1.
    async fn rank(
        &self,
        period: &PeriodId,
    ) -> Result<Vec<(u32, SeasonParticipation)>, SeasonError> {
        let query = Query::new(keys::SEASON_PARTICIPATION).where_eq("period_id", period.as_str());
        let hits = self
            .retry
            .execute(
                "load_participation",
                || self.store.query(&query),
                |e: &StoreError| ErrorClass::from_transient(e.is_transient()),
            )
            .await?;
        let mut rows = hits
            .iter()
            .map(|hit| hit.decode::<SeasonParticipation>())
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then(b.wins.cmp(&a.wins))
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| (i as u32 + 1, row))
            .collect())
    }

    async fn transition(&self, period: &PeriodId, to: ClosureStatus) -> Result<(), SeasonError> {
        self.retry
            .execute(
                "transition_period",
                || self.transition_once(period, to),
                |e: &SeasonError| ErrorClass::from_transient(e.is_transient()),
            )
            .await
    }

    async fn transition_once(
        &self,
        period: &PeriodId,
        to: ClosureStatus,
    ) -> Result<(), SeasonError> {
        let now = self.clock.now();
        transact(self.store.as_ref(), |txn| transition_in_txn(txn, period, to, now)).await
    }

    /// Returns whether the successor was created by this call.
    async fn create_successor(&self, next: &CompetitionPeriod) -> Result<bool, SeasonError> {
        let key = keys::competition_period(&next.period_id);
        let doc = gamify_store::encode(next)?;
        let outcome = self
            .retry
            .execute(
                "create_successor",
                || self.store.write(Write::create_if_absent(key.clone(), doc.clone())),
                |e: &StoreError| ErrorClass::from_transient(e.is_transient()),
            )
            .await?;
        Ok(outcome.applied == 1)
    }
}

fn transition_in_txn(
    txn: &mut dyn Transaction,
    period_id: &PeriodId,
    to: ClosureStatus,
    now: Timestamp,
) -> Result<(), SeasonError> {
    let key = keys::competition_period(period_id);
    let Some(mut period) = txn.get_as::<CompetitionPeriod>(&key)? else {
        return Err(StoreError::NotFound(key.path()).into());
    };
    if period.closure_status >= to {
        return Ok(());
    }
    period.is_active = false;
    period.closure_status = to;
    if to == ClosureStatus::Closed {
        period.closed_at = Some(now);
    }
    txn.set_as(key, &period)?;
    Ok(())
}

fn record_standings(report: &mut ClosureReport, commits: CommitReport) {
    report.standings_written += commits.applied;
    report.standings_existing += commits.skipped;
}
