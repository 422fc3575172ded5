//! Fixed-cadence driver of the period-closure job.

use std::sync::Arc;
use std::time::Duration;

use gamify_season::{ClosureReport, PeriodClosureJob};
use tokio::time::MissedTickBehavior;

use crate::metrics::EngineMetrics;
use crate::shutdown::ShutdownSignal;

pub struct ClosureScheduler {
    job: Arc<PeriodClosureJob>,
    interval: Duration,
    metrics: Arc<EngineMetrics>,
}

impl ClosureScheduler {
    pub fn new(
        job: Arc<PeriodClosureJob>,
        interval: Duration,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            job,
            interval,
            metrics,
        }
    }

    /// Run the job now and then every `interval` until `shutdown` fires.
    ///
    /// Shutdown is only observed between runs. Failed runs are logged; the
    /// next tick picks up their backlog. Returns the number of runs.
    pub async fn run(&self, mut shutdown: ShutdownSignal) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs = 0;
        loop {
            tokio::select! {
                _ = shutdown.requested() => break,
                _ = ticker.tick() => {}
            }
            runs += 1;
            if let Err(err) = self.run_once().await {
                tracing::error!(run = runs, error = %err, "closure run failed");
            }
        }
        tracing::info!(runs, "closure scheduler stopped");
        runs
    }

    /// One closure run with metrics recorded.
    pub async fn run_once(&self) -> Result<ClosureReport, gamify_season::SeasonError> {
        let report = self.job.run().await?;
        self.metrics.periods_closed.inc_by(report.periods_closed as u64);
        self.metrics.standings_written.inc_by(report.standings_written as u64);
        self.metrics.closure_run_secs.observe(report.elapsed.as_secs_f64());
        if report.timed_out {
            self.metrics.closure_timeouts.inc();
        }
        Ok(report)
    }
}
