//! Prometheus metrics for the engine.
//!
//! [`EngineMetrics`] owns a dedicated [`Registry`]; [`EngineMetrics::encode`]
//! renders it in the Prometheus text exposition format for whatever outer
//! layer exposes it.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::EngineError;

pub struct EngineMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Transactions recorded for the first time.
    pub transactions_applied: IntCounter,
    /// Replays answered from the existing record.
    pub transactions_duplicate: IntCounter,
    pub transactions_failed: IntCounter,
    pub badges_granted: IntCounter,
    pub votes_cast: IntCounter,
    pub votes_rejected: IntCounter,
    /// Requests refused before any work started.
    pub rate_limited: IntCounter,
    pub periods_closed: IntCounter,
    pub standings_written: IntCounter,
    /// Closure runs that stopped on their time budget.
    pub closure_timeouts: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Dispatcher groups currently processing.
    pub dispatch_groups_in_flight: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub batch_size: Histogram,
    pub closure_run_secs: Histogram,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, EngineError> {
        let registry = Registry::new();

        let transactions_applied = register_int_counter_with_registry!(
            Opts::new(
                "gamify_transactions_applied_total",
                "Ledger transactions recorded"
            ),
            registry
        )?;
        let transactions_duplicate = register_int_counter_with_registry!(
            Opts::new(
                "gamify_transactions_duplicate_total",
                "Ledger transactions that had already been applied"
            ),
            registry
        )?;
        let transactions_failed = register_int_counter_with_registry!(
            Opts::new(
                "gamify_transactions_failed_total",
                "Ledger transactions that failed"
            ),
            registry
        )?;
        let badges_granted = register_int_counter_with_registry!(
            Opts::new("gamify_badges_granted_total", "Badge grants created"),
            registry
        )?;
        let votes_cast = register_int_counter_with_registry!(
            Opts::new("gamify_votes_cast_total", "Votes accepted"),
            registry
        )?;
        let votes_rejected = register_int_counter_with_registry!(
            Opts::new(
                "gamify_votes_rejected_total",
                "Votes rejected as duplicate, ineligible or late"
            ),
            registry
        )?;
        let rate_limited = register_int_counter_with_registry!(
            Opts::new(
                "gamify_rate_limited_total",
                "Requests denied by admission control"
            ),
            registry
        )?;
        let periods_closed = register_int_counter_with_registry!(
            Opts::new("gamify_periods_closed_total", "Competition periods closed"),
            registry
        )?;
        let standings_written = register_int_counter_with_registry!(
            Opts::new(
                "gamify_standings_written_total",
                "Final standings written"
            ),
            registry
        )?;
        let closure_timeouts = register_int_counter_with_registry!(
            Opts::new(
                "gamify_closure_timeouts_total",
                "Closure runs stopped by their time budget"
            ),
            registry
        )?;

        let dispatch_groups_in_flight = register_int_gauge_with_registry!(
            Opts::new(
                "gamify_dispatch_groups_in_flight",
                "Dispatcher groups currently processing"
            ),
            registry
        )?;

        let batch_size = register_histogram_with_registry!(
            HistogramOpts::new(
                "gamify_batch_size",
                "Transactions per dispatched batch"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 12)?),
            registry
        )?;
        let closure_run_secs = register_histogram_with_registry!(
            HistogramOpts::new(
                "gamify_closure_run_seconds",
                "Wall-clock duration of closure runs"
            )
            .buckets(prometheus::exponential_buckets(0.5, 2.0, 12)?),
            registry
        )?;

        Ok(Self {
            registry,
            transactions_applied,
            transactions_duplicate,
            transactions_failed,
            badges_granted,
            votes_cast,
            votes_rejected,
            rate_limited,
            periods_closed,
            standings_written,
            closure_timeouts,
            dispatch_groups_in_flight,
            batch_size,
            closure_run_secs,
        })
    }

    /// Render every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, EngineError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| EngineError::Config(format!("metrics encoding: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_encodes() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.transactions_applied.inc_by(3);
        metrics.batch_size.observe(120.0);
        let text = metrics.encode().unwrap();
        assert!(text.contains("gamify_transactions_applied_total 3"));
        assert!(text.contains("gamify_batch_size_bucket"));
    }

    #[test]
    fn instances_do_not_share_registries() {
        let a = EngineMetrics::new().unwrap();
        let b = EngineMetrics::new().unwrap();
        a.votes_cast.inc();
        assert_eq!(b.votes_cast.get(), 0);
    }
}
