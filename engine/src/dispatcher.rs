//! Parallel batch dispatch of ledger transactions.
//!
//! A batch is split into fixed-size groups. Groups run as separate tasks,
//! at most `max_in_flight` at a time; transactions inside a group run one
//! after another. Every transaction gets its own result, in input order,
//! so one failure never fails the batch.

use std::sync::Arc;

use async_trait::async_trait;
use gamify_ledger::{ApplyReceipt, IdempotentProcessor, LedgerError};
use gamify_types::LedgerTransaction;
use tokio::sync::Semaphore;

use crate::config::DispatcherConfig;
use crate::limits::{RateLimiter, BATCH_APPLY};
use crate::metrics::EngineMetrics;
use crate::EngineError;

/// Applies one transaction. Implemented by the ledger processor.
#[async_trait]
pub trait TransactionApplier: Send + Sync {
    async fn apply(&self, tx: &LedgerTransaction) -> Result<ApplyReceipt, LedgerError>;
}

#[async_trait]
impl TransactionApplier for IdempotentProcessor {
    async fn apply(&self, tx: &LedgerTransaction) -> Result<ApplyReceipt, LedgerError> {
        IdempotentProcessor::apply(self, tx).await
    }
}

pub type ItemResult = Result<ApplyReceipt, EngineError>;

pub struct BatchDispatcher {
    applier: Arc<dyn TransactionApplier>,
    limiter: Arc<dyn RateLimiter>,
    config: DispatcherConfig,
    metrics: Arc<EngineMetrics>,
}

impl BatchDispatcher {
    pub fn new(
        applier: Arc<dyn TransactionApplier>,
        limiter: Arc<dyn RateLimiter>,
        config: DispatcherConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            applier,
            limiter,
            config,
            metrics,
        }
    }

    /// Apply every transaction of `batch` on behalf of `caller`.
    ///
    /// Admission is checked once, before anything is dispatched; a denial
    /// returns [`EngineError::RateLimited`] without touching the store.
    pub async fn apply_all(
        &self,
        caller: &str,
        batch: Vec<LedgerTransaction>,
    ) -> Result<Vec<ItemResult>, EngineError> {
        let decision = self.limiter.check(caller, BATCH_APPLY).await;
        if !decision.allowed {
            self.metrics.rate_limited.inc();
            return Err(EngineError::RateLimited {
                caller: caller.to_string(),
                operation: BATCH_APPLY.to_string(),
                retry_after_secs: decision.retry_after.map_or(0, |d| d.as_secs()),
            });
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let total = batch.len();
        let group_size = self.config.group_size.max(1);
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        self.metrics.batch_size.observe(total as f64);
        tracing::info!(
            caller,
            transactions = total,
            groups = total.div_ceil(group_size),
            max_in_flight = self.config.max_in_flight,
            "dispatching batch"
        );

        let mut tasks = Vec::with_capacity(total.div_ceil(group_size));
        for group in batch.chunks(group_size) {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EngineError::TaskFailed(e.to_string()))?;
            let group = group.to_vec();
            let applier = self.applier.clone();
            let metrics = self.metrics.clone();
            let len = group.len();
            let task = tokio::spawn(async move {
                let _permit = permit;
                metrics.dispatch_groups_in_flight.inc();
                let mut results = Vec::with_capacity(group.len());
                for tx in &group {
                    results.push(applier.apply(tx).await);
                }
                metrics.dispatch_groups_in_flight.dec();
                results
            });
            tasks.push((len, task));
        }

        let mut results = Vec::with_capacity(total);
        for (len, task) in tasks {
            match task.await {
                Ok(group) => {
                    results.extend(group.into_iter().map(|r| r.map_err(EngineError::from)))
                }
                Err(err) => {
                    self.metrics.dispatch_groups_in_flight.dec();
                    tracing::error!(error = %err, transactions = len, "dispatch group aborted");
                    results.extend((0..len).map(|_| Err(EngineError::TaskFailed(err.to_string()))));
                }
            }
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(caller, transactions = total, failed, "batch dispatched");
        Ok(results)
    }
}
