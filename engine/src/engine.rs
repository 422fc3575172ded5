//! The invocation surface: one method per capability, each taking plain
//! arguments plus the caller identity and returning a typed result.

use std::sync::Arc;

use gamify_ledger::{ApplyReceipt, IdempotentProcessor};
use gamify_nullables::NullStore;
use gamify_season::{ClosureReport, PeriodClosureJob};
use gamify_store::{DocumentStore, StoreError};
use gamify_store_lmdb::{LmdbDocumentStore, LmdbEnvironment};
use gamify_types::{
    validate_id, Clock, EventId, LedgerTransaction, ParticipantId, SystemClock, Timestamp,
    VoteTally, VotingEvent,
};
use gamify_voting::{ConcludeOutcome, TallyService, VotingError};

use crate::config::{EngineConfig, StoreBackend};
use crate::dispatcher::{BatchDispatcher, ItemResult};
use crate::limits::{
    RateLimiter, StoreRateLimiter, APPLY_TRANSACTION, CAST_VOTE, CONCLUDE_VOTING,
};
use crate::metrics::EngineMetrics;
use crate::scheduler::ClosureScheduler;
use crate::EngineError;

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn DocumentStore>,
    processor: Arc<IdempotentProcessor>,
    dispatcher: BatchDispatcher,
    tally: TallyService,
    closure: Arc<PeriodClosureJob>,
    limiter: Arc<dyn RateLimiter>,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    /// Open the configured store and wire every service to it.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let store = open_store(&config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = Arc::new(StoreRateLimiter::new(
            store.clone(),
            clock.clone(),
            config.rate_limits.clone(),
        ));
        Self::with_parts(config, store, clock, limiter)
    }

    /// Wire services around an existing store, clock and limiter.
    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, EngineError> {
        let retry = config.retry.policy();
        let metrics = Arc::new(EngineMetrics::new()?);
        let processor = Arc::new(IdempotentProcessor::new(
            store.clone(),
            retry.clone(),
            clock.clone(),
        ));
        let dispatcher = BatchDispatcher::new(
            processor.clone(),
            limiter.clone(),
            config.dispatcher.clone(),
            metrics.clone(),
        );
        let tally = TallyService::new(store.clone(), retry.clone(), clock.clone());
        let closure = Arc::new(PeriodClosureJob::new(
            store.clone(),
            retry,
            clock,
            config.closure.job_config(),
        ));
        Ok(Self {
            config,
            store,
            processor,
            dispatcher,
            tally,
            closure,
            limiter,
            metrics,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub async fn apply_transaction(
        &self,
        caller: &str,
        tx: &LedgerTransaction,
    ) -> Result<ApplyReceipt, EngineError> {
        self.admit(caller, APPLY_TRANSACTION).await?;
        match self.processor.apply(tx).await {
            Ok(receipt) => {
                self.record_receipt(&receipt);
                Ok(receipt)
            }
            Err(err) => {
                self.metrics.transactions_failed.inc();
                Err(err.into())
            }
        }
    }

    /// Apply a batch; each transaction gets its own result, in order.
    pub async fn apply_batch(
        &self,
        caller: &str,
        batch: Vec<LedgerTransaction>,
    ) -> Result<Vec<ItemResult>, EngineError> {
        validate_id("caller", caller)?;
        let results = self.dispatcher.apply_all(caller, batch).await?;
        for result in &results {
            match result {
                Ok(receipt) => self.record_receipt(receipt),
                Err(_) => self.metrics.transactions_failed.inc(),
            }
        }
        Ok(results)
    }

    pub async fn open_voting(
        &self,
        event: &EventId,
        participants: &[ParticipantId],
        closes_at: Timestamp,
    ) -> Result<VotingEvent, EngineError> {
        Ok(self.tally.open_voting(event, participants, closes_at).await?)
    }

    /// Cast `voter`'s vote. The voter is the caller.
    pub async fn cast_vote(
        &self,
        voter: &ParticipantId,
        event: &EventId,
        candidate: &ParticipantId,
    ) -> Result<VoteTally, EngineError> {
        self.admit(voter.as_str(), CAST_VOTE).await?;
        let result = self.tally.cast_vote(event, voter, candidate).await;
        match &result {
            Ok(_) => self.metrics.votes_cast.inc(),
            Err(
                VotingError::DuplicateVote { .. }
                | VotingError::NotEligible { .. }
                | VotingError::SelfVote
                | VotingError::VotingClosed(_),
            ) => self.metrics.votes_rejected.inc(),
            Err(_) => {}
        }
        Ok(result?)
    }

    pub async fn conclude_voting(
        &self,
        caller: &str,
        event: &EventId,
    ) -> Result<ConcludeOutcome, EngineError> {
        self.admit(caller, CONCLUDE_VOTING).await?;
        Ok(self.tally.conclude_voting(event).await?)
    }

    /// One closure run, outside the schedule.
    pub async fn run_closure(&self) -> Result<ClosureReport, EngineError> {
        Ok(self.scheduler().run_once().await?)
    }

    pub fn scheduler(&self) -> ClosureScheduler {
        ClosureScheduler::new(
            self.closure.clone(),
            self.config.closure.interval(),
            self.metrics.clone(),
        )
    }

    async fn admit(&self, caller: &str, operation: &str) -> Result<(), EngineError> {
        validate_id("caller", caller)?;
        let decision = self.limiter.check(caller, operation).await;
        if decision.allowed {
            return Ok(());
        }
        self.metrics.rate_limited.inc();
        Err(EngineError::RateLimited {
            caller: caller.to_string(),
            operation: operation.to_string(),
            retry_after_secs: decision.retry_after.map_or(0, |d| d.as_secs()),
        })
    }

    fn record_receipt(&self, receipt: &ApplyReceipt) {
        if receipt.already_applied {
            self.metrics.transactions_duplicate.inc();
        } else {
            self.metrics.transactions_applied.inc();
        }
        self.metrics.badges_granted.inc_by(receipt.badges_granted as u64);
    }
}

fn open_store(config: &EngineConfig) -> Result<Arc<dyn DocumentStore>, EngineError> {
    let ceiling = config.store.batch_ceiling;
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; state is lost on exit");
            Ok(Arc::new(NullStore::with_ceiling(ceiling)))
        }
        StoreBackend::Lmdb => {
            let map_size = config.store.map_size_mb.saturating_mul(1024 * 1024);
            let env = LmdbEnvironment::open(&config.store.data_dir, map_size)
                .map_err(StoreError::from)?;
            tracing::info!(
                data_dir = %config.store.data_dir.display(),
                map_size_mb = config.store.map_size_mb,
                batch_ceiling = ceiling,
                "opened LMDB store"
            );
            Ok(Arc::new(LmdbDocumentStore::with_ceiling(env, ceiling)))
        }
    }
}
