//! Batch commit coordination.
//!
//! Groups staged writes into chunks no larger than the store's batch
//! ceiling and commits them in staging order, amortising round trips.
//!
//! # Usage
//!
//! ```ignore
//! let mut batch = BatchCommitCoordinator::new(&store);
//! for grant in grants {
//!     batch.stage(Write::create_if_absent(key, doc));
//!     batch.flush_if_full().await?;
//! }
//! let report = batch.flush_remaining().await?;
//! ```
//!
//! There is no rollback across chunks: if chunk `k` fails, chunks before it
//! stay committed and chunk `k` onwards stay staged.

use gamify_utils::{ErrorClass, RetryPolicy};

use crate::{DocumentStore, StoreError, Write};

/// Historical batch ceiling of the backing document store.
pub const DEFAULT_BATCH_CEILING: usize = 500;

/// Running totals of everything a coordinator has committed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub batches: usize,
    pub applied: usize,
    pub skipped: usize,
}

impl CommitReport {
    pub fn committed(&self) -> usize {
        self.applied + self.skipped
    }
}

/// Accumulates writes and flushes them in ceiling-sized atomic batches.
pub struct BatchCommitCoordinator<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    ceiling: usize,
    retry: RetryPolicy,
    staged: Vec<Write>,
    report: CommitReport,
}

impl<'a, S: DocumentStore + ?Sized> BatchCommitCoordinator<'a, S> {
    /// Coordinator using the store's own ceiling. Commits are not retried.
    pub fn new(store: &'a S) -> Self {
        Self::with_ceiling(store, store.batch_ceiling())
    }

    /// Coordinator with a lower ceiling. Never exceeds the store's.
    pub fn with_ceiling(store: &'a S, ceiling: usize) -> Self {
        let ceiling = ceiling.min(store.batch_ceiling()).max(1);
        Self {
            store,
            ceiling,
            retry: RetryPolicy::no_retry(),
            staged: Vec::with_capacity(ceiling),
            report: CommitReport::default(),
        }
    }

    /// Retry transient commit failures. Each chunk is atomic, so a failed
    /// chunk applied nothing and is safe to resend.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn report(&self) -> CommitReport {
        self.report
    }

    /// Add a write to the current batch.
    pub fn stage(&mut self, write: Write) {
        self.staged.push(write);
    }

    /// Commit full chunks. Returns how many chunks were committed.
    pub async fn flush_if_full(&mut self) -> Result<usize, StoreError> {
        let mut flushed = 0;
        while self.staged.len() >= self.ceiling {
            self.commit_front(self.ceiling).await?;
            flushed += 1;
        }
        Ok(flushed)
    }

    /// Commit everything still staged, in ceiling-sized chunks.
    pub async fn flush_remaining(&mut self) -> Result<CommitReport, StoreError> {
        self.flush_if_full().await?;
        if !self.staged.is_empty() {
            self.commit_front(self.staged.len()).await?;
        }
        Ok(self.report)
    }

    async fn commit_front(&mut self, count: usize) -> Result<(), StoreError> {
        let chunk = &self.staged[..count];
        let store = self.store;
        let outcome = self
            .retry
            .execute(
                "commit_batch",
                || store.commit_batch(chunk),
                |e: &StoreError| ErrorClass::from_transient(e.is_transient()),
            )
            .await?;
        self.staged.drain(..count);

        self.report.batches += 1;
        self.report.applied += outcome.applied;
        self.report.skipped += outcome.skipped;
        tracing::debug!(
            chunk = count,
            applied = outcome.applied,
            skipped = outcome.skipped,
            batches = self.report.batches,
            total = self.report.committed(),
            "committed batch"
        );
        Ok(())
    }
}
