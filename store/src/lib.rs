//! Abstract document-store interface for the gamify ledger engine.
//!
//! Every backend (LMDB, in-memory for testing) implements [`DocumentStore`].
//! The rest of the codebase depends only on this crate.

pub mod batch;
pub mod document;
pub mod error;
pub mod keys;
pub mod query;
pub mod transaction;

pub use batch::{BatchCommitCoordinator, CommitReport, DEFAULT_BATCH_CEILING};
pub use document::{decode, encode, BatchOutcome, DocKey, Document, Snapshot, Write, WriteOp};
pub use error::StoreError;
pub use query::{Direction, Filter, FilterOp, Query};
pub use transaction::{transact, Transaction, TxnBody};

use async_trait::async_trait;

/// A transactional document store with a capped atomic batch size.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document by key.
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError>;

    /// Run a query against one collection.
    async fn query(&self, query: &Query) -> Result<Vec<Snapshot>, StoreError>;

    /// Atomically apply up to [`batch_ceiling`](Self::batch_ceiling) writes.
    ///
    /// Larger batches are rejected with [`StoreError::BatchTooLarge`] and
    /// nothing is applied.
    async fn commit_batch(&self, writes: &[Write]) -> Result<BatchOutcome, StoreError>;

    /// Run an optimistic read-modify-write.
    ///
    /// The body may be invoked several times when the store detects a
    /// conflicting commit; only the final run's writes are applied. Returns
    /// [`StoreError::Contention`] when conflicts persist.
    async fn run_transaction(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError>;

    /// Maximum number of writes accepted by one [`commit_batch`](Self::commit_batch).
    fn batch_ceiling(&self) -> usize;

    /// Apply a single write.
    async fn write(&self, write: Write) -> Result<BatchOutcome, StoreError> {
        self.commit_batch(std::slice::from_ref(&write)).await
    }
}
