//! Nullable store: a thread-safe in-memory document store.
//!
//! Documents carry a version that changes on every write. Transactions
//! record the versions they read and are re-run when any of them changed
//! before commit, which is how real optimistic stores behave.

use async_trait::async_trait;
use gamify_store::{
    encode, BatchOutcome, DocKey, Document, DocumentStore, Query, Snapshot, StoreError,
    Transaction, TxnBody, Write, DEFAULT_BATCH_CEILING,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How many times a conflicting transaction body is re-run before the
/// store gives up with [`StoreError::Contention`].
pub const MAX_TRANSACTION_RUNS: usize = 5;

/// Which operations an injected fault applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultScope {
    /// Any store call.
    Any,
    /// Batch commits and transaction commits only.
    Writes,
}

struct Versioned {
    version: u64,
    doc: Document,
}

#[derive(Default)]
struct State {
    docs: BTreeMap<DocKey, Versioned>,
    next_version: u64,
    batch_sizes: Vec<usize>,
    transactions_committed: u64,
    transaction_runs: u64,
    conflicts: u64,
}

impl State {
    fn version_of(&self, key: &DocKey) -> u64 {
        self.docs.get(key).map_or(0, |v| v.version)
    }

    /// Apply one write; returns whether the store changed.
    fn apply(&mut self, write: &Write) -> bool {
        let current = self.docs.get(&write.key).map(|v| &v.doc);
        match write.resolve(current) {
            None => false,
            Some(None) => {
                self.docs.remove(&write.key);
                true
            }
            Some(Some(doc)) => {
                self.next_version += 1;
                let version = self.next_version;
                self.docs
                    .insert(write.key.clone(), Versioned { version, doc });
                true
            }
        }
    }
}

/// An in-memory [`DocumentStore`] for tests and the `memory` backend.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullStore {
    state: Mutex<State>,
    ceiling: usize,
    write_latency: Mutex<Duration>,
    faults: Mutex<VecDeque<(FaultScope, StoreError)>>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::with_ceiling(DEFAULT_BATCH_CEILING)
    }

    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            ceiling: ceiling.max(1),
            write_latency: Mutex::new(Duration::ZERO),
            faults: Mutex::new(VecDeque::new()),
        }
    }

    /// Delay every commit by `latency` (a suspension point under tokio time).
    pub fn set_write_latency(&self, latency: Duration) {
        *self.write_latency.lock().unwrap() = latency;
    }

    /// Fail the next `count` matching operations with `error`.
    pub fn fail_next(&self, count: usize, scope: FaultScope, error: StoreError) {
        let mut faults = self.faults.lock().unwrap();
        for _ in 0..count {
            faults.push_back((scope, error.clone()));
        }
    }

    /// Seed a document directly, bypassing faults and latency.
    pub fn put_doc(&self, key: DocKey, doc: Document) {
        self.state().apply(&Write::set(key, doc));
    }

    /// Seed a typed document.
    pub fn seed<T: Serialize>(&self, key: DocKey, value: &T) -> Result<(), StoreError> {
        let doc = encode(value)?;
        self.put_doc(key, doc);
        Ok(())
    }

    /// Read a document directly, bypassing faults.
    pub fn doc(&self, key: &DocKey) -> Option<Document> {
        self.state().docs.get(key).map(|v| v.doc.clone())
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.state()
            .docs
            .keys()
            .filter(|k| k.collection == collection)
            .count()
    }

    /// Sizes of every successfully committed batch, in commit order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state().batch_sizes.clone()
    }

    pub fn transactions_committed(&self) -> u64 {
        self.state().transactions_committed
    }

    /// Total transaction body runs, including re-runs after conflicts.
    pub fn transaction_runs(&self) -> u64 {
        self.state().transaction_runs
    }

    pub fn conflicts(&self) -> u64 {
        self.state().conflicts
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn take_fault(&self, writing: bool) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().unwrap();
        let hit = faults
            .iter()
            .position(|(scope, _)| *scope == FaultScope::Any || writing);
        match hit.and_then(|pos| faults.remove(pos)) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    async fn simulate_latency(&self) {
        let latency = *self.write_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction view: reads record versions, writes are buffered.
struct NullTxn<'a> {
    store: &'a NullStore,
    reads: HashMap<DocKey, u64>,
    writes: Vec<Write>,
}

impl Transaction for NullTxn<'_> {
    fn get(&mut self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        let mut doc = {
            let state = self.store.state();
            self.reads
                .entry(key.clone())
                .or_insert_with(|| state.version_of(key));
            state.docs.get(key).map(|v| v.doc.clone())
        };
        for write in self.writes.iter().filter(|w| &w.key == key) {
            if let Some(next) = write.resolve(doc.as_ref()) {
                doc = next;
            }
        }
        Ok(doc)
    }

    fn query(&mut self, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        let state = self.store.state();
        let hits = query.evaluate(state.docs.iter().map(|(k, v)| (k, &v.doc)));
        for hit in &hits {
            self.reads
                .entry(hit.key.clone())
                .or_insert_with(|| state.version_of(&hit.key));
        }
        Ok(hits)
    }

    fn set(&mut self, key: DocKey, doc: Document) {
        self.writes.push(Write::set(key, doc));
    }

    fn merge(&mut self, key: DocKey, doc: Document) {
        self.writes.push(Write::merge(key, doc));
    }

    fn delete(&mut self, key: DocKey) {
        self.writes.push(Write::delete(key));
    }
}

#[async_trait]
impl DocumentStore for NullStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        self.take_fault(false)?;
        Ok(self.doc(key))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        self.take_fault(false)?;
        let state = self.state();
        Ok(query.evaluate(state.docs.iter().map(|(k, v)| (k, &v.doc))))
    }

    async fn commit_batch(&self, writes: &[Write]) -> Result<BatchOutcome, StoreError> {
        self.take_fault(true)?;
        if writes.len() > self.ceiling {
            return Err(StoreError::BatchTooLarge {
                size: writes.len(),
                ceiling: self.ceiling,
            });
        }
        self.simulate_latency().await;

        let mut state = self.state();
        let mut outcome = BatchOutcome::default();
        for write in writes {
            if state.apply(write) {
                outcome.applied += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        state.batch_sizes.push(writes.len());
        Ok(outcome)
    }

    async fn run_transaction(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError> {
        self.take_fault(false)?;
        for run in 1..=MAX_TRANSACTION_RUNS {
            let mut txn = NullTxn {
                store: self,
                reads: HashMap::new(),
                writes: Vec::new(),
            };
            self.state().transaction_runs += 1;
            body(&mut txn)?;

            self.simulate_latency().await;
            self.take_fault(true)?;

            let committed = {
                let mut state = self.state();
                let unchanged = txn
                    .reads
                    .iter()
                    .all(|(key, version)| state.version_of(key) == *version);
                if unchanged {
                    for write in &txn.writes {
                        state.apply(write);
                    }
                    state.transactions_committed += 1;
                } else {
                    state.conflicts += 1;
                }
                unchanged
            };
            if committed {
                return Ok(());
            }
            tracing::debug!(run, "transaction read set changed, re-running body");
            tokio::task::yield_now().await;
        }
        Err(StoreError::Contention(format!(
            "transaction conflicted {MAX_TRANSACTION_RUNS} times"
        )))
    }

    fn batch_ceiling(&self) -> usize {
        self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamify_store::{transact, BatchCommitCoordinator, Direction, FilterOp};
    use serde_json::json;
    use std::sync::Arc;

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn key(id: &str) -> DocKey {
        DocKey::new("counters", id)
    }

    #[tokio::test]
    async fn set_get_roundtrip() {
        let store = NullStore::new();
        store
            .write(Write::set(key("a"), doc(json!({"n": 1}))))
            .await
            .unwrap();
        assert_eq!(store.get(&key("a")).await.unwrap(), Some(doc(json!({"n": 1}))));
        assert_eq!(store.get(&key("b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_if_absent_reports_skips() {
        let store = NullStore::new();
        let writes = vec![
            Write::create_if_absent(key("a"), doc(json!({"n": 1}))),
            Write::create_if_absent(key("a"), doc(json!({"n": 2}))),
        ];
        let outcome = store.commit_batch(&writes).await.unwrap();
        assert_eq!(outcome, BatchOutcome { applied: 1, skipped: 1 });
        assert_eq!(store.doc(&key("a")), Some(doc(json!({"n": 1}))));
    }

    #[tokio::test]
    async fn oversized_batch_rejected_without_effect() {
        let store = NullStore::with_ceiling(2);
        let writes: Vec<Write> = (0..3)
            .map(|i| Write::set(key(&i.to_string()), Document::new()))
            .collect();
        let err = store.commit_batch(&writes).await.unwrap_err();
        assert_eq!(err, StoreError::BatchTooLarge { size: 3, ceiling: 2 });
        assert_eq!(store.count("counters"), 0);
    }

    #[tokio::test]
    async fn injected_faults_fire_once_each() {
        let store = NullStore::new();
        store.fail_next(2, FaultScope::Any, StoreError::Unavailable("down".into()));
        assert!(store.get(&key("a")).await.is_err());
        assert!(store.get(&key("a")).await.is_err());
        assert!(store.get(&key("a")).await.is_ok());
    }

    #[tokio::test]
    async fn write_faults_skip_reads() {
        let store = NullStore::new();
        store.fail_next(1, FaultScope::Writes, StoreError::Timeout("slow".into()));
        assert!(store.get(&key("a")).await.is_ok());
        assert!(store.write(Write::set(key("a"), Document::new())).await.is_err());
        assert!(store.write(Write::set(key("a"), Document::new())).await.is_ok());
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = NullStore::new();
        let seen: Result<Option<Document>, StoreError> = transact(&store, |txn| {
            txn.set(key("a"), doc(json!({"n": 1})));
            txn.merge(key("a"), doc(json!({"m": 2})));
            txn.get(&key("a"))
        })
        .await;
        assert_eq!(seen.unwrap(), Some(doc(json!({"n": 1, "m": 2}))));
        assert_eq!(store.doc(&key("a")), Some(doc(json!({"n": 1, "m": 2}))));
    }

    #[tokio::test]
    async fn aborted_transaction_writes_nothing() {
        let store = NullStore::new();
        let result: Result<(), StoreError> = transact(&store, |txn| {
            txn.set(key("a"), Document::new());
            Err(StoreError::InvalidArgument("nope".into()))
        })
        .await;
        assert_eq!(result, Err(StoreError::InvalidArgument("nope".into())));
        assert_eq!(store.doc(&key("a")), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_serialized() {
        let store = Arc::new(NullStore::new());
        store.set_write_latency(Duration::from_millis(1));
        store.put_doc(key("c"), doc(json!({"n": 0})));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                // Conflicts are retried inside the store; loop on exhaustion.
                loop {
                    let result: Result<(), StoreError> = transact(store.as_ref(), |txn| {
                        let n = txn
                            .get(&key("c"))?
                            .and_then(|d| d.get("n").and_then(|v| v.as_u64()))
                            .unwrap_or(0);
                        txn.set(key("c"), doc(json!({"n": n + 1})));
                        Ok(())
                    })
                    .await;
                    match result {
                        Ok(()) => break,
                        Err(StoreError::Contention(_)) => continue,
                        Err(other) => panic!("unexpected error {other}"),
                    }
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.doc(&key("c")), Some(doc(json!({"n": 8}))));
        assert_eq!(store.transactions_committed(), 8);
    }

    #[tokio::test]
    async fn query_orders_and_limits() {
        let store = NullStore::new();
        for (id, points) in [("a", 3), ("b", 9), ("c", 5)] {
            store.put_doc(DocKey::new("scores", id), doc(json!({"points": points})));
        }
        let q = Query::new("scores")
            .filter("points", FilterOp::Gt, 3)
            .order_by("points", Direction::Desc)
            .limit(1);
        let hits = store.query(&q).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.id, "b");
    }

    #[tokio::test]
    async fn coordinator_chunks_against_null_store() {
        let store = NullStore::new();
        let mut batch = BatchCommitCoordinator::new(&store);
        for i in 0..1201 {
            batch.stage(Write::set(key(&format!("{i}")), Document::new()));
            batch.flush_if_full().await.unwrap();
        }
        batch.flush_remaining().await.unwrap();
        assert_eq!(store.batch_sizes(), vec![500, 500, 201]);
        assert_eq!(store.count("counters"), 1201);
    }
}
