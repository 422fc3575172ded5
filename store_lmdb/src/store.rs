//! LMDB implementation of [`DocumentStore`].
//!
//! Every operation runs synchronously inside a single LMDB transaction and
//! never holds one across an await point. On a multi-threaded runtime the
//! synchronous section runs under `block_in_place`, so waiting for the LMDB
//! writer lock does not stall other tasks scheduled on the same worker.
//! A current-thread runtime has no other worker to hand tasks to; there
//! the section runs inline.

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, RoTxn, RwTxn};
use tokio::runtime::{Handle, RuntimeFlavor};

use gamify_store::{
    BatchOutcome, DocKey, Document, DocumentStore, Query, Snapshot, StoreError, Transaction,
    TxnBody, Write, DEFAULT_BATCH_CEILING,
};

use crate::{LmdbEnvironment, LmdbError};

/// Run `f`, letting the runtime move other tasks off this worker first.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

pub struct LmdbDocumentStore {
    env: LmdbEnvironment,
    ceiling: usize,
}

impl LmdbDocumentStore {
    pub fn new(env: LmdbEnvironment) -> Self {
        Self::with_ceiling(env, DEFAULT_BATCH_CEILING)
    }

    pub fn with_ceiling(env: LmdbEnvironment, ceiling: usize) -> Self {
        Self {
            env,
            ceiling: ceiling.max(1),
        }
    }

    pub fn environment(&self) -> &LmdbEnvironment {
        &self.env
    }

    fn get_sync(&self, key: &DocKey) -> Result<Option<Document>, LmdbError> {
        let rtxn = self.env.env.read_txn()?;
        read_doc(&self.env.documents_db, &rtxn, key)
    }

    fn query_sync(&self, query: &Query) -> Result<Vec<Snapshot>, LmdbError> {
        let rtxn = self.env.env.read_txn()?;
        let docs = scan_collection(&self.env.documents_db, &rtxn, &query.collection)?;
        Ok(query.evaluate(docs.iter().map(|(k, d)| (k, d))))
    }

    fn commit_sync(&self, writes: &[Write]) -> Result<BatchOutcome, LmdbError> {
        let mut wtxn = self.env.env.write_txn()?;
        let mut outcome = BatchOutcome::default();
        for write in writes {
            if apply_write(&self.env.documents_db, &mut wtxn, write)? {
                outcome.applied += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        wtxn.commit()?;
        Ok(outcome)
    }

    fn transaction_sync(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError> {
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;
        let writes = {
            let mut txn = LmdbTxn {
                db: self.env.documents_db,
                txn: &wtxn,
                writes: Vec::new(),
            };
            // Dropping `wtxn` without commit aborts the LMDB transaction.
            body(&mut txn)?;
            txn.writes
        };
        for write in &writes {
            apply_write(&self.env.documents_db, &mut wtxn, write)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

fn read_doc(
    db: &Database<Str, Bytes>,
    txn: &RoTxn,
    key: &DocKey,
) -> Result<Option<Document>, LmdbError> {
    let path = key.path();
    match db.get(txn, path.as_str())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

fn scan_collection(
    db: &Database<Str, Bytes>,
    txn: &RoTxn,
    collection: &str,
) -> Result<Vec<(DocKey, Document)>, LmdbError> {
    let prefix = format!("{collection}/");
    let mut docs = Vec::new();
    for entry in db.prefix_iter(txn, prefix.as_str())? {
        let (path, bytes) = entry?;
        let key = DocKey::from_path(path)
            .ok_or_else(|| LmdbError::Serialization(format!("malformed document path {path}")))?;
        docs.push((key, serde_json::from_slice(bytes)?));
    }
    Ok(docs)
}

/// Apply one write inside an open write transaction.
fn apply_write(
    db: &Database<Str, Bytes>,
    wtxn: &mut RwTxn,
    write: &Write,
) -> Result<bool, LmdbError> {
    let current = read_doc(db, wtxn, &write.key)?;
    let path = write.key.path();
    match write.resolve(current.as_ref()) {
        None => Ok(false),
        Some(None) => {
            db.delete(wtxn, path.as_str())?;
            Ok(true)
        }
        Some(Some(doc)) => {
            let bytes = serde_json::to_vec(&doc)?;
            db.put(wtxn, path.as_str(), bytes.as_slice())?;
            Ok(true)
        }
    }
}

/// Transaction view over an LMDB write transaction. Writes are buffered
/// and applied after the body returns.
struct LmdbTxn<'t, 'e> {
    db: Database<Str, Bytes>,
    txn: &'t RwTxn<'e>,
    writes: Vec<Write>,
}

impl Transaction for LmdbTxn<'_, '_> {
    fn get(&mut self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        let mut doc = read_doc(&self.db, self.txn, key)?;
        for write in self.writes.iter().filter(|w| &w.key == key) {
            if let Some(next) = write.resolve(doc.as_ref()) {
                doc = next;
            }
        }
        Ok(doc)
    }

    fn query(&mut self, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        let docs = scan_collection(&self.db, self.txn, &query.collection)?;
        Ok(query.evaluate(docs.iter().map(|(k, d)| (k, d))))
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
impl DocumentStore for LmdbDocumentStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        Ok(blocking(|| self.get_sync(key))?)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        Ok(blocking(|| self.query_sync(query))?)
    }

    async fn commit_batch(&self, writes: &[Write]) -> Result<BatchOutcome, StoreError> {
        if writes.len() > self.ceiling {
            return Err(StoreError::BatchTooLarge {
                size: writes.len(),
                ceiling: self.ceiling,
            });
        }
        Ok(blocking(|| self.commit_sync(writes))?)
    }

    async fn run_transaction(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError> {
        blocking(|| self.transaction_sync(body))
    }

    fn batch_ceiling(&self) -> usize {
        self.ceiling
    }
}
