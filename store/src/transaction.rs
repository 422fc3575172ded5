//! Optimistic read-modify-write transactions.
//!
//! A transaction body is synchronous: it reads through the [`Transaction`]
//! view and buffers writes, which the store applies atomically at commit.
//! Because the store may run the body more than once, the body must not
//! have effects other than writes through the view.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{encode, DocKey, Document, DocumentStore, Query, Snapshot, StoreError};

/// Read/write view handed to a transaction body.
pub trait Transaction {
    /// Read a document, observing this transaction's own buffered writes.
    fn get(&mut self, key: &DocKey) -> Result<Option<Document>, StoreError>;

    /// Run a query against committed state.
    fn query(&mut self, query: &Query) -> Result<Vec<Snapshot>, StoreError>;

    fn set(&mut self, key: DocKey, doc: Document);

    fn merge(&mut self, key: DocKey, doc: Document);

    fn delete(&mut self, key: DocKey);
}

impl<'a> dyn Transaction + 'a {
    /// Read and decode a typed document.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &DocKey) -> Result<Option<T>, StoreError> {
        self.get(key)?.map(|doc| crate::decode(&doc)).transpose()
    }

    /// Whether a document exists at `key`.
    pub fn exists(&mut self, key: &DocKey) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Encode and buffer a full replacement.
    pub fn set_as<T: Serialize>(&mut self, key: DocKey, value: &T) -> Result<(), StoreError> {
        let doc = encode(value)?;
        self.set(key, doc);
        Ok(())
    }
}

/// Type-erased transaction body accepted by [`DocumentStore::run_transaction`].
pub type TxnBody<'a> = dyn FnMut(&mut dyn Transaction) -> Result<(), StoreError> + Send + 'a;

/// Run a typed transaction body.
///
/// The body's error type only needs to absorb [`StoreError`]. A body error
/// aborts the transaction without writing and is returned unchanged; a
/// store failure (including exhausted conflict retries) is converted.
pub async fn transact<S, T, E, F>(store: &S, mut body: F) -> Result<T, E>
where
    S: DocumentStore + ?Sized,
    F: FnMut(&mut dyn Transaction) -> Result<T, E> + Send,
    T: Send,
    E: From<StoreError> + Send,
{
    let mut outcome: Option<Result<T, E>> = None;
    let committed = store
        .run_transaction(&mut |txn: &mut dyn Transaction| match body(txn) {
            Ok(value) => {
                outcome = Some(Ok(value));
                Ok(())
            }
            Err(err) => {
                outcome = Some(Err(err));
                Err(StoreError::Aborted)
            }
        })
        .await;

    match (committed, outcome) {
        (Ok(()), Some(Ok(value))) => Ok(value),
        (Err(StoreError::Aborted), Some(Err(err))) => Err(err),
        (Err(err), _) => Err(err.into()),
        (Ok(()), _) => Err(StoreError::Backend(
            "transaction committed without running its body".into(),
        )
        .into()),
    }
}
