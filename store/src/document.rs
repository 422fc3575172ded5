//! Documents, keys and write operations.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::StoreError;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Address of a document: `collection/id`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey {
    pub collection: String,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Flat `collection/id` path, used as the key by flat backends.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    /// Inverse of [`DocKey::path`].
    pub fn from_path(path: &str) -> Option<Self> {
        let (collection, id) = path.split_once('/')?;
        Some(Self::new(collection, id))
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Encode a typed value into a document.
pub fn encode<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Decode a document into a typed value.
pub fn decode<T: DeserializeOwned>(doc: &Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(doc.clone()))?)
}

/// Shallow merge: every top-level field of `patch` overwrites `target`.
pub fn merge_into(target: &mut Document, patch: &Document) {
    for (field, value) in patch {
        target.insert(field.clone(), value.clone());
    }
}

/// What a [`Write`] does to its key.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Replace the whole document.
    Set(Document),
    /// Overwrite the given fields, creating the document if absent.
    Merge(Document),
    /// Create the document only if the key is free; otherwise a no-op.
    CreateIfAbsent(Document),
    Delete,
}

/// One logical write staged for a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Write {
    pub key: DocKey,
    pub op: WriteOp,
}

impl Write {
    pub fn set(key: DocKey, doc: Document) -> Self {
        Self {
            key,
            op: WriteOp::Set(doc),
        }
    }

    pub fn merge(key: DocKey, doc: Document) -> Self {
        Self {
            key,
            op: WriteOp::Merge(doc),
        }
    }

    pub fn create_if_absent(key: DocKey, doc: Document) -> Self {
        Self {
            key,
            op: WriteOp::CreateIfAbsent(doc),
        }
    }

    pub fn delete(key: DocKey) -> Self {
        Self {
            key,
            op: WriteOp::Delete,
        }
    }

    /// Resulting document given the current one, or `None` when this write
    /// leaves the key unchanged (an existing `CreateIfAbsent` target).
    ///
    /// The outer `Option` distinguishes "no change" from "deleted".
    pub fn resolve(&self, current: Option<&Document>) -> Option<Option<Document>> {
        match (&self.op, current) {
            (WriteOp::Set(doc), _) => Some(Some(doc.clone())),
            (WriteOp::Merge(patch), Some(existing)) => {
                let mut merged = existing.clone();
                merge_into(&mut merged, patch);
                Some(Some(merged))
            }
            (WriteOp::Merge(patch), None) => Some(Some(patch.clone())),
            (WriteOp::CreateIfAbsent(_), Some(_)) => None,
            (WriteOp::CreateIfAbsent(doc), None) => Some(Some(doc.clone())),
            (WriteOp::Delete, _) => Some(None),
        }
    }
}

/// Result of committing one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Writes that changed the store.
    pub applied: usize,
    /// `CreateIfAbsent` writes whose key already existed.
    pub skipped: usize,
}

/// A document returned by a query, with its key.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub key: DocKey,
    pub data: Document,
}

impl Snapshot {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        decode(&self.data)
    }
}
