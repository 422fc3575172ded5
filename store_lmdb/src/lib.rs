//! LMDB storage backend for the gamify ledger engine.
//!
//! Implements [`gamify_store::DocumentStore`] using the `heed` LMDB bindings.
//! All documents live in one LMDB database keyed by `collection/id`, holding
//! JSON bytes. LMDB serialises write transactions, so optimistic
//! transactions never conflict here.

pub mod environment;
pub mod error;
pub mod store;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use store::LmdbDocumentStore;
