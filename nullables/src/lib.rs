//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies (clock, document store) are abstracted behind
//! traits. This crate provides in-process implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (time, faults, latency)
//! - Never touch the filesystem or network
//!
//! [`NullStore`] doubles as the engine's `memory` backend.

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::{FaultScope, NullStore};
