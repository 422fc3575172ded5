//! Shared utilities for the gamify ledger engine.

pub mod backoff;
pub mod time;

pub use backoff::{ErrorClass, RetryPolicy};
pub use time::format_duration;
