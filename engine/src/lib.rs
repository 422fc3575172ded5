//! Gamify engine: wires the ledger, voting and season services to a store
//! and exposes them as one invocation surface.
//!
//! - [`Engine`]: apply transactions and batches, voting, period closure
//! - [`BatchDispatcher`]: bounded parallel batch application
//! - [`RateLimiter`]: per-caller admission control
//! - [`ClosureScheduler`]: daily closure runs until shutdown

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod limits;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod shutdown;

pub use config::{EngineConfig, StoreBackend};
pub use dispatcher::{BatchDispatcher, ItemResult, TransactionApplier};
pub use engine::Engine;
pub use error::EngineError;
pub use limits::{RateDecision, RateLimit, RateLimiter, StaticRateLimiter, StoreRateLimiter};
pub use logging::{init_logging, LogFormat};
pub use metrics::EngineMetrics;
pub use scheduler::ClosureScheduler;
pub use shutdown::{ShutdownController, ShutdownSignal};
