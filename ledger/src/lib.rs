//! Idempotent score ledger.
//!
//! Applies scoring transactions to participant state exactly once, keyed
//! by `(participant_id, transaction_id)`, and grants the badges the new
//! state qualifies for.

pub mod error;
pub mod level;
pub mod processor;
pub mod record;
pub mod scoring;

pub use error::LedgerError;
pub use level::{level_for_score, LEVEL_THRESHOLDS};
pub use processor::{ApplyReceipt, IdempotentProcessor};
pub use record::LedgerRecord;
