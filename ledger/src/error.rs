use thiserror::Error;

use gamify_store::StoreError;
use gamify_types::ValidationError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    /// Whether the whole read-check-write may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Validation(_) => false,
            LedgerError::Storage(e) => e.is_transient(),
        }
    }
}
