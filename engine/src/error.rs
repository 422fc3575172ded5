use gamify_ledger::LedgerError;
use gamify_season::SeasonError;
use gamify_store::StoreError;
use gamify_types::ValidationError;
use gamify_voting::VotingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("voting error: {0}")]
    Voting(#[from] VotingError),

    #[error("season error: {0}")]
    Season(#[from] SeasonError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Admission denied before any work started.
    #[error("rate limited: {operation} for {caller}, retry after {retry_after_secs}s")]
    RateLimited {
        caller: String,
        operation: String,
        retry_after_secs: u64,
    },

    #[error("dispatch task failed: {0}")]
    TaskFailed(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Worth retrying later without changing the request.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Ledger(e) => e.is_transient(),
            EngineError::Voting(e) => e.is_transient(),
            EngineError::Season(e) => e.is_transient(),
            EngineError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}
