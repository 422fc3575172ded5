use gamify_store::StoreError;
use gamify_types::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeasonError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Storage(#[from] StoreError),

    #[error("calendar error: {0}")]
    Calendar(String),
}

impl SeasonError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SeasonError::Storage(e) if e.is_transient())
    }
}
