use thiserror::Error;

use gamify_store::StoreError;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("LMDB map is full")]
    MapFull,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported schema version {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        match e {
            heed::Error::Mdb(heed::MdbError::MapFull) => LmdbError::MapFull,
            heed::Error::Io(io) => LmdbError::Io(io.to_string()),
            other => LmdbError::Heed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for LmdbError {
    fn from(e: std::io::Error) -> Self {
        LmdbError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LmdbError {
    fn from(e: serde_json::Error) -> Self {
        LmdbError::Serialization(e.to_string())
    }
}

impl From<LmdbError> for StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::MapFull => StoreError::QuotaExceeded(e.to_string()),
            LmdbError::Serialization(msg) => StoreError::Serialization(msg),
            LmdbError::SchemaMismatch { .. } => StoreError::Corruption(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
