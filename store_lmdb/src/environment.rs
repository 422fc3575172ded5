//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use crate::LmdbError;

/// Current on-disk layout version.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Wraps the LMDB environment and its database handles.
#[derive(Clone)]
pub struct LmdbEnvironment {
    pub(crate) env: Arc<Env>,
    pub(crate) documents_db: Database<Str, Bytes>,
    pub(crate) meta_db: Database<Str, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment in directory `path`.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per directory by this
        // process, and the data file is not truncated or modified by anyone
        // else while it is mapped.
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(4).open(path)? };

        let mut wtxn = env.write_txn()?;
        let documents_db: Database<Str, Bytes> =
            env.create_database(&mut wtxn, Some("documents"))?;
        let meta_db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some("meta"))?;

        let existing = meta_db.get(&wtxn, SCHEMA_VERSION_KEY)?.map(<[u8]>::to_vec);
        match existing {
            Some(bytes) => {
                let found = <[u8; 4]>::try_from(bytes.as_slice())
                    .map(u32::from_le_bytes)
                    .map_err(|_| {
                        LmdbError::Serialization("schema_version has unexpected byte length".into())
                    })?;
                if found != SCHEMA_VERSION {
                    return Err(LmdbError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
            }
            None => {
                meta_db.put(&mut wtxn, SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_le_bytes())?;
            }
        }
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(Self {
            env: Arc::new(env),
            documents_db,
            meta_db,
        })
    }

    /// Number of stored documents across all collections.
    pub fn document_count(&self) -> Result<u64, LmdbError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.documents_db.len(&rtxn)?)
    }

    pub fn schema_version(&self) -> Result<u32, LmdbError> {
        let rtxn = self.env.read_txn()?;
        let version = self
            .meta_db
            .get(&rtxn, SCHEMA_VERSION_KEY)?
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(u32::from_le_bytes)
            .unwrap_or(0);
        Ok(version)
    }
}
