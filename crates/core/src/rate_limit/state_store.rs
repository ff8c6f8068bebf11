//! Persistence of the token bucket across process restarts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading or writing persisted bucket state.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Bucket state as written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: u32,
    /// Wall-clock time of the last token mint.
    pub updated_at: DateTime<Utc>,
}

/// Durable storage for [`BucketState`].
pub trait BucketStateStore: Send + Sync {
    /// Load the last saved state, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<BucketState>, StateStoreError>;

    fn save(&self, state: &BucketState) -> Result<(), StateStoreError>;
}

/// Stores the bucket as a small JSON document.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash never leaves a half-written state behind.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BucketStateStore for JsonFileStateStore {
    fn load(&self) -> Result<Option<BucketState>, StateStoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &BucketState) -> Result<(), StateStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
