use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;

pub mod database_manager;
pub mod memory;
pub mod redb_store;

pub use memory::MemoryStudyStore;
pub use redb_store::RedbStudyStore;

/// Error type for study bookkeeping
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt study record for {study_uid}: {reason}")]
    Record { study_uid: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A study known to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDescriptor {
    /// Study Instance UID
    pub study_uid: String,
    /// Directory holding the study's files
    pub path: PathBuf,
    /// Whether the study still needs sending
    pub pending: bool,
}

/// Persistent bookkeeping of which studies still need sending
///
/// `mark_sent` is called concurrently from several workers, each for a
/// different study.
#[async_trait]
pub trait StudyStore: Send + Sync + std::fmt::Debug {
    /// All known studies, pending or not
    async fn enumerate(&self) -> StorageResult<Vec<StudyDescriptor>>;

    /// Clear the pending flag of a fully sent study
    async fn mark_sent(&self, study_uid: &str) -> StorageResult<()>;

    /// Add or replace a study and flag it for sending
    async fn register(&self, study_uid: &str, path: PathBuf) -> StorageResult<()>;
}

/// Configuration for the study store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_database_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend.as_str() {
            "redb" if self.path.as_os_str().is_empty() => Err(ConfigError::InvalidStorage(
                "redb backend requires a database path".to_string(),
            )),
            "redb" | "memory" => Ok(()),
            other => Err(ConfigError::InvalidStorage(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }
}

fn default_backend() -> String {
    "redb".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./tmp/studies.redb")
}

/// Create a study store from configuration
pub fn create_study_store(config: &StorageConfig) -> StorageResult<Arc<dyn StudyStore>> {
    match config.backend.as_str() {
        "redb" => Ok(Arc::new(RedbStudyStore::open(&config.path)?)),
        "memory" => Ok(Arc::new(MemoryStudyStore::new())),
        _ => Err(StorageError::Config(format!(
            "Unknown storage backend: {}",
            config.backend
        ))),
    }
}
