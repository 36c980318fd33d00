use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors surfaced to the caller of the sender.
///
/// Failures inside a send run never show up here; they leave studies pending
/// instead.
#[derive(Debug, Error)]
pub enum SenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No DICOM study found under {}", .0.display())]
    NoStudy(std::path::PathBuf),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Send run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
