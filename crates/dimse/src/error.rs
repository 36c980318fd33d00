//! Error types for DIMSE operations

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Association rejected: {0}")]
    AssociationRejected(String),

    #[error("DIMSE operation failed: {0}")]
    OperationFailed(String),

    #[error("Invalid AE Title: {0}")]
    InvalidAeTitle(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new operation failed error
    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }

    /// Create a new association rejected error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::AssociationRejected(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors are worth retrying later against the same
    /// destination; the others point at a configuration problem.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DimseError::Network(_)
                | DimseError::Timeout(_)
                | DimseError::AssociationRejected(_)
                | DimseError::OperationFailed(_)
        )
    }
}
