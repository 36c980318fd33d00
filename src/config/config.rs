use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use dimse::{DestinationEndpoint, ScuTimeouts};

use crate::config::{LoggingConfig, SenderConfig};
use crate::storage::StorageConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid sender settings: {0}")]
    InvalidSender(String),

    #[error("Invalid storage settings: {0}")]
    InvalidStorage(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub destination: DestinationEndpoint,
    #[serde(default)]
    pub timeouts: ScuTimeouts,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.destination
            .validate()
            .map_err(|e| ConfigError::InvalidDestination(e.to_string()))?;
        self.timeouts
            .validate()
            .map_err(|e| ConfigError::InvalidDestination(e.to_string()))?;
        self.sender.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}
