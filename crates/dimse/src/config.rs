//! Configuration types for the storage SCU

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::DEFAULT_DIMSE_PORT;

/// A remote Storage SCP and the identity we present to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationEndpoint {
    /// Remote host address
    pub host: String,

    /// Remote port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Remote (called) Application Entity Title
    pub called_aet: String,

    /// Local (calling) Application Entity Title
    #[serde(default = "default_calling_aet")]
    pub calling_aet: String,
}

/// Timeouts handed to the association implementation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScuTimeouts {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Association (ACSE) timeout in milliseconds
    #[serde(default = "default_acse_timeout")]
    pub acse_timeout_ms: u64,

    /// Per-message (DIMSE) timeout in milliseconds
    #[serde(default = "default_dimse_timeout")]
    pub dimse_timeout_ms: u64,
}

impl DestinationEndpoint {
    /// Create a new destination
    pub fn new(
        called_aet: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        calling_aet: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            called_aet: called_aet.into(),
            calling_aet: calling_aet.into(),
        }
    }

    /// Validate the destination configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_ae_title("Called", &self.called_aet)?;
        validate_ae_title("Calling", &self.calling_aet)?;

        if self.host.trim().is_empty() {
            return Err(crate::error::DimseError::config(
                "Destination host cannot be empty",
            ));
        }

        if self.port == 0 {
            return Err(crate::error::DimseError::config(
                "Destination port must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for DestinationEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{} (as {})",
            self.called_aet, self.host, self.port, self.calling_aet
        )
    }
}

impl Default for ScuTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            acse_timeout_ms: default_acse_timeout(),
            dimse_timeout_ms: default_dimse_timeout(),
        }
    }
}

impl ScuTimeouts {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get association timeout as Duration
    pub fn acse_timeout(&self) -> Duration {
        Duration::from_millis(self.acse_timeout_ms)
    }

    /// Get DIMSE message timeout as Duration
    pub fn dimse_timeout(&self) -> Duration {
        Duration::from_millis(self.dimse_timeout_ms)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.connect_timeout_ms == 0 || self.acse_timeout_ms == 0 || self.dimse_timeout_ms == 0 {
            return Err(crate::error::DimseError::config(
                "Timeouts must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn validate_ae_title(role: &str, aet: &str) -> crate::error::Result<()> {
    let trimmed = aet.trim();
    if trimmed.is_empty() || trimmed.len() > 16 {
        return Err(crate::error::DimseError::InvalidAeTitle(format!(
            "{} AE title must be 1-16 characters, got '{}'",
            role, aet
        )));
    }
    if trimmed.chars().any(|c| c == '\\' || c.is_control()) {
        return Err(crate::error::DimseError::InvalidAeTitle(format!(
            "{} AE title contains invalid characters: '{}'",
            role, aet
        )));
    }
    Ok(())
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_DIMSE_PORT
}

fn default_calling_aet() -> String {
    "STUDY_SENDER".to_string()
}

fn default_connect_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_acse_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_dimse_timeout() -> u64 {
    60_000 // 1 minute
}
