use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::SenderError;

/// Install the global subscriber: stdout always, plus a file when configured.
///
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), SenderError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| SenderError::Logging(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true);

    let file_layer = if config.log_to_file {
        let path = Path::new(&config.log_file_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SenderError::Logging(e.to_string()))
}
