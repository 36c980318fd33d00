#[cfg(test)]
mod tests;
mod logging_config;
mod sender_config;
pub mod config;

pub use config::{Config, ConfigError};
pub use logging_config::LoggingConfig;
pub use sender_config::SenderConfig;
