#![cfg(test)]

use std::time::Duration;

use crate::config::config::{Config, ConfigError};

/// Parse a TOML string into a `Config` and run the validation logic.
fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let cfg: Config = toml::from_str(toml_str)?;
    cfg.validate()?;
    Ok(cfg)
}

#[test]
fn test_basic_config() {
    let toml = r#"
        [destination]
        host = "pacs.example.org"
        port = 104
        called_aet = "ARCHIVE"
        calling_aet = "MODALITY1"

        [timeouts]
        connect_timeout_ms = 10000

        [sender]
        threads = 3
        retry_limit = 20
        backoff_secs = 30

        [storage]
        backend = "redb"
        path = "/var/lib/study-sender/studies.redb"

        [logging]
        log_level = "debug"
        log_to_file = true
        log_file_path = "/var/log/study-sender.log"
    "#;

    let config = load_config_from_str(toml).expect("valid config");

    assert_eq!(config.destination.host, "pacs.example.org");
    assert_eq!(config.destination.port, 104);
    assert_eq!(config.destination.called_aet, "ARCHIVE");
    assert_eq!(config.destination.calling_aet, "MODALITY1");
    assert_eq!(config.timeouts.connect_timeout_ms, 10000);
    // unset timeouts keep their defaults
    assert_eq!(config.timeouts.dimse_timeout_ms, 60000);

    assert_eq!(config.sender.threads, 3);
    let policy = config.sender.retry_policy();
    assert_eq!(policy.retry_limit, 20);
    assert_eq!(policy.backoff, Duration::from_secs(30));
    assert_eq!(policy.poll_interval, Duration::from_millis(200));

    assert_eq!(config.storage.backend, "redb");
    assert!(config.logging.log_to_file);
    assert_eq!(config.logging.log_level, "debug");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml = r#"
        [destination]
        host = "127.0.0.1"
        called_aet = "ARCHIVE"
    "#;

    let config = load_config_from_str(toml).expect("valid config");

    assert_eq!(config.destination.port, 11112);
    assert_eq!(config.destination.calling_aet, "STUDY_SENDER");
    assert_eq!(config.sender.threads, 5);
    assert_eq!(config.sender.retry_limit, 10_000);
    assert_eq!(config.sender.backoff_secs, 60);
    assert_eq!(config.storage.backend, "redb");
    assert_eq!(config.logging.log_level, "info");
    assert!(!config.logging.log_to_file);
}

#[test]
fn test_missing_destination_fails_to_parse() {
    let toml = r#"
        [sender]
        threads = 2
    "#;

    assert!(matches!(
        load_config_from_str(toml),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_long_ae_title_is_rejected() {
    let toml = r#"
        [destination]
        host = "127.0.0.1"
        called_aet = "THIS_TITLE_IS_TOO_LONG"
    "#;

    let err = load_config_from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDestination(_)));
}

#[test]
fn test_zero_threads_is_rejected() {
    let toml = r#"
        [destination]
        host = "127.0.0.1"
        called_aet = "ARCHIVE"

        [sender]
        threads = 0
    "#;

    let err = load_config_from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidSender(_)));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let toml = r#"
        [destination]
        host = "127.0.0.1"
        called_aet = "ARCHIVE"

        [timeouts]
        acse_timeout_ms = 0
    "#;

    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn test_unknown_storage_backend_is_rejected() {
    let toml = r#"
        [destination]
        host = "127.0.0.1"
        called_aet = "ARCHIVE"

        [storage]
        backend = "postgres"
    "#;

    let err = load_config_from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidStorage(_)));
}

#[test]
fn test_from_file_reports_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
