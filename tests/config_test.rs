//! Configuration tests
//!
//! This module contains tests for the configuration system.

use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use servicebus_proxy::config::{
    load_config, ConfigBuilder, ConfigError, ConfigValues, ProxyConfig, ValueSource, ENV_PREFIX,
};

fn clear_env() {
    for name in [
        "LISTEN", "TARGET", "CONNECT_TIMEOUT", "BUFFER_SIZE", "DRAIN_TIMEOUT",
        "LOG_LEVEL", "CERT_DIR", "KEY_BITS", "VALIDITY_DAYS",
    ] {
        env::remove_var(format!("{}{}", ENV_PREFIX, name));
    }
}

/// Test default configuration
#[test]
fn test_default_config() {
    let config = ProxyConfig::default();

    assert_eq!(config.listen().to_string(), "0.0.0.0:5671");
    assert_eq!(config.target(), "localhost:5672");
    assert_eq!(config.log_level(), "info");
    assert_eq!(config.cert_dir(), Path::new("docker/service-bus/certs"));
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.buffer_size(), 8192);
    assert_eq!(config.drain_timeout(), Duration::from_secs(30));
    assert_eq!(config.key_bits(), 2048);
    assert_eq!(config.validity_days(), 365);
    assert!(config.cert_path().ends_with("servicebus-proxy.crt"));
    assert!(config.key_path().ends_with("servicebus-proxy.key"));
}

#[test]
fn test_for_ports() {
    let config = ProxyConfig::for_ports(15671, 15672);

    assert_eq!(config.listen().to_string(), "0.0.0.0:15671");
    assert_eq!(config.target(), "localhost:15672");
    assert_eq!(config.source("listen"), "command line");
    assert_eq!(config.source("buffer_size"), "default");
}

/// Test configuration priority: file < environment < command line
#[test]
#[serial]
fn test_config_priority() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "listen": "127.0.0.1:9000",
            "target": "localhost:8000",
            "buffer_size": 16384,
            "log_level": "debug"
        }"#,
    )
    .unwrap();

    env::set_var(format!("{}TARGET", ENV_PREFIX), "localhost:8100");
    env::set_var(format!("{}LOG_LEVEL", ENV_PREFIX), "warn");

    let cli = ConfigValues {
        log_level: Some("trace".to_string()),
        ..ConfigValues::default()
    };
    let config = load_config(Some(path.as_path()), cli).unwrap();
    clear_env();

    assert_eq!(config.listen().to_string(), "127.0.0.1:9000");
    assert_eq!(config.source("listen"), "file");
    assert_eq!(config.buffer_size(), 16384);
    assert_eq!(config.target(), "localhost:8100");
    assert_eq!(config.source("target"), "environment");
    assert_eq!(config.log_level(), "trace");
    assert_eq!(config.source("log_level"), "command line");
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.source("connect_timeout"), "default");
}

#[test]
#[serial]
fn test_invalid_env_value_is_ignored() {
    clear_env();
    env::set_var(format!("{}BUFFER_SIZE", ENV_PREFIX), "lots");

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_env(ENV_PREFIX)
        .build()
        .unwrap();
    clear_env();

    assert_eq!(config.buffer_size(), 8192);
    assert_eq!(config.source("buffer_size"), "default");
}

#[test]
#[serial]
fn test_missing_file_is_not_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();

    let config = load_config(Some(dir.path().join("absent.json").as_path()), ConfigValues::default()).unwrap();
    assert_eq!(config.listen().to_string(), "0.0.0.0:5671");
}

#[test]
fn test_unknown_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"listen": "0.0.0.0:5671", "hybrid_mode": true}"#).unwrap();

    let result = ConfigBuilder::new().with_defaults().with_file(&path).build();
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_listen_equal_to_target_is_rejected() {
    let cli = ConfigValues {
        listen: Some("127.0.0.1:5672".parse().unwrap()),
        ..ConfigValues::default()
    };

    let result = ConfigBuilder::new().with_defaults().with_cli(cli).build();
    assert!(matches!(result, Err(ConfigError::InvalidCombination(_))));
}

#[test]
fn test_weak_key_is_rejected() {
    let cli = ConfigValues {
        key_bits: Some(1024),
        ..ConfigValues::default()
    };

    let result = ConfigBuilder::new().with_defaults().with_cli(cli).build();
    assert!(matches!(result, Err(ConfigError::InvalidValue(..))));
}

#[test]
fn test_value_source_display() {
    assert_eq!(ValueSource::Default.to_string(), "default");
    assert_eq!(ValueSource::Environment.to_string(), "environment");
}
