//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::common::split_host_port;
use crate::config::defaults::{LOG_LEVELS, MIN_KEY_BITS};
use crate::config::error::{ConfigError, Result};
use crate::config::types::ProxyConfig;

/// Validate the configuration
pub fn validate_config(config: &ProxyConfig) -> Result<()> {
    validate_network_settings(config)?;
    validate_identity_settings(config)?;
    validate_general_settings(config);

    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &ProxyConfig) -> Result<()> {
    let (host, port) = split_host_port(config.target())
        .map_err(|e| ConfigError::InvalidValue("target".to_string(), e.to_string()))?;

    // Forwarding to ourselves would loop every connection back into the listener
    let listen = config.listen();
    if port == listen.port() && targets_listener(&host, listen) {
        return Err(ConfigError::InvalidCombination(
            "Listen and target addresses must be different".to_string(),
        ));
    }

    if config.connect_timeout().is_zero() {
        return Err(ConfigError::InvalidValue(
            "connect_timeout".to_string(),
            "Connection timeout must be greater than 0".to_string(),
        ));
    }

    if config.buffer_size() == 0 {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            "Buffer size must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn targets_listener(host: &str, listen: std::net::SocketAddr) -> bool {
    if listen.ip().is_unspecified() {
        return matches!(host, "localhost" | "127.0.0.1" | "::1" | "0.0.0.0" | "::");
    }

    host == listen.ip().to_string() || (host == "localhost" && listen.ip().is_loopback())
}

/// Validate identity settings
fn validate_identity_settings(config: &ProxyConfig) -> Result<()> {
    if config.key_bits() < MIN_KEY_BITS {
        return Err(ConfigError::InvalidValue(
            "key_bits".to_string(),
            format!("Key size must be at least {} bits", MIN_KEY_BITS),
        ));
    }

    if config.validity_days() == 0 {
        return Err(ConfigError::InvalidValue(
            "validity_days".to_string(),
            "Certificate validity must be at least one day".to_string(),
        ));
    }

    if config.cert_dir().as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue(
            "cert_dir".to_string(),
            "Certificate directory must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &ProxyConfig) {
    for warning in check_warnings(config) {
        warn!("{}", warning);
    }
}

/// Non-fatal configuration problems
pub fn check_warnings(config: &ProxyConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !LOG_LEVELS.contains(&config.log_level()) {
        warnings.push(format!(
            "Invalid log level '{}', using default 'info'",
            config.log_level()
        ));
    }

    if config.drain_timeout().is_zero() {
        warnings.push("Drain timeout is 0; in-flight connections are aborted on shutdown".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ConfigValues, ValueSource};

    fn config_with(values: ConfigValues) -> ProxyConfig {
        let mut config = ProxyConfig::from_values(values, ValueSource::CommandLine);
        config.set_default_values();
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
        assert!(check_warnings(&ProxyConfig::default()).is_empty());
    }

    #[test]
    fn test_target_must_be_host_port() {
        let config = config_with(ConfigValues {
            target: Some("localhost".to_string()),
            ..ConfigValues::default()
        });
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidValue(..))));
    }

    #[test]
    fn test_listen_and_target_must_differ() {
        let config = config_with(ConfigValues {
            listen: Some("0.0.0.0:5671".parse().unwrap()),
            target: Some("localhost:5671".to_string()),
            ..ConfigValues::default()
        });
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidCombination(_))));

        let config = config_with(ConfigValues {
            listen: Some("127.0.0.1:5671".parse().unwrap()),
            target: Some("emulator:5671".to_string()),
            ..ConfigValues::default()
        });
        assert!(validate_config(&config).is_ok(), "same port on another host is fine");
    }

    #[test]
    fn test_zero_values_rejected() {
        for values in [
            ConfigValues { connect_timeout: Some(0), ..ConfigValues::default() },
            ConfigValues { buffer_size: Some(0), ..ConfigValues::default() },
            ConfigValues { validity_days: Some(0), ..ConfigValues::default() },
        ] {
            assert!(validate_config(&config_with(values)).is_err());
        }
    }

    #[test]
    fn test_weak_keys_rejected() {
        let config = config_with(ConfigValues {
            key_bits: Some(1024),
            ..ConfigValues::default()
        });
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidValue(..))));
    }

    #[test]
    fn test_unknown_log_level_is_warning() {
        let config = config_with(ConfigValues {
            log_level: Some("verbose".to_string()),
            ..ConfigValues::default()
        });
        assert!(validate_config(&config).is_ok());
        assert_eq!(check_warnings(&config).len(), 1);
    }
}
