//! Configuration types
//!
//! This module contains the main configuration types used throughout the application.

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::parse_socket_addr;
use crate::config::defaults::{
    self, BUFFER_SIZE, CERT_DIR_STR, CERT_FILE_NAME, CONNECT_TIMEOUT_SECS, DRAIN_TIMEOUT_SECS,
    KEY_BITS, KEY_FILE_NAME, LOG_LEVEL_STR, TARGET_HOST, TARGET_STR, VALIDITY_DAYS,
};

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// Default value
    Default,
    /// From configuration file
    File,
    /// From environment variable
    Environment,
    /// From command line argument
    CommandLine,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Default => write!(f, "default"),
            ValueSource::File => write!(f, "file"),
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<Option<SocketAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(addr_str) => parse_socket_addr(&addr_str)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Configuration values
///
/// Every field is optional so that partial sources (a file that only sets
/// `target`, a single environment variable) can be layered on top of each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigValues {
    // --- Network settings ---

    /// TLS listen address (host:port)
    #[serde(default, deserialize_with = "deserialize_socket_addr")]
    pub listen: Option<SocketAddr>,

    /// Plaintext target (host:port); resolved on every dial
    #[serde(default)]
    pub target: Option<String>,

    /// Target dial timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<u64>,

    /// Copy buffer size per direction, in bytes
    #[serde(default)]
    pub buffer_size: Option<usize>,

    /// How long shutdown waits for in-flight relays, in seconds
    #[serde(default)]
    pub drain_timeout: Option<u64>,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,

    // --- Identity settings ---

    /// Directory the generated certificate and key are written to
    #[serde(default)]
    pub cert_dir: Option<PathBuf>,

    /// RSA key size
    #[serde(default)]
    pub key_bits: Option<u32>,

    /// Certificate validity in days
    #[serde(default)]
    pub validity_days: Option<u32>,
}

/// Proxy configuration
///
/// Resolved configuration values plus where each of them came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Configuration values
    pub values: ConfigValues,

    /// Configuration file path
    pub config_file: Option<PathBuf>,

    /// Source tracking for configuration values
    pub sources: HashMap<String, ValueSource>,
}

impl Deref for ProxyConfig {
    type Target = ConfigValues;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl Serialize for ProxyConfig {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.values.serialize(serializer)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let mut config = Self::empty();
        config.set_default_values();
        config
    }
}

impl ProxyConfig {
    /// Configuration without any value set (not even defaults)
    pub fn empty() -> Self {
        Self {
            values: ConfigValues::default(),
            config_file: None,
            sources: HashMap::new(),
        }
    }

    /// Wrap values coming from a single source
    pub fn from_values(values: ConfigValues, source: ValueSource) -> Self {
        let mut config = Self::empty();
        for name in values.present_fields() {
            config.sources.insert(name.to_string(), source);
        }
        config.values = values;
        config
    }

    /// Configuration for the two values the relay core consumes
    ///
    /// Listens on every interface at `listen_port` and forwards to
    /// `localhost:target_port`; everything else keeps its default.
    pub fn for_ports(listen_port: u16, target_port: u16) -> Self {
        let values = ConfigValues {
            listen: Some(SocketAddr::from(([0, 0, 0, 0], listen_port))),
            target: Some(format!("{}:{}", TARGET_HOST, target_port)),
            ..ConfigValues::default()
        };

        let mut config = Self::from_values(values, ValueSource::CommandLine);
        config.set_default_values();
        config
    }

    /// Set default values for all configuration options
    pub fn set_default_values(&mut self) {
        macro_rules! default_field {
            ($name:ident, $value:expr) => {
                if self.values.$name.is_none() {
                    self.values.$name = Some($value);
                    self.sources.insert(stringify!($name).to_string(), ValueSource::Default);
                }
            };
        }

        default_field!(listen, defaults::listen());
        default_field!(target, TARGET_STR.to_string());
        default_field!(connect_timeout, CONNECT_TIMEOUT_SECS);
        default_field!(buffer_size, BUFFER_SIZE);
        default_field!(drain_timeout, DRAIN_TIMEOUT_SECS);
        default_field!(log_level, LOG_LEVEL_STR.to_string());
        default_field!(cert_dir, PathBuf::from(CERT_DIR_STR));
        default_field!(key_bits, KEY_BITS);
        default_field!(validity_days, VALIDITY_DAYS);
    }

    /// Get the source of a configuration value
    pub fn source(&self, name: &str) -> String {
        self.sources
            .get(name)
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get the listen address
    pub fn listen(&self) -> SocketAddr {
        self.values.listen.unwrap_or_else(defaults::listen)
    }

    /// Get the target address
    pub fn target(&self) -> &str {
        self.values.target.as_deref().unwrap_or(TARGET_STR)
    }

    /// Get the target dial timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.values.connect_timeout.unwrap_or(CONNECT_TIMEOUT_SECS))
    }

    /// Get the buffer size
    pub fn buffer_size(&self) -> usize {
        self.values.buffer_size.unwrap_or(BUFFER_SIZE)
    }

    /// Get the drain timeout
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.values.drain_timeout.unwrap_or(DRAIN_TIMEOUT_SECS))
    }

    /// Get the log level
    pub fn log_level(&self) -> &str {
        self.values.log_level.as_deref().unwrap_or(LOG_LEVEL_STR)
    }

    /// Get the certificate directory
    pub fn cert_dir(&self) -> &Path {
        self.values.cert_dir.as_deref().unwrap_or_else(|| Path::new(CERT_DIR_STR))
    }

    /// Path of the generated certificate
    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir().join(CERT_FILE_NAME)
    }

    /// Path of the generated private key
    pub fn key_path(&self) -> PathBuf {
        self.cert_dir().join(KEY_FILE_NAME)
    }

    /// Get the RSA key size
    pub fn key_bits(&self) -> u32 {
        self.values.key_bits.unwrap_or(KEY_BITS)
    }

    /// Get the certificate validity in days
    pub fn validity_days(&self) -> u32 {
        self.values.validity_days.unwrap_or(VALIDITY_DAYS)
    }

    /// Get the configuration file path
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Merge two configurations; values present in `other` win
    pub fn merge(&self, other: &ProxyConfig, source: ValueSource) -> Self {
        let mut result = self.clone();

        macro_rules! merge_field {
            ($name:ident) => {
                if other.values.$name.is_some() {
                    result.values.$name = other.values.$name.clone();
                    result.sources.insert(stringify!($name).to_string(), source);
                }
            };
        }

        merge_field!(listen);
        merge_field!(target);
        merge_field!(connect_timeout);
        merge_field!(buffer_size);
        merge_field!(drain_timeout);
        merge_field!(log_level);
        merge_field!(cert_dir);
        merge_field!(key_bits);
        merge_field!(validity_days);

        if let Some(path) = &other.config_file {
            result.config_file = Some(path.clone());
        }

        result
    }

    /// Log the configuration
    pub fn log(&self) {
        debug!("=== Configuration ===");
        debug!("Network settings:");
        debug!("  Listen address: {} (from {})", self.listen(), self.source("listen"));
        debug!("  Target address: {} (from {})", self.target(), self.source("target"));
        debug!("  Connect timeout: {:?} (from {})", self.connect_timeout(), self.source("connect_timeout"));
        debug!("  Buffer size: {} bytes (from {})", self.buffer_size(), self.source("buffer_size"));
        debug!("  Drain timeout: {:?} (from {})", self.drain_timeout(), self.source("drain_timeout"));

        debug!("General settings:");
        debug!("  Log level: {} (from {})", self.log_level(), self.source("log_level"));

        debug!("Identity settings:");
        debug!("  Certificate directory: {} (from {})", self.cert_dir().display(), self.source("cert_dir"));
        debug!("  Key size: {} bits (from {})", self.key_bits(), self.source("key_bits"));
        debug!("  Validity: {} days (from {})", self.validity_days(), self.source("validity_days"));

        if let Some(file) = self.config_file() {
            debug!("  Configuration file: {}", file.display());
        }

        debug!("=====================");
    }
}

impl ConfigValues {
    /// Names of the fields that hold a value
    pub fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();

        macro_rules! check_field {
            ($name:ident) => {
                if self.$name.is_some() {
                    fields.push(stringify!($name));
                }
            };
        }

        check_field!(listen);
        check_field!(target);
        check_field!(connect_timeout);
        check_field!(buffer_size);
        check_field!(drain_timeout);
        check_field!(log_level);
        check_field!(cert_dir);
        check_field!(key_bits);
        check_field!(validity_days);

        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();

        assert_eq!(config.listen().to_string(), "0.0.0.0:5671");
        assert_eq!(config.target(), "localhost:5672");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.buffer_size(), 8192);
        assert_eq!(config.drain_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.cert_dir(), Path::new("docker/service-bus/certs"));
        assert_eq!(config.key_bits(), 2048);
        assert_eq!(config.validity_days(), 365);
        assert_eq!(config.source("listen"), "default");
    }

    #[test]
    fn test_identity_paths() {
        let config = ProxyConfig::default();

        assert_eq!(
            config.cert_path(),
            Path::new("docker/service-bus/certs/servicebus-proxy.crt")
        );
        assert_eq!(
            config.key_path(),
            Path::new("docker/service-bus/certs/servicebus-proxy.key")
        );
    }

    #[test]
    fn test_for_ports() {
        let config = ProxyConfig::for_ports(15671, 15672);

        assert_eq!(config.listen().port(), 15671);
        assert!(config.listen().ip().is_unspecified());
        assert_eq!(config.target(), "localhost:15672");
        assert_eq!(config.source("target"), "command line");
        assert_eq!(config.source("buffer_size"), "default");
    }

    #[test]
    fn test_merge_tracks_sources() {
        let base = ProxyConfig::default();
        let file = ProxyConfig::from_values(
            ConfigValues {
                target: Some("emulator:5672".to_string()),
                buffer_size: Some(16384),
                ..ConfigValues::default()
            },
            ValueSource::File,
        );

        let merged = base.merge(&file, ValueSource::File);

        assert_eq!(merged.target(), "emulator:5672");
        assert_eq!(merged.buffer_size(), 16384);
        assert_eq!(merged.source("target"), "file");
        assert_eq!(merged.source("listen"), "default");
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<ConfigValues>(r#"{"listen": "127.0.0.1:5671", "bogus": 1}"#);
        assert!(parsed.is_err());

        let parsed: ConfigValues = serde_json::from_str(r#"{"listen": "127.0.0.1:5671"}"#).unwrap();
        assert_eq!(parsed.listen, Some("127.0.0.1:5671".parse().unwrap()));
        assert_eq!(parsed.present_fields(), vec!["listen"]);
    }
}
