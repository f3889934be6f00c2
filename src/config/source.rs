//! Configuration sources
//!
//! This module defines traits and implementations for loading configuration
//! from different sources.

use log::{debug, warn};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::common::parse_socket_addr;
use crate::config::error::{ConfigError, Result};
use crate::config::types::{ConfigValues, ProxyConfig, ValueSource};

/// Configuration source trait
pub trait ConfigSource {
    /// Load configuration from this source
    fn load(&self) -> Result<ProxyConfig>;

    /// Get the source type
    fn source_type(&self) -> ValueSource;
}

/// Default configuration source
pub struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading default configuration");
        Ok(ProxyConfig::default())
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Default
    }
}

/// JSON file configuration source
///
/// A missing file is not an error; it contributes nothing.
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    /// Create a new file source
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from file: {}", self.path.display());

        if !self.path.exists() {
            warn!("Configuration file not found: {}", self.path.display());
            return Ok(ProxyConfig::empty());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::FileReadError(self.path.clone(), e.to_string()))?;

        let values: ConfigValues = serde_json::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("Error parsing {}: {}", self.path.display(), e))
        })?;

        let mut config = ProxyConfig::from_values(values, self.source_type());
        config.config_file = Some(self.path.clone());

        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::File
    }
}

/// Environment variable configuration source
///
/// Reads `<prefix>LISTEN`, `<prefix>TARGET`, ... Values that do not parse are
/// reported and skipped.
pub struct EnvSource {
    pub prefix: String,
}

impl EnvSource {
    /// Create a new environment source
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn var(&self, name: &str) -> Option<(String, String)> {
        let full_name = format!("{}{}", self.prefix, name);
        env::var(&full_name).ok().map(|value| (full_name, value))
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        let (full_name, value) = self.var(name)?;
        debug!("Found environment variable {}={}", full_name, value);

        match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("Invalid value in environment variable {}: {}", full_name, value);
                None
            }
        }
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from environment variables with prefix: {}", self.prefix);

        let listen = self.var("LISTEN").and_then(|(full_name, value)| {
            match parse_socket_addr(&value) {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!("Invalid value in environment variable {}: {}", full_name, value);
                    None
                }
            }
        });

        let values = ConfigValues {
            listen,
            target: self.var("TARGET").map(|(_, value)| value),
            connect_timeout: self.parsed("CONNECT_TIMEOUT"),
            buffer_size: self.parsed("BUFFER_SIZE"),
            drain_timeout: self.parsed("DRAIN_TIMEOUT"),
            log_level: self.var("LOG_LEVEL").map(|(_, value)| value),
            cert_dir: self.var("CERT_DIR").map(|(_, value)| PathBuf::from(value)),
            key_bits: self.parsed("KEY_BITS"),
            validity_days: self.parsed("VALIDITY_DAYS"),
        };

        Ok(ProxyConfig::from_values(values, self.source_type()))
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Environment
    }
}

/// Already-parsed values, e.g. command line flags
pub struct ValuesSource {
    values: ConfigValues,
    source: ValueSource,
}

impl ValuesSource {
    /// Create a source that yields `values` attributed to `source`
    pub fn new(values: ConfigValues, source: ValueSource) -> Self {
        Self { values, source }
    }
}

impl ConfigSource for ValuesSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from {}", self.source);
        Ok(ProxyConfig::from_values(self.values.clone(), self.source))
    }

    fn source_type(&self) -> ValueSource {
        self.source
    }
}
