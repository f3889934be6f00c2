//! Configuration builder
//!
//! This module provides a builder pattern for constructing configuration.

use log::debug;
use std::path::Path;

use crate::config::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use crate::config::error::Result;
use crate::config::source::{ConfigSource, DefaultSource, EnvSource, FileSource, ValuesSource};
use crate::config::types::{ConfigValues, ProxyConfig, ValueSource};
use crate::config::validator::validate_config;

/// Configuration builder
///
/// Sources are applied in the order they are added; later sources win.
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    validate: bool,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            validate: true,
        }
    }

    /// Add default source
    pub fn with_defaults(mut self) -> Self {
        debug!("Adding default configuration source");
        self.sources.push(Box::new(DefaultSource));
        self
    }

    /// Add file source
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        debug!("Adding file configuration source: {}", path.display());
        self.sources.push(Box::new(FileSource::new(path)));
        self
    }

    /// Add environment source
    pub fn with_env(mut self, prefix: &str) -> Self {
        debug!("Adding environment configuration source with prefix: {}", prefix);
        self.sources.push(Box::new(EnvSource::new(prefix)));
        self
    }

    /// Add command line values
    pub fn with_cli(mut self, values: ConfigValues) -> Self {
        debug!("Adding command line configuration source");
        self.sources.push(Box::new(ValuesSource::new(values, ValueSource::CommandLine)));
        self
    }

    /// Disable validation
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ProxyConfig> {
        let mut config = ProxyConfig::empty();

        debug!("Building configuration from {} sources", self.sources.len());

        for source in self.sources {
            let source_type = source.source_type();
            debug!("Loading configuration from source: {:?}", source_type);

            let source_config = source.load()?;
            config = config.merge(&source_config, source_type);
        }

        // Anything no source provided falls back to defaults
        config.set_default_values();

        if self.validate {
            debug!("Validating configuration");
            validate_config(&config)?;
        }

        config.log();

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
            .with_defaults()
            .with_file(DEFAULT_CONFIG_FILE)
            .with_env(ENV_PREFIX)
    }
}

/// Load configuration with the standard priority
///
/// 1. Default values (lowest priority)
/// 2. Configuration file (if it exists)
/// 3. Environment variables
/// 4. Command line arguments (highest priority)
pub fn load_config(config_file: Option<&Path>, cli: ConfigValues) -> Result<ProxyConfig> {
    let config_file = config_file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    ConfigBuilder::new()
        .with_defaults()
        .with_file(config_file)
        .with_env(ENV_PREFIX)
        .with_cli(cli)
        .build()
}
