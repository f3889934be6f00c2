//! Configuration module
//!
//! Layered configuration: defaults, an optional JSON file, `SERVICEBUS_PROXY_*`
//! environment variables and command line flags, in increasing priority.
//! Each resolved value remembers which layer supplied it.

pub mod builder;
pub mod defaults;
pub mod error;
pub mod source;
pub mod types;
pub mod validator;

pub use builder::{load_config, ConfigBuilder};
pub use defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use error::ConfigError;
pub use source::ConfigSource;
pub use types::{ConfigValues, ProxyConfig, ValueSource};
pub use validator::{check_warnings, validate_config};
