//! Default configuration values
//!
//! Single source of truth for defaults.

use std::net::SocketAddr;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "SERVICEBUS_PROXY_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default listen port (amqps)
pub const LISTEN_PORT: u16 = 5671;

/// Default target address (plaintext amqp on the emulator)
pub const TARGET_STR: &str = "localhost:5672";

/// Host used when only a target port is given
pub const TARGET_HOST: &str = "localhost";

/// Default log level
pub const LOG_LEVEL_STR: &str = "info";

/// Directory the generated identity is written to
pub const CERT_DIR_STR: &str = "docker/service-bus/certs";

/// Certificate file name inside the certificate directory
pub const CERT_FILE_NAME: &str = "servicebus-proxy.crt";

/// Private key file name inside the certificate directory
pub const KEY_FILE_NAME: &str = "servicebus-proxy.key";

/// Target dial timeout in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Per-direction copy buffer in bytes
pub const BUFFER_SIZE: usize = 8192;

/// Time shutdown waits for in-flight relays, in seconds
pub const DRAIN_TIMEOUT_SECS: u64 = 30;

/// RSA modulus size
pub const KEY_BITS: u32 = 2048;

/// Smallest RSA modulus accepted by validation
pub const MIN_KEY_BITS: u32 = 2048;

/// Certificate validity window in days
pub const VALIDITY_DAYS: u32 = 365;

/// Default listen address: every interface on the amqps port
pub fn listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], LISTEN_PORT))
}

/// Log levels understood by the logger
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
