//! Service Bus Proxy: TLS termination for a local Service Bus emulator
//!
//! Clients speak AMQP over TLS to the proxy (port 5671 by default); the proxy
//! terminates TLS with a freshly generated self-signed certificate and relays
//! the plaintext bytes to the emulator (`localhost:5672` by default).
//!
//! # Main Features
//!
//! - Self-signed identity generated and written to disk on every start
//! - One independent relay per client connection
//! - Cooperative shutdown that closes the listener and every active relay
//! - Layered configuration (defaults, JSON file, environment, command line)
//!
//! # Example
//!
//! ```no_run
//! use servicebus_proxy::{ProxyConfig, ProxyService, Result, StandardProxyService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(ProxyConfig::for_ports(5671, 5672));
//!
//!     let handle = StandardProxyService::new(config).start()?;
//!     println!("listening on {}", handle.local_addr());
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod proxy;
pub mod tls;

// Re-export commonly used structures and functions for convenience
pub use common::{ProxyError, Result, parse_socket_addr};
pub use config::ProxyConfig;
pub use proxy::{run_ports, run_proxy, ProxyHandle, ProxyService, ShutdownSignal, StandardProxyService};
pub use tls::{create_tls_acceptor, CertificateProvisioner, Identity};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
