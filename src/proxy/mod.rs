//! Proxy service module
//!
//! TLS termination in front of the plaintext target: the listener, the
//! per-connection relay and the lifecycle that ties them together.

pub mod server;
mod handler;
mod forwarder;
mod service;
mod shutdown;

pub use server::RelayListener;
pub use handler::{handle_connection, ActiveConnection, RelaySettings};
pub use forwarder::{proxy_data, Direction, RelayOutcome, RelayReport};
pub use service::{
    run_ports, run_proxy, wait_for_termination, ProxyHandle, ProxyService, StandardProxyService,
};
pub use shutdown::ShutdownSignal;
