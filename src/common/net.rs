//! Network utility functions
//!
//! This module provides utility functions for network operations.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use super::error::{ProxyError, Result};

/// Parse a socket address
///
/// Accepts a literal `ip:port` first and falls back to name resolution
/// (`localhost:5671`).
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| ProxyError::Config(format!("Failed to parse address: {}", addr))),
        Err(e) => Err(ProxyError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Split a `host:port` target into its parts without resolving it
///
/// Bracketed IPv6 literals (`[::1]:5672`) are supported. The port must be non-zero.
pub fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let invalid = || ProxyError::Config(format!("Invalid host:port address: {}", addr));

    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() || (host.contains(':') && !addr.starts_with('[')) {
        return Err(invalid());
    }

    let port: u16 = port.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }

    Ok((host.to_string(), port))
}

/// Check whether something is accepting TCP connections at `addr`
///
/// The connection is closed immediately after it is established.
pub async fn check_port(addr: &str, connect_timeout: Duration) -> bool {
    matches!(
        timeout(connect_timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_socket_addr() {
        let addr = parse_socket_addr("127.0.0.1:8080");
        assert!(addr.is_ok(), "Should be able to parse a valid address");
        assert_eq!(addr.unwrap().port(), 8080);

        let addr = parse_socket_addr("invalid-address");
        assert!(addr.is_err(), "Should fail to parse an invalid address");
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("localhost:5672").unwrap(),
            ("localhost".to_string(), 5672)
        );
        assert_eq!(split_host_port("[::1]:5672").unwrap(), ("::1".to_string(), 5672));

        assert!(split_host_port("localhost").is_err());
        assert!(split_host_port("localhost:0").is_err());
        assert!(split_host_port(":5672").is_err());
        assert!(split_host_port("::1:5672").is_err());
        assert!(split_host_port("localhost:amqp").is_err());
    }

    #[tokio::test]
    async fn test_check_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(check_port(&addr.to_string(), Duration::from_secs(1)).await);

        drop(listener);
        assert!(!check_port(&addr.to_string(), Duration::from_secs(1)).await);
    }
}
