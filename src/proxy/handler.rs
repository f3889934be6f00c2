//! Connection handler module
//!
//! Drives one accepted client: TLS handshake, target dial, relay.

use log::{debug, error, info, warn};
use openssl::ssl::{Ssl, SslAcceptor};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;

use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;
use super::forwarder::{proxy_data, RelayOutcome};
use super::shutdown::ShutdownSignal;

/// Per-connection settings shared by every relay
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Plaintext target as `host:port`, resolved on every dial
    pub target: String,
    /// Upper bound on the target dial
    pub connect_timeout: Duration,
    /// Copy buffer size per direction
    pub buffer_size: usize,
}

impl RelaySettings {
    /// Take the relay settings out of a loaded configuration
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            target: config.target().to_string(),
            connect_timeout: config.connect_timeout(),
            buffer_size: config.buffer_size(),
        }
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A client connection being relayed
#[derive(Debug, Clone)]
pub struct ActiveConnection {
    /// Process-unique id, used to correlate log lines
    pub id: u64,
    /// Client address
    pub peer: SocketAddr,
    /// Target the connection is relayed to
    pub target: String,
    /// When the client was accepted
    pub started: Instant,
}

impl ActiveConnection {
    /// Register a newly accepted client
    pub fn new(peer: SocketAddr, target: &str) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            target: target.to_string(),
            started: Instant::now(),
        }
    }
}

/// Handle a single client connection
///
/// Failures are confined to this connection: they are logged and the sockets
/// are closed, nothing is propagated to the accept loop.
pub async fn handle_connection(
    client_stream: TcpStream,
    connection: ActiveConnection,
    tls_acceptor: Arc<SslAcceptor>,
    settings: Arc<RelaySettings>,
    shutdown: ShutdownSignal,
) {
    let id = connection.id;

    let stream = tokio::select! {
        result = accept_tls(client_stream, &tls_acceptor) => match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[{}] TLS handshake with {} failed: {}", id, connection.peer, e);
                return;
            }
        },
        _ = shutdown.wait() => {
            debug!("[{}] Shutdown during TLS handshake with {}", id, connection.peer);
            return;
        }
    };
    debug!("[{}] TLS handshake with {} complete", id, connection.peer);

    let target_stream = match connect_target(&settings).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                "[{}] Failed to connect to target {} for {}: {}",
                id, settings.target, connection.peer, e
            );
            close_client(stream, settings.connect_timeout).await;
            return;
        }
    };
    info!(
        "[{}] Connected {} to target {}",
        id, connection.peer, settings.target
    );

    let report = proxy_data(stream, target_stream, settings.buffer_size, &shutdown).await;

    match &report.outcome {
        RelayOutcome::ClientClosed => debug!("[{}] Client closed the connection", id),
        RelayOutcome::TargetClosed => debug!("[{}] Target closed the connection", id),
        RelayOutcome::Shutdown => debug!("[{}] Relay closed by shutdown", id),
        RelayOutcome::Failed(direction, e) => {
            warn!("[{}] Error copying {}: {}", id, direction, e)
        }
        RelayOutcome::TaskFailed(direction, e) => {
            error!("[{}] Copy task {} failed: {}", id, direction, e)
        }
    }
    debug!(
        "[{}] {} bytes client -> target, {} bytes target -> client",
        id, report.client_to_target, report.target_to_client
    );
    info!(
        "[{}] Connection from {} closed after {:.1?}",
        id,
        connection.peer,
        connection.started.elapsed()
    );
}

/// Run the server side of the TLS handshake on an accepted socket
async fn accept_tls(client_stream: TcpStream, acceptor: &SslAcceptor) -> Result<SslStream<TcpStream>> {
    let ssl = Ssl::new(acceptor.context())?;
    let mut stream = SslStream::new(ssl, client_stream)?;

    Pin::new(&mut stream)
        .accept()
        .await
        .map_err(|e| ProxyError::TlsHandshake(e.to_string()))?;

    Ok(stream)
}

/// Dial the target, bounded by the connect timeout
async fn connect_target(settings: &RelaySettings) -> Result<TcpStream> {
    let stream = timeout(settings.connect_timeout, TcpStream::connect(settings.target.as_str()))
        .await
        .map_err(|_| {
            ProxyError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connection timed out after {:?}", settings.connect_timeout),
            ))
        })??;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY on target connection: {}", e);
    }

    Ok(stream)
}

/// Send close_notify and drop the client
async fn close_client(mut stream: SslStream<TcpStream>, limit: Duration) {
    let _ = timeout(limit, stream.shutdown()).await;
}
