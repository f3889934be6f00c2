//! Proxy server module
//!
//! The TLS listener and its accept loop. Every accepted client gets its own
//! task; the loop itself never blocks on a handshake or a relay.

use log::{debug, error, info, warn};
use openssl::ssl::SslAcceptor;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};

use crate::common::{ProxyError, Result};
use super::handler::{handle_connection, ActiveConnection, RelaySettings};
use super::shutdown::ShutdownSignal;

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Pending connection queue length
const LISTEN_BACKLOG: i32 = 1024;

/// Bound TLS listener, ready to accept
pub struct RelayListener {
    /// Listening socket
    listener: TcpListener,
    /// Actual bound address (differs from the requested one for port 0)
    local_addr: SocketAddr,
    /// TLS server configuration shared by every connection
    tls_acceptor: Arc<SslAcceptor>,
    /// Relay settings shared by every connection
    settings: Arc<RelaySettings>,
    /// How long to wait for relays after shutdown before aborting them
    drain_timeout: Duration,
}

impl RelayListener {
    /// Bind the listening socket
    ///
    /// Must be called inside a Tokio runtime. Takes ownership of the TLS
    /// server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Bind`] if the address cannot be bound.
    pub fn bind(
        listen_addr: SocketAddr,
        tls_acceptor: SslAcceptor,
        settings: RelaySettings,
        drain_timeout: Duration,
    ) -> Result<Self> {
        let listener = bind_socket(listen_addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| ProxyError::Bind {
                addr: listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            tls_acceptor: Arc::new(tls_acceptor),
            settings: Arc::new(settings),
            drain_timeout,
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires, then drain
    ///
    /// After the signal the listening socket is closed before waiting on the
    /// active relays, so new clients are refused while old ones finish.
    /// Relays still running after the drain timeout are aborted.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<()> {
        let RelayListener {
            listener,
            local_addr,
            tls_acceptor,
            settings,
            drain_timeout,
        } = self;

        info!(
            "Proxy listening on {} (TLS), forwarding to {}",
            local_addr, settings.target
        );

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!("Shutdown requested, no longer accepting connections on {}", local_addr);
                    break;
                }

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(result);
                }

                accepted = listener.accept() => match accepted {
                    Ok((client_stream, peer)) => {
                        let connection = ActiveConnection::new(peer, &settings.target);
                        info!("[{}] Accepted connection from {}", connection.id, peer);

                        if let Err(e) = client_stream.set_nodelay(true) {
                            debug!("[{}] Failed to set TCP_NODELAY: {}", connection.id, e);
                        }

                        tasks.spawn(handle_connection(
                            client_stream,
                            connection,
                            Arc::clone(&tls_acceptor),
                            Arc::clone(&settings),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                        sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }

        drop(listener);
        drain(&mut tasks, drain_timeout).await;

        info!("Proxy on {} stopped", local_addr);
        Ok(())
    }
}

/// Create a reusable, non-blocking listening socket
fn bind_socket(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

/// Wait for active relays, aborting whatever outlives `limit`
async fn drain(tasks: &mut JoinSet<()>, limit: Duration) {
    if tasks.is_empty() {
        return;
    }

    info!("Waiting up to {:?} for {} active connection(s)", limit, tasks.len());

    if timeout(limit, join_all(tasks)).await.is_err() {
        warn!(
            "Drain timeout reached, aborting {} remaining connection(s)",
            tasks.len()
        );
        tasks.shutdown().await;
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        log_task_result(result);
    }
}

fn log_task_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Connection task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::{create_tls_acceptor, CertificateProvisioner};

    fn acceptor() -> SslAcceptor {
        let identity = CertificateProvisioner::new("unused").generate().unwrap();
        create_tls_acceptor(&identity).unwrap()
    }

    fn settings() -> RelaySettings {
        RelaySettings {
            target: "127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            buffer_size: 1024,
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = RelayListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            acceptor(),
            settings(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = held.local_addr().unwrap();

        let result = RelayListener::bind(addr, acceptor(), settings(), Duration::from_secs(1));
        assert!(matches!(result, Err(ProxyError::Bind { addr: a, .. }) if a == addr));
    }

    #[tokio::test]
    async fn test_run_returns_after_shutdown() {
        let listener = RelayListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            acceptor(),
            settings(),
            Duration::from_secs(1),
        )
        .unwrap();
        let addr = listener.local_addr();

        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(listener.run(shutdown.clone()));

        shutdown.trigger();
        timeout(Duration::from_secs(2), task)
            .await
            .expect("run should return promptly")
            .unwrap()
            .unwrap();

        // Listening socket is closed
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_drain_aborts_after_timeout() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async {
            sleep(Duration::from_secs(60)).await;
        });

        timeout(Duration::from_secs(2), drain(&mut tasks, Duration::from_millis(50)))
            .await
            .expect("drain should honour its limit");
        assert!(tasks.is_empty());
    }
}
