//! Proxy service implementation
//!
//! Lifecycle of the relay: provision the identity, build the TLS server
//! configuration, bind, and run the accept loop on its own task. The returned
//! [`ProxyHandle`] stops it.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::common::{ProxyError, Result};
use crate::config::{validate_config, ProxyConfig};
use crate::tls::{create_tls_acceptor, CertificateProvisioner};
use super::handler::RelaySettings;
use super::server::RelayListener;
use super::shutdown::ShutdownSignal;

/// Proxy service trait
///
/// Starting consumes the service and hands back the only way to control it.
pub trait ProxyService {
    /// Start the proxy service
    ///
    /// Returns once the listener is bound. Fatal startup errors (invalid
    /// configuration, identity generation, persistence, bind) are returned here.
    ///
    /// Blocks the calling thread while the RSA key is generated; async callers
    /// should prefer [`StandardProxyService::spawn`].
    fn start(self) -> Result<ProxyHandle>;
}

/// Standard proxy service implementation
pub struct StandardProxyService {
    /// Proxy configuration
    config: Arc<ProxyConfig>,
    /// Signal shared with the listener and every relay
    shutdown: ShutdownSignal,
}

impl StandardProxyService {
    /// Create a new proxy service
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self {
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Use an existing shutdown signal instead of a fresh one
    pub fn with_shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Start on the blocking pool so key generation does not stall a runtime worker
    pub async fn spawn(self) -> Result<ProxyHandle> {
        tokio::task::spawn_blocking(move || self.start())
            .await
            .map_err(|e| ProxyError::Other(format!("Proxy startup task failed: {}", e)))?
    }
}

impl ProxyService for StandardProxyService {
    fn start(self) -> Result<ProxyHandle> {
        validate_config(&self.config)?;

        let identity = CertificateProvisioner::from_config(&self.config).provision()?;
        let tls_acceptor = create_tls_acceptor(&identity)?;

        let listener = RelayListener::bind(
            self.config.listen(),
            tls_acceptor,
            RelaySettings::from_config(&self.config),
            self.config.drain_timeout(),
        )?;
        let local_addr = listener.local_addr();

        let task = tokio::spawn(listener.run(self.shutdown.clone()));
        debug!("Proxy task started for {}", local_addr);

        Ok(ProxyHandle {
            local_addr,
            shutdown: self.shutdown,
            task,
        })
    }
}

/// Handle to a running proxy
#[derive(Debug)]
pub struct ProxyHandle {
    /// Address the listener is bound to
    local_addr: SocketAddr,
    /// Stops the listener and every relay
    shutdown: ShutdownSignal,
    /// Accept loop task
    task: JoinHandle<Result<()>>,
}

impl ProxyHandle {
    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A clone of the signal that stops this proxy
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Request shutdown
    ///
    /// Safe to call any number of times; only the first call has an effect.
    pub fn stop(&self) {
        if self.shutdown.trigger() {
            info!("Stopping proxy on {}", self.local_addr);
        } else {
            debug!("Proxy on {} is already stopping", self.local_addr);
        }
    }

    /// Whether the accept loop and drain have finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the accept loop and drain have finished
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ProxyError::Other(format!("Proxy task failed: {}", e))),
        }
    }

    /// Stop and wait
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.wait().await
    }
}

/// Run the proxy until Ctrl+C or SIGTERM
pub async fn run_proxy(config: Arc<ProxyConfig>) -> Result<()> {
    let handle = StandardProxyService::new(config).spawn().await?;
    let shutdown = handle.shutdown_signal();

    let signals = tokio::spawn(async move {
        wait_for_termination().await;
        if shutdown.trigger() {
            info!("Termination signal received, shutting down");
        }
    });

    let result = handle.wait().await;
    signals.abort();

    if let Err(e) = &result {
        error!("Proxy stopped with error: {}", e);
    }
    result
}

/// Run the proxy with default settings on the given ports
///
/// Listens on `0.0.0.0:listen_port` and forwards to `localhost:target_port`.
pub async fn run_ports(listen_port: u16, target_port: u16) -> Result<()> {
    run_proxy(Arc::new(ProxyConfig::for_ports(listen_port, target_port))).await
}

/// Resolve on Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValues, ValueSource};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn test_config(cert_dir: &std::path::Path) -> Arc<ProxyConfig> {
        let values = ConfigValues {
            listen: Some("127.0.0.1:0".parse().unwrap()),
            target: Some("127.0.0.1:1".to_string()),
            cert_dir: Some(cert_dir.to_path_buf()),
            drain_timeout: Some(1),
            ..ConfigValues::default()
        };
        let mut config = ProxyConfig::from_values(values, ValueSource::CommandLine);
        config.set_default_values();
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = tempdir().unwrap();
        let handle = StandardProxyService::new(test_config(dir.path())).start().unwrap();

        assert_ne!(handle.local_addr().port(), 0);
        assert!(dir.path().join("servicebus-proxy.crt").exists());
        assert!(dir.path().join("servicebus-proxy.key").exists());

        handle.stop();
        handle.stop();
        timeout(Duration::from_secs(2), handle.wait())
            .await
            .expect("proxy should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_external_shutdown_signal() {
        let dir = tempdir().unwrap();
        let signal = ShutdownSignal::new();
        let handle = StandardProxyService::new(test_config(dir.path()))
            .with_shutdown_signal(signal.clone())
            .start()
            .unwrap();

        signal.trigger();
        timeout(Duration::from_secs(2), handle.wait())
            .await
            .expect("proxy should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_when_port_taken() {
        let dir = tempdir().unwrap();
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

        let values = ConfigValues {
            listen: Some(held.local_addr().unwrap()),
            cert_dir: Some(dir.path().to_path_buf()),
            ..ConfigValues::default()
        };
        let mut config = ProxyConfig::from_values(values, ValueSource::CommandLine);
        config.set_default_values();

        let result = StandardProxyService::new(Arc::new(config)).start();
        assert!(matches!(result, Err(ProxyError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_start_rejects_relay_into_itself() {
        let port = {
            let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            reserved.local_addr().unwrap().port()
        };
        let config = Arc::new(ProxyConfig::for_ports(port, port));

        let result = StandardProxyService::new(config).start();
        assert!(matches!(result, Err(ProxyError::Config(_))));

        // Nothing was bound
        assert!(std::net::TcpListener::bind(("0.0.0.0", port)).is_ok());
    }

    #[tokio::test]
    async fn test_run_ports_rejects_relay_into_itself() {
        let result = timeout(Duration::from_secs(2), run_ports(15999, 15999))
            .await
            .expect("invalid configuration must fail fast");
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }

    #[tokio::test]
    async fn test_spawn_on_blocking_pool() {
        let dir = tempdir().unwrap();
        let handle = StandardProxyService::new(test_config(dir.path()))
            .spawn()
            .await
            .unwrap();

        assert_ne!(handle.local_addr().port(), 0);
        timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("proxy should stop promptly")
            .unwrap();
    }
}
