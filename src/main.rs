//! Service Bus Proxy Command Line Tool
//!
//! This binary is the command-line interface for Service Bus Proxy.

use clap::Parser;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use servicebus_proxy::common::{check_port, init_logger, parse_socket_addr, set_log_level, Result};
use servicebus_proxy::config::{load_config, ConfigValues, ENV_PREFIX};
use servicebus_proxy::{run_proxy, APP_NAME, VERSION};

/// Service Bus Proxy: TLS termination for the local Service Bus emulator
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// TLS listen address [default: 0.0.0.0:5671]
    #[clap(short, long, value_parser = parse_listen)]
    listen: Option<SocketAddr>,

    /// Listen on 0.0.0.0 with this port (ignored when --listen is given)
    #[clap(long)]
    listen_port: Option<u16>,

    /// Plaintext target as host:port [default: localhost:5672]
    #[clap(short, long)]
    target: Option<String>,

    /// Forward to localhost with this port (ignored when --target is given)
    #[clap(long)]
    target_port: Option<u16>,

    /// Directory for the generated certificate and key
    #[clap(long)]
    cert_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,

    /// Target dial timeout in seconds
    #[clap(long)]
    connect_timeout: Option<u64>,

    /// Copy buffer size per direction, in bytes
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Seconds to wait for active connections on shutdown
    #[clap(long)]
    drain_timeout: Option<u64>,

    /// Load configuration from a file [default: config.json]
    #[clap(long)]
    config_file: Option<PathBuf>,
}

fn parse_listen(value: &str) -> std::result::Result<SocketAddr, String> {
    parse_socket_addr(value).map_err(|e| e.to_string())
}

impl Args {
    /// Command line layer of the configuration; unset flags stay `None`
    fn into_values(self) -> (Option<PathBuf>, ConfigValues) {
        let listen = self
            .listen
            .or_else(|| self.listen_port.map(|port| SocketAddr::from(([0, 0, 0, 0], port))));
        let target = self
            .target
            .or_else(|| self.target_port.map(|port| format!("localhost:{}", port)));

        let values = ConfigValues {
            listen,
            target,
            connect_timeout: self.connect_timeout,
            buffer_size: self.buffer_size,
            drain_timeout: self.drain_timeout,
            log_level: self.log_level,
            cert_dir: self.cert_dir,
            key_bits: None,
            validity_days: None,
        };

        (self.config_file, values)
    }
}

/// Level used while configuration is loading: command line, then environment
fn startup_log_level(cli: &ConfigValues) -> String {
    cli.log_level
        .clone()
        .or_else(|| std::env::var(format!("{}LOG_LEVEL", ENV_PREFIX)).ok())
        .unwrap_or_else(|| "info".to_string())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let (config_file, cli) = args.into_values();

    // Installed before loading so configuration warnings are visible
    init_logger(&startup_log_level(&cli));
    let config = load_config(config_file.as_deref(), cli)?;
    set_log_level(config.log_level());

    info!("Starting {} v{}", APP_NAME, VERSION);
    config.log();

    if !check_port(config.target(), config.connect_timeout()).await {
        warn!(
            "Target {} is not reachable yet; connections will fail until it is up",
            config.target()
        );
    }

    info!("Proxy service starting, press Ctrl+C to stop");
    run_proxy(Arc::new(config)).await?;

    info!("Proxy service stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_log_level_prefers_command_line() {
        let cli = ConfigValues {
            log_level: Some("debug".to_string()),
            ..ConfigValues::default()
        };
        assert_eq!(startup_log_level(&cli), "debug");
    }

    #[test]
    fn test_port_shorthands() {
        let args = Args::parse_from(["servicebus-proxy", "--listen-port", "15671", "--target-port", "15672"]);
        let (config_file, values) = args.into_values();

        assert!(config_file.is_none());
        assert_eq!(values.listen, Some("0.0.0.0:15671".parse().unwrap()));
        assert_eq!(values.target.as_deref(), Some("localhost:15672"));
    }
}
