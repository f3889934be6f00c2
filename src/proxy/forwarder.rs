//! Data forwarding module
//!
//! Copies bytes between the decrypted client stream and the plaintext target
//! stream, one task per direction. The first direction to finish (or the
//! shutdown signal) ends the relay and both sockets are closed.

use log::debug;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinHandle};

use super::shutdown::ShutdownSignal;

/// Direction of a copy task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Decrypted client bytes going to the target
    ClientToTarget,
    /// Target bytes going back to the client
    TargetToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToTarget => write!(f, "client -> target"),
            Direction::TargetToClient => write!(f, "target -> client"),
        }
    }
}

/// Why a relay ended
#[derive(Debug)]
pub enum RelayOutcome {
    /// The client closed its side
    ClientClosed,
    /// The target closed its side
    TargetClosed,
    /// A genuine I/O error in one direction
    Failed(Direction, io::Error),
    /// A copy task died without reporting
    TaskFailed(Direction, JoinError),
    /// Shutdown was requested while the relay was active
    Shutdown,
}

/// Which end of a copy task went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyEnd {
    /// Reading hit end of stream
    SourceClosed,
    /// Writing found the destination gone
    DestinationClosed,
}

/// Result of a finished relay
#[derive(Debug)]
pub struct RelayReport {
    /// Why the relay ended
    pub outcome: RelayOutcome,
    /// Bytes written to the target
    pub client_to_target: u64,
    /// Bytes written to the client
    pub target_to_client: u64,
}

/// Forward data between the client and the target until either side closes
///
/// # Parameters
///
/// * `client_stream` - Decrypted client stream (TLS already established)
/// * `target_stream` - Plaintext target connection
/// * `buffer_size` - Copy buffer size per direction
/// * `shutdown` - Ends the relay early when triggered
///
/// Both streams are closed when this returns.
pub async fn proxy_data<S>(
    client_stream: S,
    target_stream: TcpStream,
    buffer_size: usize,
    shutdown: &ShutdownSignal,
) -> RelayReport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_reader, client_writer) = tokio::io::split(client_stream);
    let (target_reader, target_writer) = target_stream.into_split();

    let sent = Arc::new(AtomicU64::new(0));
    let received = Arc::new(AtomicU64::new(0));

    let mut client_to_target = tokio::spawn(copy_stream(
        client_reader,
        target_writer,
        buffer_size,
        Arc::clone(&sent),
    ));
    let mut target_to_client = tokio::spawn(copy_stream(
        target_reader,
        client_writer,
        buffer_size,
        Arc::clone(&received),
    ));

    let outcome = tokio::select! {
        result = &mut client_to_target => {
            stop_task(target_to_client).await;
            outcome_of(Direction::ClientToTarget, result)
        }
        result = &mut target_to_client => {
            stop_task(client_to_target).await;
            outcome_of(Direction::TargetToClient, result)
        }
        _ = shutdown.wait() => {
            stop_task(client_to_target).await;
            stop_task(target_to_client).await;
            RelayOutcome::Shutdown
        }
    };

    RelayReport {
        outcome,
        client_to_target: sent.load(Ordering::Relaxed),
        target_to_client: received.load(Ordering::Relaxed),
    }
}

/// Abort a copy task and wait until it has dropped its socket half
async fn stop_task(task: JoinHandle<io::Result<CopyEnd>>) {
    task.abort();
    let _ = task.await;
}

fn outcome_of(direction: Direction, result: Result<io::Result<CopyEnd>, JoinError>) -> RelayOutcome {
    match result {
        Ok(Ok(end)) => match (direction, end) {
            (Direction::ClientToTarget, CopyEnd::SourceClosed)
            | (Direction::TargetToClient, CopyEnd::DestinationClosed) => RelayOutcome::ClientClosed,
            (Direction::TargetToClient, CopyEnd::SourceClosed)
            | (Direction::ClientToTarget, CopyEnd::DestinationClosed) => RelayOutcome::TargetClosed,
        },
        Ok(Err(e)) => RelayOutcome::Failed(direction, e),
        Err(e) => RelayOutcome::TaskFailed(direction, e),
    }
}

/// Copy one direction until end of stream
///
/// On a clean end of stream the destination's write side is shut down so the
/// peer sees the close too. A destination that went away is reported as such,
/// not as an end of stream.
async fn copy_stream<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    transferred: Arc<AtomicU64>,
) -> io::Result<CopyEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let n = match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if is_clean_close(&e) => break,
            Err(e) => return Err(e),
        };

        match writer.write_all(&buffer[..n]).await {
            Ok(()) => {}
            Err(e) if is_clean_close(&e) => {
                debug!("Destination closed: {}", e);
                return Ok(CopyEnd::DestinationClosed);
            }
            Err(e) => return Err(e),
        }
        transferred.fetch_add(n as u64, Ordering::Relaxed);
    }

    debug!("End of stream after {} bytes", transferred.load(Ordering::Relaxed));
    let _ = writer.shutdown().await;
    Ok(CopyEnd::SourceClosed)
}

/// Errors that mean "the peer went away" rather than a relay failure
pub fn is_clean_close(error: &io::Error) -> bool {
    match error.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => true,
        // OpenSSL 3 reports a missing close_notify as a protocol error
        _ => error.to_string().to_lowercase().contains("unexpected eof"),
    }
}
