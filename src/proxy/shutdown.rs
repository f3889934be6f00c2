//! Process-wide shutdown signal
//!
//! A single flag observed by the accept loop and by every relay. Triggering is
//! idempotent and wakes every waiter, including ones that start waiting later.

use std::sync::Arc;
use tokio::sync::watch;

/// Broadcast, idempotent cancellation flag
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Fire the signal
    ///
    /// Returns `true` only for the call that actually flipped it.
    pub fn trigger(&self) -> bool {
        !self.sender.send_replace(true)
    }

    /// Non-blocking check
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait until the signal fires; returns immediately if it already has
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
