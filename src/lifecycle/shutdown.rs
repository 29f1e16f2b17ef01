//! Shutdown coordination for the gateway.
//!
//! A `watch` channel holds the flag, so a task that subscribes after the
//! trigger still observes it instead of waiting forever.

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Raise the flag. Only the first call is logged.
    pub fn trigger(&self) {
        let first = self.tx.send_if_modified(|triggered| !std::mem::replace(triggered, true));
        if first {
            tracing::info!(
                subscribers = self.tx.receiver_count(),
                "Shutdown triggered, draining"
            );
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is raised, immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Number of tasks currently subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
