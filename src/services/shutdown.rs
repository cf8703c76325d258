//! Shared cancellation signal
//!
//! One `Shutdown` is created per manager and cloned into every background
//! task. Triggering it is sticky: late subscribers observe it immediately.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle on the manager-wide shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal; returns false if it was already fired
    pub fn trigger(&self) -> bool {
        let fired = self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        });
        if fired {
            tracing::debug!("Shutdown signal triggered");
        }
        fired
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has fired
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in self, so wait_for only errors if it was dropped
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
