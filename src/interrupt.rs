//! Cooperative interruption of a running batch.
//!
//! The orchestrator checks the handle between diagrams and before every
//! attempt, and races it against the retry delay. An in-flight request is
//! left to finish (or time out); the batch stops at the next check.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable stop signal shared between the caller and the pipeline.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Ask the pipeline to stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`Interrupt::trigger`] has been called.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns Ok.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
