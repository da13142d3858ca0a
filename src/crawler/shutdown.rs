//! Graceful shutdown signalling
//!
//! One `Shutdown` is owned by whoever receives the interrupt; every long wait in the
//! crawl holds a `ShutdownListener` and races against it.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sending half of the shutdown signal
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a graceful stop; idempotent
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            token: self.token.clone(),
        }
    }
}

/// Receiving half of the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    token: CancellationToken,
}

impl ShutdownListener {
    /// A listener that never fires
    pub fn never() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Sleeps for `duration` unless shutdown arrives first
    ///
    /// Returns true when the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;

            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
