//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM cancel a [`ShutdownToken`]; the HTTP server drains
//! in-flight requests once the token is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{info, warn};

/// A token that can be shared across tasks to request and await shutdown.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownToken {
    /// Create a new shutdown token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Request shutdown and wake every waiter.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel this token on the first SIGINT or SIGTERM.
    ///
    /// If signal handlers cannot be registered (e.g., in restricted environments),
    /// the token can still be cancelled directly.
    pub fn cancel_on_signal(&self) {
        let token = self.clone();
        tokio::spawn(async move {
            let sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGINT handler: {}", e);
                    None
                }
            };

            let sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    None
                }
            };

            match (sigint, sigterm) {
                (Some(mut int), Some(mut term)) => {
                    tokio::select! {
                        _ = int.recv() => info!("Received SIGINT, shutting down..."),
                        _ = term.recv() => info!("Received SIGTERM, shutting down..."),
                    }
                }
                (Some(mut int), None) => {
                    int.recv().await;
                    info!("Received SIGINT, shutting down...");
                }
                (None, Some(mut term)) => {
                    term.recv().await;
                    info!("Received SIGTERM, shutting down...");
                }
                (None, None) => {
                    warn!("No signal handlers registered - graceful shutdown disabled");
                    return;
                }
            }
            token.cancel();
        });
    }
}
