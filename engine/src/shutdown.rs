//! Graceful shutdown for long-running engine loops.
//!
//! A latched flag on a `watch` channel: once requested it stays requested,
//! so a loop that subscribes late still sees it. Loops check it only
//! between closure runs, never in the middle of a flush.

use tokio::signal;
use tokio::sync::watch;

pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Receiving half handed to each loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Wait for SIGINT or SIGTERM, then request shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::warn!(error = %err, "SIGINT handler unavailable");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let source = tokio::select! {
            _ = ctrl_c => "SIGINT",
            _ = terminate => "SIGTERM",
        };
        tracing::info!(signal = source, "shutdown requested");
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested, immediately if it already was.
    /// A dropped controller counts as a request.
    pub async fn requested(&mut self) {
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscribers_see_the_request() {
        let controller = ShutdownController::new();
        let mut early = controller.signal();
        assert!(!early.is_requested());

        controller.shutdown();
        early.requested().await;

        let mut late = controller.signal();
        assert!(late.is_requested());
        late.requested().await;
    }

    #[tokio::test]
    async fn dropped_controller_releases_waiters() {
        let controller = ShutdownController::new();
        let mut signal = controller.signal();
        drop(controller);
        signal.requested().await;
    }
}
