//! Signal handling for graceful shutdown
//!
//! Ctrl+C or SIGTERM flips a [`watch`] flag to `true`. The worker pool checks
//! the flag before taking each task, so in-flight downloads are allowed to
//! finish.

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Signal handler for graceful shutdown coordination
#[derive(Debug, Clone)]
pub struct SignalHandler {
    shutdown_tx: watch::Sender<bool>,
}

impl SignalHandler {
    /// Create a new signal handler with its shutdown flag
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (Self { shutdown_tx }, shutdown_rx)
    }

    /// Another receiver of the shutdown flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown without a signal
    pub fn trigger(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Spawns the task that waits for Ctrl+C or SIGTERM
    pub fn setup(&self) -> JoinHandle<()> {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received Ctrl+C, finishing in-flight downloads");
                },
                _ = terminate => {
                    info!("Received terminate signal, finishing in-flight downloads");
                },
            }

            let _ = shutdown_tx.send(true);
        })
    }
}

/// Wait until shutdown is requested
pub async fn wait_for_shutdown_signal(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_trigger_reaches_all_receivers() {
        let (handler, rx1) = SignalHandler::new();
        let rx2 = handler.subscribe();
        assert!(!*rx1.borrow());

        let trigger = handler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        assert!(timeout(Duration::from_millis(200), wait_for_shutdown_signal(rx1))
            .await
            .is_ok());
        assert!(*rx2.borrow());
    }

    #[tokio::test]
    async fn test_setup_does_not_trigger() {
        let (handler, rx) = SignalHandler::new();
        let handle = handler.setup();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!*rx.borrow());
        handle.abort();
    }
}
