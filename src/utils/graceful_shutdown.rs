use std::time::Duration;

use tokio::{signal, time::timeout};
use tokio_util::sync::CancellationToken;

/// Why the server stopped accepting connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested in-process via [`GracefulShutdown::trigger`]
    Manual,
}

/// Coordinates shutdown of the listener and the drain of in-flight fan-outs.
///
/// A single [`CancellationToken`] is shared by everything that must stop. The
/// first trigger wins; later signals are logged and ignored.
#[derive(Clone)]
pub struct GracefulShutdown {
    token: CancellationToken,
    reason: std::sync::Arc<std::sync::OnceLock<ShutdownReason>>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    /// Create a shutdown coordinator with a 30 second drain window
    pub fn new() -> Self {
        Self::with_drain_timeout(Duration::from_secs(30))
    }

    pub fn with_drain_timeout(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Default::default(),
            drain_timeout,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Child token cancelled together with this coordinator
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason of the first trigger, if any
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Begin shutdown. Returns `false` if it had already begun.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self.reason.set(reason).is_err() {
            tracing::warn!("Shutdown already initiated, ignoring {:?}", reason);
            return false;
        }
        tracing::info!("Initiating graceful shutdown: {:?}", reason);
        self.token.cancel();
        true
    }

    /// Resolves once shutdown has been triggered.
    pub async fn cancelled(&self) -> ShutdownReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(ShutdownReason::Manual)
    }

    /// Listen for SIGINT/SIGTERM until one arrives or shutdown is triggered elsewhere.
    pub async fn run_signal_handler(&self) {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("Received SIGINT (Ctrl+C)");
                    self.trigger(ShutdownReason::Interrupt);
                }
                Err(e) => tracing::error!("Failed to listen for SIGINT: {}", e),
            },
            _ = wait_for_sigterm() => {
                tracing::info!("Received SIGTERM");
                self.trigger(ShutdownReason::Terminate);
            }
            _ = self.token.cancelled() => {}
        }
    }

    /// Wait for `drain` to finish, giving up after the drain timeout.
    /// Returns `true` when the drain completed in time.
    pub async fn drain<F>(&self, drain: F) -> bool
    where
        F: std::future::Future<Output = ()>,
    {
        match timeout(self.drain_timeout, drain).await {
            Ok(()) => {
                tracing::info!("Graceful shutdown completed");
                true
            }
            Err(_) => {
                tracing::error!(
                    "Drain timeout exceeded ({:?}), forcing shutdown",
                    self.drain_timeout
                );
                false
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // Only Ctrl+C exists off Unix
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_creation() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutdown_initiated());
        assert_eq!(shutdown.reason(), None);
        assert_eq!(shutdown.drain_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_first_trigger_wins() {
        let shutdown = GracefulShutdown::new();
        assert!(shutdown.trigger(ShutdownReason::Terminate));
        assert!(!shutdown.trigger(ShutdownReason::Manual));

        assert!(shutdown.is_shutdown_initiated());
        assert_eq!(shutdown.cancelled().await, ShutdownReason::Terminate);
    }

    #[tokio::test]
    async fn test_child_tokens_and_clones_observe_trigger() {
        let shutdown = GracefulShutdown::new();
        let token = shutdown.token();
        let clone = shutdown.clone();

        assert!(!token.is_cancelled());
        clone.trigger(ShutdownReason::Manual);
        assert!(token.is_cancelled());
        assert!(shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_signal_handler_returns_on_manual_trigger() {
        let shutdown = GracefulShutdown::new();
        let handler = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.run_signal_handler().await })
        };
        shutdown.trigger(ShutdownReason::Manual);
        timeout(Duration::from_secs(1), handler)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_timeout() {
        let shutdown = GracefulShutdown::with_drain_timeout(Duration::from_millis(20));
        assert!(shutdown.drain(async {}).await);
        assert!(!shutdown.drain(std::future::pending()).await);
    }
}
