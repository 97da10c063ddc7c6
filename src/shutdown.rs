//! Process-wide shutdown signal.
//!
//! A single [`Shutdown`] is created at startup and cloned into the accept
//! loop and every session. It starts active and is cancelled at most once;
//! every clone observes the cancellation.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Broadcast shutdown condition.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new, active signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the signal to cancelled. Later calls have no effect.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether the signal has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Wait until the server should stop: Ctrl-C, or the run duration elapsing.
pub async fn wait_for_trigger(run_for: Option<Duration>) {
    let elapsed = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(elapsed);

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl-C"),
            // No signal handler: fall back to the run duration alone.
            Err(e) => {
                warn!(error = %e, "Unable to listen for Ctrl-C");
                (&mut elapsed).await;
            }
        },
        _ = &mut elapsed => {
            info!(seconds = run_for.map(|d| d.as_secs()), "Run duration elapsed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_is_broadcast() {
        let shutdown = Shutdown::new();
        let observers: Vec<_> = (0..4)
            .map(|_| {
                let shutdown = shutdown.clone();
                tokio::spawn(async move { shutdown.cancelled().await })
            })
            .collect();

        assert!(!shutdown.is_cancelled());
        shutdown.trigger();
        assert!(shutdown.is_cancelled());

        for observer in observers {
            tokio::time::timeout(Duration::from_secs(1), observer)
                .await
                .expect("observer not woken")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.clone().is_cancelled());
        shutdown.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_duration_elapses() {
        let start = tokio::time::Instant::now();
        wait_for_trigger(Some(Duration::from_secs(60))).await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
