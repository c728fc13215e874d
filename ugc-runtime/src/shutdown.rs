//! Cooperative shutdown on SIGINT / SIGTERM.
//!
//! Each binary installs one [`Shutdown`] listener. The ETL loops poll it
//! between batches; the HTTP server hands [`Shutdown::wait`] to axum's
//! graceful-shutdown hook.

use tokio::sync::watch;

/// Broadcast handle that flips once when the process receives SIGINT or
/// SIGTERM. Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Install the signal handlers and return the listener.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn listen() -> Self {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            let _ = tx.send(true);
        });
        Self { rx }
    }

    /// Whether the signal has already fired.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the signal fires.
    pub async fn wait(mut self) {
        if *self.rx.borrow() {
            return;
        }
        // Err means the sender task is gone, which only happens at teardown.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    /// Test-only constructor with a caller-controlled trigger.
    #[must_use]
    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
