//! Graceful shutdown latch.
//!
//! `main` spawns [`shutdown_on_signal`](crate::lifecycle::shutdown_on_signal),
//! which calls [`Shutdown::trigger`] on SIGINT/SIGTERM. `HttpServer::run`
//! hands its [`ShutdownSignal`] to axum's graceful shutdown: once it
//! resolves the listener closes and in-flight requests finish before `run`
//! returns. The config reload task ends on its own when the server drops.

use tokio::sync::watch;

/// One-way latch shared by the signal task and the server.
///
/// The flag stays set after [`trigger`](Self::trigger), so a subscriber
/// created late still observes it.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Set the latch. Repeated calls are no-ops.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribers that have not been dropped yet.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of [`Shutdown`].
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown was triggered, or the coordinator was dropped.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
