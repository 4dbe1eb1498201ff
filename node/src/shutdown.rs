//! Shutdown signal for the peer network's background tasks.
//!
//! Tasks hold a [`ShutdownSignal`] and `select!` on [`ShutdownSignal::wait`]
//! alongside their main loop. A signal obtained after shutdown was
//! triggered resolves immediately.

use tokio::sync::watch;

pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }

    /// Trigger shutdown. Further calls have no effect.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered.
    pub async fn wait(&mut self) {
        // The controller outlives its tasks; a dropped sender also counts.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
