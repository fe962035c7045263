//! Graceful shutdown signaling.
//!
//! A single watch channel fans the shutdown request out to the HTTP
//! listeners and every background loop. Loops select between their timer
//! and [`Shutdown::cancelled`] and exit promptly, before the process
//! closes shared resources.

use tokio::sync::watch;

/// The sending half, held by the signal handler.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// The receiving half, cloned into every task that must wind down.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    /// Requests shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Resolves once shutdown has been requested.
    ///
    /// A dropped handle counts as a request, so tasks never outlive the
    /// controlling end.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();

        if *rx.borrow() {
            return;
        }

        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_fanout() {
        let (handle, shutdown) = channel();
        let other = shutdown.clone();

        assert!(!shutdown.is_cancelled());
        handle.shutdown();

        shutdown.cancelled().await;
        other.cancelled().await;
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels() {
        let (handle, shutdown) = channel();
        drop(handle);
        shutdown.cancelled().await;
    }
}
