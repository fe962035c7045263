//! Delete notifications.
//!
//! When an object is deleted (or a stale reservation purged), the
//! devices that held its chunk are told to drop it. Delivery rides an
//! external message queue and is best-effort end to end; the disk-clean
//! pass is what guarantees physical cleanup, so a lost notification only
//! delays reclamation.

use async_trait::async_trait;

use crate::config::Config;

/// Fan-out seam for chunk deletion hints.
#[async_trait]
pub trait DeleteNotifier: Send + Sync {
    /// Tells the device's node that no metadata references the fid's
    /// chunk anymore. Failures are logged, never propagated.
    async fn chunk_deleted(&self, devid: i32, fid: i64);
}

/// Records notifications in the log instead of delivering them.
///
/// Used when no message queue is configured; the queue publisher itself
/// lives outside this process.
#[derive(Debug)]
pub struct LogNotifier {
    queue_url: Option<String>,
}

#[async_trait]
impl DeleteNotifier for LogNotifier {
    async fn chunk_deleted(&self, devid: i32, fid: i64) {
        match &self.queue_url {
            Some(queue) => tracing::debug!(
                "Delete of fid {} on device {} queued for {}",
                fid,
                devid,
                queue
            ),
            None => tracing::debug!("Delete of fid {} on device {} (no queue configured)", fid, devid),
        }
    }
}

pub(crate) fn from_config(config: &Config) -> LogNotifier {
    LogNotifier {
        queue_url: config.notify_queue_url.clone(),
    }
}
