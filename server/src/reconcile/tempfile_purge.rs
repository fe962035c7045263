//! Stale reservation purge.

use anyhow::Result;
use tokio::time;
use tracing::instrument;

use crate::database::TrackerDatabase;
use crate::shutdown::Shutdown;
use crate::State;

/// Purges stale reservations periodically.
pub async fn run_tempfile_purge(state: State, shutdown: Shutdown) {
    let interval = state.config.reconcile.tempfile_purge_interval;

    loop {
        if let Err(e) = run_tempfile_purge_once(&state).await {
            tracing::warn!("Tempfile purge failed: {}", e);
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::debug!("Tempfile purge loop exited");
}

/// Purges reservations older than the configured age.
///
/// The uploader may have written part of a chunk before disappearing, so
/// the reserved device gets a best-effort delete hint; disk-clean will
/// reap the bytes either way once they age out.
#[instrument(skip_all)]
pub async fn run_tempfile_purge_once(state: &State) -> Result<()> {
    let database = state.database().await?;
    let max_age = state.config.reconcile.tempfile_max_age;

    let purged = database.purge_stale_tempfiles(max_age).await?;
    if purged.is_empty() {
        return Ok(());
    }

    tracing::info!("Purged {} stale reservations", purged.len());

    for (fid, devid) in purged {
        state.notifier().chunk_deleted(devid, fid).await;
    }

    Ok(())
}
