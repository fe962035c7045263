//! Background reconciliation.
//!
//! Four cooperating loops keep the database and the physical chunk files
//! in agreement despite crashes, partial writes and concurrent mutation:
//!
//! - [`tempfile_purge`] (tracker-side) drops reservations whose uploader
//!   never finished.
//! - [`disk_clean`] (node-side) walks the data directory and removes
//!   files the database no longer references.
//! - [`device_clean`] (node-side) re-verifies every location recorded on
//!   a device against the full location set and repairs divergence.
//! - [`drain`] evacuates whole devices through the transfer protocol.
//!
//! The device-scoped loops claim one pass per device per period with a
//! conditional update of a last-run timestamp column; a claim that
//! affects zero rows means another run owns the period. Per-item errors
//! are logged and the pass moves on; a failed pass resets its gate so
//! the next tick retries instead of silently skipping the period.

pub mod device_clean;
pub mod disk_clean;
pub mod drain;
pub mod tempfile_purge;

use anyhow::Result;

use crate::shutdown::Shutdown;
use crate::State;

/// Runs the storage-node-side loops until shutdown.
pub(crate) async fn run_node_loops(state: State, shutdown: Shutdown) {
    let _ = tokio::join!(
        disk_clean::run_disk_clean(state.clone(), shutdown.clone()),
        device_clean::run_device_clean(state.clone(), shutdown.clone()),
        drain::run_auto_drain(state, shutdown),
    );
}

/// Runs every applicable pass once.
pub(crate) async fn run_once(state: &State) -> Result<()> {
    tempfile_purge::run_tempfile_purge_once(state).await?;

    if state.config.node.is_some() {
        disk_clean::run_disk_clean_once(state).await?;
        device_clean::run_device_clean_once(state).await?;
        drain::run_auto_drain_once(state).await?;
    }

    Ok(())
}
