//! Auto-drain.
//!
//! Evacuates whole devices: every chunk recorded on the drained device
//! is re-uploaded to a destination chosen by the placement cache, its
//! location row moved in one transaction, and the local bytes reclaimed.
//! Transfers ride the same chunk transfer protocol as client uploads,
//! with an optional digest computed concurrently on both ends.
//!
//! Cluster-wide scheduling is a coarse time-bucketed, hash-sharded gate:
//! only devices whose id lands on the current bucket modulo the
//! configured ratio drain in a given period, spreading the load without
//! central coordination.

use std::io;

use anyhow::{anyhow, Result};
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::query::QuerySelect;
use sea_orm::{ActiveValue::Set, TransactionTrait};
use tokio::fs;
use tokio::task::spawn;
use tokio::time;
use tracing::instrument;

use crate::database::entity::device::{self, DeviceStatus, Entity as Device};
use crate::database::entity::file::Entity as File;
use crate::database::entity::file_on::{self, Entity as FileOn};
use crate::database::{ReconcileGate, TrackerDatabase};
use crate::shutdown::Shutdown;
use crate::State;
use depot::chunkpath::Fid;
use depot::digest::Algorithm;
use depot::transfer::ChunkSender;

/// Transient-failure budget for one drain transfer.
const DRAIN_RETRY_LIMIT: u32 = 3;

/// Runs auto-drain periodically.
pub async fn run_auto_drain(state: State, shutdown: Shutdown) {
    let interval = state.config.reconcile.tick_interval;

    loop {
        if let Err(e) = run_auto_drain_once(&state).await {
            tracing::warn!("Auto-drain failed: {}", e);
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::debug!("Auto-drain loop exited");
}

/// Drains every locally served device that is scheduled and claims its
/// period gate.
#[instrument(skip_all)]
pub async fn run_auto_drain_once(state: &State) -> Result<()> {
    let node = state.node_config()?;
    let database = state.database().await?;
    let reconcile = &state.config.reconcile;

    for &devid in &node.devices {
        if !drain_scheduled(devid, reconcile.drain_period.as_secs(), reconcile.drain_ratio) {
            continue;
        }

        if !database
            .claim_device_pass(devid, ReconcileGate::Drain, reconcile.drain_period)
            .await?
        {
            continue;
        }

        let result = drain_device(state, devid).await;
        database
            .finish_device_pass(devid, ReconcileGate::Drain, result.is_ok())
            .await?;

        if let Err(e) = result {
            tracing::warn!("Drain of device {} failed: {}", devid, e);
        }
    }

    Ok(())
}

/// Whether a device drains in the current period.
///
/// The device id itself serves as the deterministic hash: it spreads
/// devices across buckets and is stable across versions and restarts.
fn drain_scheduled(devid: i32, period_secs: u64, ratio: u32) -> bool {
    if ratio <= 1 {
        return true;
    }

    let bucket = Utc::now().timestamp() as u64 / period_secs.max(1);
    (bucket + devid as u64) % ratio as u64 == 0
}

/// Evacuates every chunk off one device.
pub async fn drain_device(state: &State, devid: i32) -> Result<()> {
    let database = state.database().await?;

    // No new writes land while chunks move off.
    Device::update(device::ActiveModel {
        devid: Set(devid),
        status: Set(DeviceStatus::Drain),
        ..Default::default()
    })
    .exec(database)
    .await?;

    let chunks = FileOn::find()
        .filter(file_on::Column::Devid.eq(devid))
        .all(database)
        .await?;

    if chunks.is_empty() {
        tracing::info!("Device {} is already empty", devid);
        return Ok(());
    }

    tracing::info!("Draining {} chunks off device {}", chunks.len(), devid);

    let mut failures = 0usize;
    for chunk in chunks {
        if let Err(e) = migrate_chunk(state, devid, chunk.fid).await {
            failures += 1;
            tracing::warn!(
                "Migration of fid {} off device {} failed: {}",
                chunk.fid,
                devid,
                e
            );
        }
    }

    if failures > 0 {
        // Failing the pass resets the gate, so the next tick retries the
        // leftovers.
        return Err(anyhow!(
            "{} chunks failed to migrate off device {}",
            failures,
            devid
        ));
    }

    Ok(())
}

/// Moves one chunk to a freshly chosen destination device.
async fn migrate_chunk(state: &State, src_devid: i32, fid: i64) -> Result<()> {
    let node = state.node_config()?;
    let database = state.database().await?;
    let reconcile = &state.config.reconcile;
    let placement = state.placement();

    let file = File::find_by_id(fid)
        .one(database)
        .await?
        .ok_or_else(|| anyhow!("fid {} has a location but no file row", fid))?;

    let local = node.data_dir.join(Fid::new(fid).dev_path(src_devid));
    let source = match fs::File::open(&local).await {
        Ok(source) => source,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(anyhow!("chunk file {:?} is missing", local));
        }
        Err(e) => return Err(e.into()),
    };

    let length = source.metadata().await?.len();
    if length as i64 != file.length {
        tracing::warn!(
            "fid {} is {} bytes on disk but {} in the database",
            fid,
            length,
            file.length
        );
    }

    let destination = placement
        .choose_drain_destination(src_devid, length as i64, reconcile.drain_headroom_pct)
        .await?;

    let url = placement
        .chunk_url(destination.devid, Fid::new(fid), false)
        .await
        .ok_or_else(|| anyhow!("no URL for device {}", destination.devid))?;

    let mut sender = ChunkSender::new(state.http_client().await?.clone(), url)
        .with_chunk_size(reconcile.chunk_size)
        .with_retry_limit(DRAIN_RETRY_LIMIT);
    if reconcile.drain_verify {
        sender = sender.with_digest(Algorithm::Crc32);
    }

    // A digest mismatch fails the transfer inside the sender.
    let report = sender
        .send(source, Some(length))
        .await
        .map_err(|e| anyhow!("transfer to device {} failed: {}", destination.devid, e))?;

    // Commit the move. Locking the fid's rows serializes this with
    // device-clean and concurrent drains.
    let txn = database.begin().await?;

    let locations = FileOn::find()
        .filter(file_on::Column::Fid.eq(fid))
        .lock_exclusive()
        .all(&txn)
        .await?;

    if !locations.iter().any(|location| location.devid == src_devid) {
        // Another run already moved this fid; our fresh copy is now the
        // duplicate.
        drop(txn);

        let notifier = state.notifier().clone();
        let duplicate = destination.devid;
        spawn(async move { notifier.chunk_deleted(duplicate, fid).await });

        return Ok(());
    }

    if !locations
        .iter()
        .any(|location| location.devid == destination.devid)
    {
        FileOn::insert(file_on::ActiveModel {
            fid: Set(fid),
            devid: Set(destination.devid),
        })
        .exec_without_returning(&txn)
        .await?;
    }

    FileOn::delete_many()
        .filter(file_on::Column::Fid.eq(fid))
        .filter(file_on::Column::Devid.eq(src_devid))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(
        "Migrated fid {} from device {} to device {} ({} bytes{})",
        fid,
        src_devid,
        destination.devid,
        report.length,
        if report.verified { ", verified" } else { "" }
    );

    // The old bytes are orphans now; reclaim them eagerly since they are
    // local. Disk-clean covers the failure path.
    let _ = fs::remove_file(&local).await;
    for ext in [depot::chunkpath::OFFSET_EXT, depot::chunkpath::INFO_EXT] {
        let _ = fs::remove_file(local.with_extension(ext)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_scheduling_spreads_devices() {
        // With ratio 1 every device is always scheduled.
        for devid in 0..10 {
            assert!(drain_scheduled(devid, 3600, 1));
        }

        // With ratio N, exactly one device out of any N consecutive ids
        // is scheduled in a given bucket.
        let scheduled: Vec<i32> = (0..8).filter(|d| drain_scheduled(*d, 3600, 8)).collect();
        assert_eq!(1, scheduled.len());
    }
}
