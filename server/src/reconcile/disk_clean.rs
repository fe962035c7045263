//! Disk cleaning.
//!
//! Walks a device's data directory and removes files the database no
//! longer references: files with unrecognized extensions right away,
//! chunk files only once they are older than the TTL and neither
//! committed on this device nor reserved. Orphaned sidecars whose chunk
//! file is gone age out the same way.

use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use sea_orm::entity::prelude::*;
use tokio::fs;
use tokio::time;
use tracing::instrument;

use crate::database::entity::file_on::{self, Entity as FileOn};
use crate::database::entity::tempfile::Entity as Tempfile;
use crate::database::{ReconcileGate, TrackerDatabase};
use crate::shutdown::Shutdown;
use crate::State;
use depot::chunkpath::{Fid, CHUNK_EXT, INFO_EXT, OFFSET_EXT};

/// Runs disk cleaning periodically.
pub async fn run_disk_clean(state: State, shutdown: Shutdown) {
    let interval = state.config.reconcile.tick_interval;

    loop {
        if let Err(e) = run_disk_clean_once(&state).await {
            tracing::warn!("Disk clean failed: {}", e);
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::debug!("Disk clean loop exited");
}

/// Cleans every locally served device whose period gate opens.
#[instrument(skip_all)]
pub async fn run_disk_clean_once(state: &State) -> Result<()> {
    let node = state.node_config()?;
    let database = state.database().await?;
    let period = state.config.reconcile.disk_clean_period;

    for &devid in &node.devices {
        if !database
            .claim_device_pass(devid, ReconcileGate::DiskClean, period)
            .await?
        {
            continue;
        }

        let result = clean_device_dir(state, devid).await;
        database
            .finish_device_pass(devid, ReconcileGate::DiskClean, result.is_ok())
            .await?;

        if let Err(e) = result {
            tracing::warn!("Disk clean of device {} failed: {}", devid, e);
        }
    }

    Ok(())
}

/// Walks one device directory.
pub(crate) async fn clean_device_dir(state: &State, devid: i32) -> Result<()> {
    let node = state.node_config()?;
    let root = node.data_dir.join(format!("dev{}", devid));

    if fs::metadata(&root).await.is_err() {
        // Nothing mounted yet.
        return Ok(());
    }

    let ttl = state.config.reconcile.disk_clean_ttl;
    let mut stack = vec![root];

    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if entry.file_type().await?.is_dir() {
                stack.push(path);
                continue;
            }

            if let Err(e) = clean_entry(state, devid, &path, ttl).await {
                tracing::warn!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}

async fn clean_entry(state: &State, devid: i32, path: &Path, ttl: Duration) -> Result<()> {
    let extension = path.extension().and_then(|e| e.to_str());

    match extension {
        Some(CHUNK_EXT) => clean_chunk(state, devid, path, ttl).await,
        Some(OFFSET_EXT) | Some(INFO_EXT) => clean_sidecar(path, ttl).await,
        _ => {
            tracing::info!("Removing foreign file {:?}", path);
            fs::remove_file(path).await?;
            Ok(())
        }
    }
}

/// Removes a chunk file once it is old enough and nothing references it.
async fn clean_chunk(state: &State, devid: i32, path: &Path, ttl: Duration) -> Result<()> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    let Ok(fid) = Fid::from_file_name(name) else {
        tracing::info!("Removing misnamed chunk file {:?}", path);
        fs::remove_file(path).await?;
        return Ok(());
    };

    if !older_than(path, ttl).await? {
        return Ok(());
    }

    let database = state.database().await?;

    let committed_here = FileOn::find()
        .filter(file_on::Column::Fid.eq(fid.get()))
        .filter(file_on::Column::Devid.eq(devid))
        .one(database)
        .await?
        .is_some();
    if committed_here {
        return Ok(());
    }

    // A reservation anywhere keeps the bytes; the upload may still be
    // racing toward its close.
    let reserved = Tempfile::find_by_id(fid.get()).one(database).await?.is_some();
    if reserved {
        return Ok(());
    }

    tracing::info!("Removing orphaned chunk {:?}", path);
    fs::remove_file(path).await?;

    for ext in [OFFSET_EXT, INFO_EXT] {
        let _ = fs::remove_file(path.with_extension(ext)).await;
    }

    Ok(())
}

/// Removes a sidecar whose chunk file is gone.
async fn clean_sidecar(path: &Path, ttl: Duration) -> Result<()> {
    let chunk = path.with_extension(CHUNK_EXT);

    if fs::metadata(&chunk).await.is_err() && older_than(path, ttl).await? {
        tracing::info!("Removing orphaned sidecar {:?}", path);
        fs::remove_file(path).await?;
    }

    Ok(())
}

async fn older_than(path: &Path, ttl: Duration) -> Result<bool> {
    let modified = fs::metadata(path).await?.modified()?;

    Ok(SystemTime::now()
        .duration_since(modified)
        .map(|age| age > ttl)
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::ReconcileConfig;
    use crate::testing;
    use depot::key::Key;

    async fn write_chunk(state: &State, devid: i32, fid: i64) -> std::path::PathBuf {
        let path = state
            .node_config()
            .unwrap()
            .data_dir
            .join(Fid::new(fid).dev_path(devid));

        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"bytes").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_disk_clean_reaps_only_unreferenced_files() {
        // A zero TTL makes every file old enough to be considered.
        let reconcile = ReconcileConfig {
            disk_clean_ttl: Duration::ZERO,
            ..Default::default()
        };

        let harness = testing::harness(vec![1], reconcile).await;
        let state = &harness.state;
        let db = state.database().await.unwrap();

        // A committed object, a still-reserved upload, an orphan, and a
        // foreign dropping.
        let key = Key::new("kept".to_string()).unwrap();
        let committed = db.reserve_fid(1).await.unwrap();
        db.commit_file(committed, 1, &key, 5).await.unwrap();
        let committed_path = write_chunk(state, 1, committed).await;

        let reserved = db.reserve_fid(1).await.unwrap();
        let reserved_path = write_chunk(state, 1, reserved).await;

        let orphan_path = write_chunk(state, 1, 9999).await;
        let orphan_sidecar = orphan_path.with_extension(OFFSET_EXT);
        fs::write(&orphan_sidecar, b"5").await.unwrap();

        let junk = state.node_config().unwrap().data_dir.join("dev1/notes.txt");
        fs::write(&junk, b"junk").await.unwrap();

        run_disk_clean_once(state).await.unwrap();

        assert!(committed_path.exists());
        assert!(reserved_path.exists());
        assert!(!orphan_path.exists());
        assert!(!orphan_sidecar.exists());
        assert!(!junk.exists());
    }

    #[tokio::test]
    async fn test_disk_clean_period_gate() {
        let harness = testing::harness(vec![1], ReconcileConfig::default()).await;
        let state = &harness.state;
        let db = state.database().await.unwrap();

        // The pass itself claims the gate; a second claim within the
        // period loses.
        run_disk_clean_once(state).await.unwrap();

        let period = state.config.reconcile.disk_clean_period;
        assert!(!db
            .claim_device_pass(1, ReconcileGate::DiskClean, period)
            .await
            .unwrap());
    }
}
