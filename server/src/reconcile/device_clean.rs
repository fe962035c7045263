//! Device location verification.
//!
//! For every fid recorded as living on a device, re-checks the record
//! against the full location set: a record pointing at a missing file is
//! dropped (unless it is the last one), and when several devices claim
//! the same fid, the device actually holding the bytes wins and the
//! duplicates are removed and notified.

use anyhow::Result;
use sea_orm::entity::prelude::*;
use sea_orm::query::QuerySelect;
use sea_orm::TransactionTrait;
use tokio::fs;
use tokio::task::spawn;
use tokio::time;
use tracing::instrument;

use crate::database::entity::file_on::{self, Entity as FileOn};
use crate::database::{ReconcileGate, TrackerDatabase};
use crate::shutdown::Shutdown;
use crate::State;
use depot::chunkpath::Fid;

/// Runs device cleaning periodically.
pub async fn run_device_clean(state: State, shutdown: Shutdown) {
    let interval = state.config.reconcile.tick_interval;

    loop {
        if let Err(e) = run_device_clean_once(&state).await {
            tracing::warn!("Device clean failed: {}", e);
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::debug!("Device clean loop exited");
}

/// Verifies every locally served device whose period gate opens.
#[instrument(skip_all)]
pub async fn run_device_clean_once(state: &State) -> Result<()> {
    let node = state.node_config()?;
    let database = state.database().await?;
    let period = state.config.reconcile.device_clean_period;

    for &devid in &node.devices {
        if !database
            .claim_device_pass(devid, ReconcileGate::DeviceClean, period)
            .await?
        {
            continue;
        }

        let result = clean_device(state, devid).await;
        database
            .finish_device_pass(devid, ReconcileGate::DeviceClean, result.is_ok())
            .await?;

        if let Err(e) = result {
            tracing::warn!("Device clean of device {} failed: {}", devid, e);
        }
    }

    Ok(())
}

/// Verifies every location recorded on one device.
pub(crate) async fn clean_device(state: &State, devid: i32) -> Result<()> {
    let database = state.database().await?;

    let recorded = FileOn::find()
        .filter(file_on::Column::Devid.eq(devid))
        .all(database)
        .await?;

    for row in recorded {
        if let Err(e) = verify_location(state, devid, row.fid).await {
            tracing::warn!(
                "Verification of fid {} on device {} failed: {}",
                row.fid,
                devid,
                e
            );
        }
    }

    Ok(())
}

/// Re-verifies one fid's presence on this device.
///
/// Locking the fid's location rows serializes this against drain and
/// other device-clean runs touching the same fid.
async fn verify_location(state: &State, devid: i32, fid: i64) -> Result<()> {
    let node = state.node_config()?;
    let database = state.database().await?;

    let txn = database.begin().await?;

    let locations = FileOn::find()
        .filter(file_on::Column::Fid.eq(fid))
        .lock_exclusive()
        .all(&txn)
        .await?;

    if !locations.iter().any(|location| location.devid == devid) {
        // Another run already moved it off this device.
        return Ok(());
    }

    let local = node.data_dir.join(Fid::new(fid).dev_path(devid));
    let present = fs::metadata(&local).await.is_ok();

    if !present {
        if locations.len() == 1 {
            // Dropping the last recorded location would make the object
            // unreachable; leave the row for an operator to judge.
            tracing::error!(
                "Missing chunk for fid {} on device {} is the only recorded copy",
                fid,
                devid
            );
            return Ok(());
        }

        tracing::info!("Dropping dangling location of fid {} on device {}", fid, devid);

        FileOn::delete_many()
            .filter(file_on::Column::Fid.eq(fid))
            .filter(file_on::Column::Devid.eq(devid))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        return Ok(());
    }

    let duplicates: Vec<i32> = locations
        .iter()
        .map(|location| location.devid)
        .filter(|other| *other != devid)
        .collect();

    if duplicates.is_empty() {
        return Ok(());
    }

    // The bytes are here; the other records lose.
    tracing::info!(
        "Dropping duplicate locations of fid {} on devices {:?}",
        fid,
        duplicates
    );

    FileOn::delete_many()
        .filter(file_on::Column::Fid.eq(fid))
        .filter(file_on::Column::Devid.is_in(duplicates.clone()))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    for duplicate in duplicates {
        let notifier = state.notifier().clone();
        spawn(async move { notifier.chunk_deleted(duplicate, fid).await });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use sea_orm::ActiveValue::Set;

    use crate::config::ReconcileConfig;
    use crate::testing;
    use depot::key::Key;

    async fn add_location(state: &crate::State, fid: i64, devid: i32) {
        let db = state.database().await.unwrap();

        FileOn::insert(file_on::ActiveModel {
            fid: Set(fid),
            devid: Set(devid),
        })
        .exec_without_returning(db)
        .await
        .unwrap();
    }

    async fn has_location(state: &crate::State, fid: i64, devid: i32) -> bool {
        let db = state.database().await.unwrap();

        FileOn::find_by_id((fid, devid))
            .one(db)
            .await
            .unwrap()
            .is_some()
    }

    async fn commit(state: &crate::State, key: &str) -> i64 {
        let db = state.database().await.unwrap();
        let key = Key::new(key.to_string()).unwrap();

        let fid = db.reserve_fid(1).await.unwrap();
        db.commit_file(fid, 1, &key, 5).await.unwrap();
        fid
    }

    #[tokio::test]
    async fn test_device_clean_repairs_locations() {
        let harness = testing::harness(vec![1], ReconcileConfig::default()).await;
        let state = &harness.state;
        let db = state.database().await.unwrap();
        testing::seed_device(db, 2).await;

        // Present here, duplicated on device 2: this device wins.
        let duplicated = commit(state, "duplicated").await;
        add_location(state, duplicated, 2).await;
        let path = state
            .node_config()
            .unwrap()
            .data_dir
            .join(Fid::new(duplicated).dev_path(1));
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"bytes").await.unwrap();

        // Missing here, but device 2 also claims it: this row is
        // dangling and goes away.
        let dangling = commit(state, "dangling").await;
        add_location(state, dangling, 2).await;

        // Missing here and the only recorded copy: left alone.
        let last_copy = commit(state, "last-copy").await;

        run_device_clean_once(state).await.unwrap();

        assert!(has_location(state, duplicated, 1).await);
        assert!(!has_location(state, duplicated, 2).await);

        assert!(!has_location(state, dangling, 1).await);
        assert!(has_location(state, dangling, 2).await);

        assert!(has_location(state, last_copy, 1).await);
    }
}
