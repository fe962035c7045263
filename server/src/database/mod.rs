//! Database access.
//!
//! The tracker's object state machine lives here: `absent → reserved
//! (tempfile) → committed (file + file_on) → absent`. Every multi-row
//! mutation happens inside one transaction, and per-fid mutations lock
//! the rows they touch so concurrent reconciliation and drain operations
//! on the same fid cannot interleave.

pub mod entity;
pub mod migration;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::query::QuerySelect;
use sea_orm::sea_query::{Expr, Value};
use sea_orm::{ActiveValue::Set, Condition, DatabaseConnection, TransactionTrait};

use crate::error::{ServerError, ServerResult};
use depot::key::Key;
use entity::device;
use entity::file::{self, Entity as File, FileModel};
use entity::file_on::{self, Entity as FileOn};
use entity::tempfile::{self, Entity as Tempfile};

/// Which background loop a per-device gate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileGate {
    Drain,
    DiskClean,
    DeviceClean,
}

impl ReconcileGate {
    fn column(self) -> device::Column {
        match self {
            Self::Drain => device::Column::LastDrainAt,
            Self::DiskClean => device::Column::LastDiskCleanAt,
            Self::DeviceClean => device::Column::LastDeviceCleanAt,
        }
    }
}

#[async_trait]
pub trait TrackerDatabase: Send + Sync {
    /// Inserts a placement reservation, allocating a fresh fid.
    async fn reserve_fid(&self, devid: i32) -> ServerResult<i64>;

    /// Commits a reserved upload: deletes the matching reservation and
    /// inserts the file and its location in one transaction.
    ///
    /// Fails with `NoSuchReservation` if the fid is not reserved on that
    /// device, which guards against double-close and closing an
    /// unreserved fid. An existing object under the same key is replaced;
    /// its chunks become orphans for the disk-clean pass.
    async fn commit_file(&self, fid: i64, devid: i32, key: &Key, length: i64) -> ServerResult<()>;

    /// Looks up a committed object and the devices recorded as holding it.
    async fn locate_file(&self, key: &Key) -> ServerResult<Option<(FileModel, Vec<i32>)>>;

    /// Deletes a committed object, returning its fid and the devices that
    /// held it so their nodes can be notified.
    async fn delete_file(&self, key: &Key) -> ServerResult<Option<(i64, Vec<i32>)>>;

    /// Deletes reservations older than `max_age`, returning the purged
    /// `(fid, devid)` pairs.
    async fn purge_stale_tempfiles(&self, max_age: Duration) -> ServerResult<Vec<(i64, i32)>>;

    /// Claims one periodic pass over a device.
    ///
    /// The claim is a conditional update of the gate's last-run column;
    /// zero rows affected means another run already owns this period.
    async fn claim_device_pass(
        &self,
        devid: i32,
        gate: ReconcileGate,
        period: Duration,
    ) -> ServerResult<bool>;

    /// Records the end of a pass. A failed pass resets the gate so the
    /// next tick retries instead of silently skipping the period.
    async fn finish_device_pass(
        &self,
        devid: i32,
        gate: ReconcileGate,
        success: bool,
    ) -> ServerResult<()>;
}

#[async_trait]
impl TrackerDatabase for DatabaseConnection {
    async fn reserve_fid(&self, devid: i32) -> ServerResult<i64> {
        let reservation = tempfile::ActiveModel {
            devid: Set(devid),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let insertion = Tempfile::insert(reservation)
            .exec(self)
            .await
            .map_err(ServerError::database_error)?;

        Ok(insertion.last_insert_id)
    }

    async fn commit_file(&self, fid: i64, devid: i32, key: &Key, length: i64) -> ServerResult<()> {
        let txn = self.begin().await.map_err(ServerError::database_error)?;

        let reservation = Tempfile::delete_many()
            .filter(tempfile::Column::Fid.eq(fid))
            .filter(tempfile::Column::Devid.eq(devid))
            .exec(&txn)
            .await
            .map_err(ServerError::database_error)?;

        if reservation.rows_affected == 0 {
            return Err(ServerError::NoSuchReservation);
        }

        // Re-puts replace the old object under the key.
        let existing = File::find()
            .filter(file::Column::Key.eq(key.as_str()))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServerError::database_error)?;

        if let Some(existing) = existing {
            FileOn::delete_many()
                .filter(file_on::Column::Fid.eq(existing.fid))
                .exec(&txn)
                .await
                .map_err(ServerError::database_error)?;

            File::delete_by_id(existing.fid)
                .exec(&txn)
                .await
                .map_err(ServerError::database_error)?;
        }

        File::insert(file::ActiveModel {
            fid: Set(fid),
            key: Set(key.as_str().to_owned()),
            length: Set(length),
            created_at: Set(Utc::now()),
        })
        .exec_without_returning(&txn)
        .await
        .map_err(ServerError::database_error)?;

        FileOn::insert(file_on::ActiveModel {
            fid: Set(fid),
            devid: Set(devid),
        })
        .exec_without_returning(&txn)
        .await
        .map_err(ServerError::database_error)?;

        txn.commit().await.map_err(ServerError::database_error)?;

        Ok(())
    }

    async fn locate_file(&self, key: &Key) -> ServerResult<Option<(FileModel, Vec<i32>)>> {
        let file = File::find()
            .filter(file::Column::Key.eq(key.as_str()))
            .one(self)
            .await
            .map_err(ServerError::database_error)?;

        let Some(file) = file else {
            return Ok(None);
        };

        let devids = FileOn::find()
            .filter(file_on::Column::Fid.eq(file.fid))
            .all(self)
            .await
            .map_err(ServerError::database_error)?
            .into_iter()
            .map(|location| location.devid)
            .collect();

        Ok(Some((file, devids)))
    }

    async fn delete_file(&self, key: &Key) -> ServerResult<Option<(i64, Vec<i32>)>> {
        let txn = self.begin().await.map_err(ServerError::database_error)?;

        let file = File::find()
            .filter(file::Column::Key.eq(key.as_str()))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServerError::database_error)?;

        let Some(file) = file else {
            return Ok(None);
        };

        let devids: Vec<i32> = FileOn::find()
            .filter(file_on::Column::Fid.eq(file.fid))
            .all(&txn)
            .await
            .map_err(ServerError::database_error)?
            .into_iter()
            .map(|location| location.devid)
            .collect();

        FileOn::delete_many()
            .filter(file_on::Column::Fid.eq(file.fid))
            .exec(&txn)
            .await
            .map_err(ServerError::database_error)?;

        let fid = file.fid;
        File::delete_by_id(fid)
            .exec(&txn)
            .await
            .map_err(ServerError::database_error)?;

        txn.commit().await.map_err(ServerError::database_error)?;

        Ok(Some((fid, devids)))
    }

    async fn purge_stale_tempfiles(&self, max_age: Duration) -> ServerResult<Vec<(i64, i32)>> {
        let cutoff = Utc::now() - ChronoDuration::seconds(max_age.as_secs() as i64);

        let txn = self.begin().await.map_err(ServerError::database_error)?;

        let stale = Tempfile::find()
            .filter(tempfile::Column::CreatedAt.lt(cutoff))
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(ServerError::database_error)?;

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let fids: Vec<i64> = stale.iter().map(|reservation| reservation.fid).collect();

        Tempfile::delete_many()
            .filter(tempfile::Column::Fid.is_in(fids))
            .exec(&txn)
            .await
            .map_err(ServerError::database_error)?;

        txn.commit().await.map_err(ServerError::database_error)?;

        Ok(stale
            .into_iter()
            .map(|reservation| (reservation.fid, reservation.devid))
            .collect())
    }

    async fn claim_device_pass(
        &self,
        devid: i32,
        gate: ReconcileGate,
        period: Duration,
    ) -> ServerResult<bool> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::seconds(period.as_secs() as i64);
        let column = gate.column();

        let update = device::Entity::update_many()
            .col_expr(column, Expr::value(now))
            .filter(device::Column::Devid.eq(devid))
            .filter(
                Condition::any()
                    .add(column.is_null())
                    .add(column.lt(cutoff)),
            )
            .exec(self)
            .await
            .map_err(ServerError::database_error)?;

        Ok(update.rows_affected > 0)
    }

    async fn finish_device_pass(
        &self,
        devid: i32,
        gate: ReconcileGate,
        success: bool,
    ) -> ServerResult<()> {
        let value = if success {
            Expr::value(Utc::now())
        } else {
            Expr::value(Value::ChronoDateTimeUtc(None))
        };

        device::Entity::update_many()
            .col_expr(gate.column(), value)
            .filter(device::Column::Devid.eq(devid))
            .exec(self)
            .await
            .map_err(ServerError::database_error)?;

        Ok(())
    }
}
