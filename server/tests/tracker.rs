//! Tracker state machine tests over a scratch database.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{ActiveValue::Set, Database, DatabaseConnection, EntityTrait};
use tempfile::TempDir;

use depot::key::Key;
use depot_server::database::entity::device::{self, DeviceStatus};
use depot_server::database::entity::file_on::Entity as FileOn;
use depot_server::database::entity::host;
use depot_server::database::entity::tempfile::{self as tempfile_entity, Entity as Tempfile};
use depot_server::database::migration::{Migrator, MigratorTrait};
use depot_server::database::{ReconcileGate, TrackerDatabase};
use depot_server::error::ServerError;

async fn test_db() -> (DatabaseConnection, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/depot.db?mode=rwc", dir.path().display());

    let db = Database::connect(&url).await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    host::Entity::insert(host::ActiveModel {
        hostname: Set("localhost".to_string()),
        http_port: Set(7501),
        http_get_port: Set(None),
        ..Default::default()
    })
    .exec(&db)
    .await
    .unwrap();

    device::Entity::insert(device::ActiveModel {
        devid: Set(1),
        hostid: Set(1),
        status: Set(DeviceStatus::Alive),
        total_bytes: Set(Some(1_000_000)),
        used_bytes: Set(Some(0)),
        io_utilization: Set(None),
        last_drain_at: Set(None),
        last_disk_clean_at: Set(None),
        last_device_clean_at: Set(None),
    })
    .exec_without_returning(&db)
    .await
    .unwrap();

    (db, dir)
}

#[tokio::test]
async fn test_object_state_machine() {
    let (db, _dir) = test_db().await;
    let key = Key::new("the-object".to_string()).unwrap();

    // absent -> reserved
    let fid = db.reserve_fid(1).await.unwrap();
    assert!(Tempfile::find_by_id(fid).one(&db).await.unwrap().is_some());
    assert!(db.locate_file(&key).await.unwrap().is_none());

    // reserved -> committed
    db.commit_file(fid, 1, &key, 11).await.unwrap();
    assert!(Tempfile::find_by_id(fid).one(&db).await.unwrap().is_none());

    let (file, devids) = db.locate_file(&key).await.unwrap().unwrap();
    assert_eq!(fid, file.fid);
    assert_eq!(11, file.length);
    assert_eq!(vec![1], devids);

    // committed -> absent
    let (deleted_fid, devids) = db.delete_file(&key).await.unwrap().unwrap();
    assert_eq!(fid, deleted_fid);
    assert_eq!(vec![1], devids);
    assert!(db.locate_file(&key).await.unwrap().is_none());

    // a second delete reports the object as unknown
    assert!(db.delete_file(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_close_requires_a_matching_reservation() {
    let (db, _dir) = test_db().await;
    let key = Key::new("double".to_string()).unwrap();

    let fid = db.reserve_fid(1).await.unwrap();

    // wrong device
    assert!(matches!(
        db.commit_file(fid, 2, &key, 1).await,
        Err(ServerError::NoSuchReservation)
    ));

    db.commit_file(fid, 1, &key, 1).await.unwrap();

    // double close
    assert!(matches!(
        db.commit_file(fid, 1, &key, 1).await,
        Err(ServerError::NoSuchReservation)
    ));

    // never-reserved fid
    assert!(matches!(
        db.commit_file(123456, 1, &key, 1).await,
        Err(ServerError::NoSuchReservation)
    ));
}

#[tokio::test]
async fn test_reput_replaces_the_key() {
    let (db, _dir) = test_db().await;
    let key = Key::new("replaced".to_string()).unwrap();

    let first = db.reserve_fid(1).await.unwrap();
    db.commit_file(first, 1, &key, 5).await.unwrap();

    let second = db.reserve_fid(1).await.unwrap();
    db.commit_file(second, 1, &key, 9).await.unwrap();

    let (file, _) = db.locate_file(&key).await.unwrap().unwrap();
    assert_eq!(second, file.fid);
    assert_eq!(9, file.length);

    // the replaced fid's locations are gone
    assert!(FileOn::find_by_id((first, 1))
        .one(&db)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_stale_reservation_purge() {
    let (db, _dir) = test_db().await;

    let stale = db.reserve_fid(1).await.unwrap();
    Tempfile::update(tempfile_entity::ActiveModel {
        fid: Set(stale),
        created_at: Set(Utc::now() - ChronoDuration::hours(2)),
        ..Default::default()
    })
    .exec(&db)
    .await
    .unwrap();

    let fresh = db.reserve_fid(1).await.unwrap();

    let purged = db
        .purge_stale_tempfiles(Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(vec![(stale, 1)], purged);

    assert!(Tempfile::find_by_id(stale).one(&db).await.unwrap().is_none());
    assert!(Tempfile::find_by_id(fresh).one(&db).await.unwrap().is_some());
}

#[tokio::test]
async fn test_device_pass_gate() {
    let (db, _dir) = test_db().await;
    let period = Duration::from_secs(3600);

    // The first claim wins; a second within the period loses.
    assert!(db
        .claim_device_pass(1, ReconcileGate::DiskClean, period)
        .await
        .unwrap());
    assert!(!db
        .claim_device_pass(1, ReconcileGate::DiskClean, period)
        .await
        .unwrap());

    // Gates are independent per loop.
    assert!(db
        .claim_device_pass(1, ReconcileGate::DeviceClean, period)
        .await
        .unwrap());

    // A failed pass reopens the gate; a successful one keeps it closed.
    db.finish_device_pass(1, ReconcileGate::DiskClean, false)
        .await
        .unwrap();
    assert!(db
        .claim_device_pass(1, ReconcileGate::DiskClean, period)
        .await
        .unwrap());

    db.finish_device_pass(1, ReconcileGate::DiskClean, true)
        .await
        .unwrap();
    assert!(!db
        .claim_device_pass(1, ReconcileGate::DiskClean, period)
        .await
        .unwrap());

    // Unknown devices never claim.
    assert!(!db
        .claim_device_pass(99, ReconcileGate::DiskClean, period)
        .await
        .unwrap());
}
