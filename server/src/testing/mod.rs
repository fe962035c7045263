//! Test support.

use std::time::Duration;

use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use tempfile::TempDir;

use crate::config::{Config, DatabaseConfig, NodeConfig, PlacementConfig, ReconcileConfig};
use crate::database::entity::device::{self, DeviceStatus};
use crate::database::entity::host;
use crate::database::migration::{Migrator, MigratorTrait};
use crate::{State, StateInner};

/// A server state over a file-backed scratch database and data
/// directory.
///
/// The temporary directory owns both; dropping the harness removes them.
pub(crate) struct TestHarness {
    pub state: State,

    #[allow(dead_code)]
    dir: TempDir,
}

/// Builds a harness serving the given devices, migrated and seeded with
/// one host plus one alive device row per served device.
pub(crate) async fn harness(devices: Vec<i32>, reconcile: ReconcileConfig) -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}/depot.db?mode=rwc", dir.path().display());

    let config = Config {
        listen: "127.0.0.1:0".parse().unwrap(),
        database: DatabaseConfig { url: database_url },
        node: Some(NodeConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            data_dir: dir.path().join("data"),
            devices: devices.clone(),
            stats_interval: Duration::from_secs(60),
        }),
        placement: PlacementConfig::default(),
        reconcile,
        notify_queue_url: None,
        shutdown_timeout: Duration::from_secs(1),
    };

    let state = StateInner::new(config).await;

    let db = state.database().await.unwrap();
    Migrator::up(db, None).await.unwrap();

    host::Entity::insert(host::ActiveModel {
        hostname: Set("localhost".to_string()),
        http_port: Set(7501),
        http_get_port: Set(None),
        ..Default::default()
    })
    .exec(db)
    .await
    .unwrap();

    for &devid in &devices {
        seed_device(db, devid).await;
    }

    TestHarness { state, dir }
}

/// Inserts one alive device row.
pub(crate) async fn seed_device(db: &DatabaseConnection, devid: i32) {
    device::Entity::insert(device::ActiveModel {
        devid: Set(devid),
        hostid: Set(1),
        status: Set(DeviceStatus::Alive),
        total_bytes: Set(Some(1_000_000)),
        used_bytes: Set(Some(0)),
        io_utilization: Set(None),
        last_drain_at: Set(None),
        last_disk_clean_at: Set(None),
        last_device_clean_at: Set(None),
    })
    .exec_without_returning(db)
    .await
    .unwrap();
}
