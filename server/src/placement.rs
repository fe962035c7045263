//! Device placement.
//!
//! A read-mostly snapshot of the device and host tables is refreshed on a
//! fixed interval: the refresh queries both tables concurrently, builds
//! private maps, and swaps them in under a brief exclusive lock, so
//! readers are never blocked on a slow query. Readers take the shared
//! lock only for a bounded copy-out.
//!
//! Placement is utilization-weighted: candidates are scored, sorted, and
//! a write destination is drawn at random from the top half with
//! probability proportional to its score.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use sea_orm::entity::prelude::*;
use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;
use tokio::time;

use crate::database::entity::device::{self, DeviceStatus, Entity as Device};
use crate::database::entity::host::{self, Entity as Host};
use crate::error::{ServerError, ServerResult};
use crate::shutdown::Shutdown;
use crate::State;
use depot::chunkpath::Fid;

/// Weight of the free-space term of a device's score.
const FREE_SPACE_FACTOR: f64 = 1.0;

/// Weight of the io-idleness term of a device's score.
const IO_UTIL_FACTOR: f64 = 5.0;

/// A device as seen by placement decisions.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub devid: i32,
    pub hostid: i32,
    pub status: DeviceStatus,
    pub total_bytes: Option<i64>,
    pub used_bytes: Option<i64>,
    pub io_utilization: Option<i16>,
}

/// A host as seen by placement decisions.
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub hostid: i32,
    pub hostname: String,
    pub http_port: u16,
    pub http_get_port: Option<u16>,
}

#[derive(Debug, Default)]
struct Snapshot {
    devices: HashMap<i32, DeviceSnapshot>,
    hosts: HashMap<i32, HostSnapshot>,
}

/// The placement cache.
#[derive(Debug, Default)]
pub struct PlacementCache {
    snapshot: RwLock<Snapshot>,
}

impl DeviceSnapshot {
    pub fn free_bytes(&self) -> Option<i64> {
        match (self.total_bytes, self.used_bytes) {
            (Some(total), Some(used)) => Some((total - used).max(0)),
            _ => None,
        }
    }

    /// Free space as a percentage; devices with unknown total space
    /// score zero here.
    fn free_space_percent(&self) -> f64 {
        match (self.total_bytes, self.free_bytes()) {
            (Some(total), Some(free)) if total > 0 => free as f64 * 100.0 / total as f64,
            _ => 0.0,
        }
    }

    /// Used space as a percentage, when known.
    fn used_percent(&self) -> Option<f64> {
        match (self.total_bytes, self.used_bytes) {
            (Some(total), Some(used)) if total > 0 => Some(used as f64 * 100.0 / total as f64),
            _ => None,
        }
    }

    /// Utilization score. Reads do not care about remaining capacity, so
    /// the free-space term is dropped for them; an unreported io
    /// utilization likewise contributes nothing.
    fn score(&self, for_read: bool) -> f64 {
        let free_term = if for_read {
            0.0
        } else {
            self.free_space_percent() * FREE_SPACE_FACTOR
        };

        let io_term = match self.io_utilization {
            Some(pct) => (100 - pct.clamp(0, 100)) as f64 * IO_UTIL_FACTOR,
            None => 0.0,
        };

        free_term + io_term
    }
}

impl PlacementCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rebuilds the snapshot from the database.
    pub async fn refresh(&self, db: &DatabaseConnection) -> ServerResult<()> {
        let (devices, hosts) = tokio::try_join!(Device::find().all(db), Host::find().all(db))
            .map_err(ServerError::database_error)?;

        let snapshot = build_snapshot(devices, hosts);

        *self.snapshot.write().await = snapshot;
        Ok(())
    }

    /// Looks up one device.
    pub async fn device(&self, devid: i32) -> Option<DeviceSnapshot> {
        self.snapshot.read().await.devices.get(&devid).cloned()
    }

    /// Orders readable candidates for a read, best placement first.
    pub async fn order_readable(&self, candidates: &[i32]) -> Vec<DeviceSnapshot> {
        let snapshot = self.snapshot.read().await;

        let mut scored: Vec<(DeviceSnapshot, f64)> = candidates
            .iter()
            .filter_map(|devid| snapshot.devices.get(devid))
            .filter(|device| device.status.is_readable())
            .map(|device| (device.clone(), device.score(true)))
            .collect();

        drop(snapshot);

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.into_iter().map(|(device, _)| device).collect()
    }

    /// Chooses a destination for a new write among all known devices.
    pub async fn choose_writable(&self, required_bytes: Option<i64>) -> ServerResult<DeviceSnapshot> {
        let candidates = self.writable_candidates(None, required_bytes, None).await;
        weighted_choice(candidates).ok_or(ServerError::NoDeviceFound)
    }

    /// Chooses a drain destination: writable, not the drained device, and
    /// below the cluster-average usage plus the configured headroom.
    pub async fn choose_drain_destination(
        &self,
        exclude: i32,
        required_bytes: i64,
        headroom_pct: f64,
    ) -> ServerResult<DeviceSnapshot> {
        let ceiling = self
            .cluster_used_percent()
            .await
            .map(|used| used + headroom_pct);

        let candidates = self
            .writable_candidates(Some(exclude), Some(required_bytes), ceiling)
            .await;

        weighted_choice(candidates).ok_or(ServerError::NoDeviceFound)
    }

    /// URL of a fid's chunk on a device.
    pub async fn chunk_url(&self, devid: i32, fid: Fid, for_read: bool) -> Option<String> {
        let snapshot = self.snapshot.read().await;

        let device = snapshot.devices.get(&devid)?;
        let host = snapshot.hosts.get(&device.hostid)?;

        let port = if for_read {
            host.http_get_port.unwrap_or(host.http_port)
        } else {
            host.http_port
        };

        Some(format!(
            "http://{}:{}/{}",
            host.hostname,
            port,
            fid.dev_path(devid)
        ))
    }

    /// Cluster-wide used-space percentage over devices with known totals.
    async fn cluster_used_percent(&self) -> Option<f64> {
        let snapshot = self.snapshot.read().await;

        let (total, used) = snapshot
            .devices
            .values()
            .filter_map(|device| Some((device.total_bytes?, device.used_bytes?)))
            .fold((0i64, 0i64), |(t, u), (total, used)| (t + total, u + used));

        if total > 0 {
            Some(used as f64 * 100.0 / total as f64)
        } else {
            None
        }
    }

    async fn writable_candidates(
        &self,
        exclude: Option<i32>,
        required_bytes: Option<i64>,
        used_ceiling_pct: Option<f64>,
    ) -> Vec<(DeviceSnapshot, f64)> {
        let snapshot = self.snapshot.read().await;

        snapshot
            .devices
            .values()
            .filter(|device| device.status.is_writable())
            .filter(|device| Some(device.devid) != exclude)
            .filter(|device| match required_bytes {
                // A size hint excludes devices that cannot prove the room.
                Some(required) => matches!(device.free_bytes(), Some(free) if free >= required),
                None => true,
            })
            .filter(|device| match used_ceiling_pct {
                Some(ceiling) => device
                    .used_percent()
                    .map(|used| used <= ceiling)
                    .unwrap_or(false),
                None => true,
            })
            .map(|device| (device.clone(), device.score(false)))
            .collect()
    }

    #[cfg(test)]
    async fn install(&self, devices: Vec<device::Model>, hosts: Vec<host::Model>) {
        *self.snapshot.write().await = build_snapshot(devices, hosts);
    }
}

fn build_snapshot(devices: Vec<device::Model>, hosts: Vec<host::Model>) -> Snapshot {
    let devices = devices
        .into_iter()
        .map(|row| {
            (
                row.devid,
                DeviceSnapshot {
                    devid: row.devid,
                    hostid: row.hostid,
                    status: row.status,
                    total_bytes: row.total_bytes,
                    used_bytes: row.used_bytes,
                    io_utilization: row.io_utilization,
                },
            )
        })
        .collect();

    let hosts = hosts
        .into_iter()
        .map(|row| {
            (
                row.hostid,
                HostSnapshot {
                    hostid: row.hostid,
                    hostname: row.hostname,
                    http_port: row.http_port as u16,
                    http_get_port: row.http_get_port.map(|port| port as u16),
                },
            )
        })
        .collect();

    Snapshot { devices, hosts }
}

/// Picks from the top half of candidates with probability proportional to
/// score. A single candidate is returned directly.
fn weighted_choice(mut scored: Vec<(DeviceSnapshot, f64)>) -> Option<DeviceSnapshot> {
    match scored.len() {
        0 => return None,
        1 => return Some(scored.remove(0).0),
        _ => {}
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate((scored.len() + 1) / 2);

    let total: f64 = scored.iter().map(|(_, score)| score).sum();
    if total <= 0.0 {
        let index = rand::thread_rng().gen_range(0..scored.len());
        return Some(scored.swap_remove(index).0);
    }

    let mut draw = rand::thread_rng().gen_range(0.0..total);
    let mut chosen = scored.len() - 1;
    for (index, (_, score)) in scored.iter().enumerate() {
        if draw < *score {
            chosen = index;
            break;
        }
        draw -= score;
    }

    Some(scored.swap_remove(chosen).0)
}

/// Refreshes the placement snapshot periodically.
pub async fn run_placement_refresh(state: State, shutdown: Shutdown) {
    let interval = state.config.placement.refresh_interval;

    loop {
        match state.database().await {
            Ok(db) => {
                if let Err(e) = state.placement().refresh(db).await {
                    tracing::warn!("Placement refresh failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("Placement refresh failed: {}", e),
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::debug!("Placement refresh loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(devid: i32, status: DeviceStatus, total: Option<i64>, used: Option<i64>) -> device::Model {
        device::Model {
            devid,
            hostid: 1,
            status,
            total_bytes: total,
            used_bytes: used,
            io_utilization: None,
            last_drain_at: None,
            last_disk_clean_at: None,
            last_device_clean_at: None,
        }
    }

    fn hosts() -> Vec<host::Model> {
        vec![host::Model {
            hostid: 1,
            hostname: "node1".to_string(),
            http_port: 7501,
            http_get_port: Some(7502),
        }]
    }

    #[tokio::test]
    async fn test_single_qualifying_device_is_deterministic() {
        // 1000 required bytes: 500 free cannot hold it, 2000 free can.
        let cache = PlacementCache::new();
        cache
            .install(
                vec![
                    device(1, DeviceStatus::Alive, Some(10_000), Some(9_500)),
                    device(2, DeviceStatus::Alive, Some(10_000), Some(8_000)),
                ],
                hosts(),
            )
            .await;

        for _ in 0..10 {
            let chosen = cache.choose_writable(Some(1000)).await.unwrap();
            assert_eq!(2, chosen.devid);
        }
    }

    #[tokio::test]
    async fn test_only_alive_devices_take_writes() {
        let cache = PlacementCache::new();
        cache
            .install(
                vec![
                    device(1, DeviceStatus::Drain, Some(100), Some(0)),
                    device(2, DeviceStatus::ReadOnly, Some(100), Some(0)),
                    device(3, DeviceStatus::Dead, Some(100), Some(0)),
                    device(4, DeviceStatus::Empty, Some(100), Some(0)),
                ],
                hosts(),
            )
            .await;

        assert!(matches!(
            cache.choose_writable(None).await,
            Err(ServerError::NoDeviceFound)
        ));
    }

    #[tokio::test]
    async fn test_unknown_capacity_excluded_by_size_hint() {
        let cache = PlacementCache::new();
        cache
            .install(vec![device(1, DeviceStatus::Alive, None, None)], hosts())
            .await;

        // Without a hint the device is usable; with one it cannot prove
        // the room.
        cache.choose_writable(None).await.unwrap();
        assert!(matches!(
            cache.choose_writable(Some(1)).await,
            Err(ServerError::NoDeviceFound)
        ));
    }

    #[tokio::test]
    async fn test_read_order_ignores_free_space() {
        let mut dev1 = device(1, DeviceStatus::ReadOnly, Some(1000), Some(0));
        dev1.io_utilization = Some(90);
        let mut dev2 = device(2, DeviceStatus::Drain, Some(1000), Some(1000));
        dev2.io_utilization = Some(10);

        let cache = PlacementCache::new();
        cache
            .install(
                vec![dev1, dev2, device(3, DeviceStatus::Dead, None, None)],
                hosts(),
            )
            .await;

        // Device 2 is nearly full but idle; free space must not matter
        // for reads. The dead device drops out entirely.
        let order: Vec<i32> = cache
            .order_readable(&[1, 2, 3])
            .await
            .into_iter()
            .map(|device| device.devid)
            .collect();
        assert_eq!(vec![2, 1], order);
    }

    #[tokio::test]
    async fn test_weighted_choice_stays_in_top_half() {
        let cache = PlacementCache::new();
        cache
            .install(
                vec![
                    device(1, DeviceStatus::Alive, Some(1000), Some(900)),
                    device(2, DeviceStatus::Alive, Some(1000), Some(100)),
                    device(3, DeviceStatus::Alive, Some(1000), Some(200)),
                    device(4, DeviceStatus::Alive, Some(1000), Some(950)),
                ],
                hosts(),
            )
            .await;

        // The two emptiest devices form the top half.
        for _ in 0..50 {
            let chosen = cache.choose_writable(None).await.unwrap();
            assert!(matches!(chosen.devid, 2 | 3), "chose {}", chosen.devid);
        }
    }

    #[tokio::test]
    async fn test_drain_destination_respects_headroom() {
        let cache = PlacementCache::new();
        cache
            .install(
                vec![
                    device(1, DeviceStatus::Drain, Some(1000), Some(500)),
                    device(2, DeviceStatus::Alive, Some(1000), Some(900)),
                    device(3, DeviceStatus::Alive, Some(1000), Some(400)),
                ],
                hosts(),
            )
            .await;

        // Cluster usage is 60%; with 10 points of headroom, device 2 at
        // 90% is over the ceiling and device 3 wins.
        for _ in 0..10 {
            let chosen = cache.choose_drain_destination(1, 10, 10.0).await.unwrap();
            assert_eq!(3, chosen.devid);
        }
    }

    #[tokio::test]
    async fn test_chunk_url_layout() {
        let cache = PlacementCache::new();
        cache
            .install(
                vec![device(7, DeviceStatus::Alive, None, None)],
                hosts(),
            )
            .await;

        assert_eq!(
            "http://node1:7501/dev7/0/000/012/0000012345.fid",
            cache.chunk_url(7, Fid::new(12345), false).await.unwrap()
        );
        assert_eq!(
            "http://node1:7502/dev7/0/000/012/0000012345.fid",
            cache.chunk_url(7, Fid::new(12345), true).await.unwrap()
        );
        assert_eq!(None, cache.chunk_url(8, Fid::new(12345), true).await);
    }
}
