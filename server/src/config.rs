//! Server configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use xdg::BaseDirectories;

/// Application prefix in XDG base directories.
///
/// This will be concatenated into `$XDG_CONFIG_HOME/depot`.
const XDG_PREFIX: &str = "depot";

/// Configuration for the Depot server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Socket address the tracker API listens on.
    #[serde(default = "default_tracker_listen")]
    pub listen: SocketAddr,

    /// Database connection.
    pub database: DatabaseConfig,

    /// Storage node settings.
    ///
    /// Absent on hosts that only run the tracker.
    pub node: Option<NodeConfig>,

    /// Placement cache settings.
    #[serde(default = "Default::default")]
    pub placement: PlacementConfig,

    /// Reconciler settings.
    #[serde(rename = "reconcile")]
    #[serde(default = "Default::default")]
    pub reconcile: ReconcileConfig,

    /// Message queue to publish delete notifications to.
    ///
    /// Delivery is best-effort either way; the disk-clean pass is what
    /// guarantees physical cleanup. When unset, notifications are only
    /// logged.
    #[serde(rename = "notify-queue-url")]
    #[serde(default)]
    pub notify_queue_url: Option<String>,

    /// How long in-flight requests get to finish on shutdown.
    #[serde(rename = "shutdown-timeout")]
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
}

/// Storage node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Socket address the chunk transfer API listens on.
    #[serde(default = "default_node_listen")]
    pub listen: SocketAddr,

    /// Directory the device mounts live under.
    ///
    /// Device `N`'s chunk files are stored under `<data-dir>/devN/`.
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Devices served from this node's data directory.
    pub devices: Vec<i32>,

    /// Interval between device capacity samples.
    #[serde(rename = "stats-interval")]
    #[serde(with = "humantime_serde", default = "default_stats_interval")]
    pub stats_interval: Duration,
}

/// Placement cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacementConfig {
    /// How often the device/host snapshot is refreshed.
    #[serde(rename = "refresh-interval")]
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,
}

/// Reconciler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// How often each background loop wakes up.
    ///
    /// Waking up is cheap; the per-device period gates below decide
    /// whether any work actually happens.
    #[serde(rename = "tick-interval")]
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Reservations older than this are purged.
    #[serde(rename = "tempfile-max-age")]
    #[serde(with = "humantime_serde", default = "default_tempfile_max_age")]
    pub tempfile_max_age: Duration,

    /// How often stale reservations are purged.
    #[serde(rename = "tempfile-purge-interval")]
    #[serde(with = "humantime_serde", default = "default_tempfile_purge_interval")]
    pub tempfile_purge_interval: Duration,

    /// Minimum time between disk-clean passes over one device.
    #[serde(rename = "disk-clean-period")]
    #[serde(with = "humantime_serde", default = "default_clean_period")]
    pub disk_clean_period: Duration,

    /// Chunk files younger than this are never considered orphans.
    #[serde(rename = "disk-clean-ttl")]
    #[serde(with = "humantime_serde", default = "default_disk_clean_ttl")]
    pub disk_clean_ttl: Duration,

    /// Minimum time between device-clean passes over one device.
    #[serde(rename = "device-clean-period")]
    #[serde(with = "humantime_serde", default = "default_clean_period")]
    pub device_clean_period: Duration,

    /// Length of one auto-drain scheduling period.
    #[serde(rename = "drain-period")]
    #[serde(with = "humantime_serde", default = "default_drain_period")]
    pub drain_period: Duration,

    /// One in this many devices auto-drains in a given period.
    #[serde(rename = "drain-ratio")]
    #[serde(default = "default_drain_ratio")]
    pub drain_ratio: u32,

    /// Percentage points of usage above the cluster average a drain
    /// destination may reach.
    #[serde(rename = "drain-headroom-pct")]
    #[serde(default = "default_drain_headroom_pct")]
    pub drain_headroom_pct: f64,

    /// Verify checksums on both ends of each drain transfer.
    #[serde(rename = "drain-verify")]
    #[serde(default = "default_drain_verify")]
    pub drain_verify: bool,

    /// Size of one append request during drain transfers.
    #[serde(rename = "chunk-size")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            tempfile_max_age: default_tempfile_max_age(),
            tempfile_purge_interval: default_tempfile_purge_interval(),
            disk_clean_period: default_clean_period(),
            disk_clean_ttl: default_disk_clean_ttl(),
            device_clean_period: default_clean_period(),
            drain_period: default_drain_period(),
            drain_ratio: default_drain_ratio(),
            drain_headroom_pct: default_drain_headroom_pct(),
            drain_verify: default_drain_verify(),
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_tracker_listen() -> SocketAddr {
    "[::]:7500".parse().unwrap()
}

fn default_node_listen() -> SocketAddr {
    "[::]:7501".parse().unwrap()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_tempfile_max_age() -> Duration {
    Duration::from_secs(3600)
}

fn default_tempfile_purge_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_clean_period() -> Duration {
    Duration::from_secs(3600)
}

fn default_disk_clean_ttl() -> Duration {
    Duration::from_secs(86400)
}

fn default_drain_period() -> Duration {
    Duration::from_secs(3600)
}

fn default_drain_ratio() -> u32 {
    8
}

fn default_drain_headroom_pct() -> f64 {
    10.0
}

fn default_drain_verify() -> bool {
    true
}

fn default_chunk_size() -> usize {
    depot::transfer::DEFAULT_CHUNK_SIZE
}

/// Loads the configuration, falling back to the XDG config path.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_owned(),
        None => get_xdg_config_path()?,
    };

    tracing::info!("Using configurations: {:?}", path);

    let config = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read configuration file {:?}", path))?;

    toml::from_str(&config).context("Invalid configuration file")
}

pub fn get_xdg_config_path() -> Result<PathBuf> {
    let xdg_dirs = BaseDirectories::with_prefix(XDG_PREFIX)?;
    let config_path = xdg_dirs.place_config_file("server.toml")?;

    Ok(config_path)
}
