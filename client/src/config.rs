//! Client configurations.
//!
//! Configuration files are stored under `$XDG_CONFIG_HOME/depot/config.toml`.
//! Command-line flags override the file.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use xdg::BaseDirectories;

use depot::transfer::DEFAULT_CHUNK_SIZE;

/// Application prefix in XDG base directories.
///
/// This will be concatenated into `$XDG_CONFIG_HOME/depot`.
const XDG_PREFIX: &str = "depot";

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The tracker endpoint, e.g. `http://tracker:7500/`.
    pub tracker: String,

    /// Size of one append request.
    pub chunk_size: usize,
}

/// On-disk configuration data.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigData {
    tracker: Option<String>,

    #[serde(rename = "chunk-size")]
    chunk_size: Option<usize>,
}

impl ClientConfig {
    /// Loads the configuration with command-line overrides applied.
    pub fn load(tracker: Option<String>, chunk_size: Option<usize>) -> Result<Self> {
        let data = ConfigData::load()?;

        let tracker = tracker.or(data.tracker).ok_or_else(|| {
            anyhow!("No tracker endpoint configured. Pass --tracker or set `tracker` in the config file.")
        })?;

        Ok(Self {
            tracker,
            chunk_size: chunk_size.or(data.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE),
        })
    }
}

impl ConfigData {
    fn load() -> Result<Self> {
        let path = match get_config_path() {
            Ok(path) if path.exists() => path,
            _ => return Ok(Self::default()),
        };

        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;

        Ok(toml::from_str(&data)?)
    }
}

fn get_config_path() -> Result<PathBuf> {
    let xdg_dirs = BaseDirectories::with_prefix(XDG_PREFIX)?;
    let config_path = xdg_dirs.place_config_file("config.toml")?;

    Ok(config_path)
}
