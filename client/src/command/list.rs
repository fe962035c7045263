use anyhow::Result;
use clap::Parser;

use crate::api::TrackerClient;
use crate::config::ClientConfig;

/// List devices.
#[derive(Debug, Parser)]
pub struct Devices {}

/// List hosts.
#[derive(Debug, Parser)]
pub struct Hosts {}

pub async fn run_devices(config: ClientConfig, _sub: Devices) -> Result<()> {
    let tracker = TrackerClient::new(&config.tracker)?;

    let response = tracker.get_devices().await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

pub async fn run_hosts(config: ClientConfig, _sub: Hosts) -> Result<()> {
    let tracker = TrackerClient::new(&config.tracker)?;

    let response = tracker.get_hosts().await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
