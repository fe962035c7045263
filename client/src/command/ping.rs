use anyhow::Result;
use clap::Parser;

use crate::api::TrackerClient;
use crate::config::ClientConfig;

/// Check tracker liveness.
#[derive(Debug, Parser)]
pub struct Ping {}

pub async fn run(config: ClientConfig, _sub: Ping) -> Result<()> {
    let tracker = TrackerClient::new(&config.tracker)?;

    println!("{}", tracker.ping().await?);

    Ok(())
}
