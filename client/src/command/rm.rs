use anyhow::Result;
use clap::Parser;

use crate::api::TrackerClient;
use crate::config::ClientConfig;
use depot::key::Key;

/// Delete an object.
#[derive(Debug, Parser)]
pub struct Rm {
    /// Key of the object.
    key: Key,
}

pub async fn run(config: ClientConfig, sub: Rm) -> Result<()> {
    let tracker = TrackerClient::new(&config.tracker)?;

    tracker.delete(&sub.key).await?;
    eprintln!("🗑️ {}", sub.key.as_str());

    Ok(())
}
