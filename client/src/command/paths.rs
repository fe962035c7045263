use anyhow::Result;
use clap::Parser;

use crate::api::TrackerClient;
use crate::config::ClientConfig;
use depot::key::Key;

/// Show every location an object can be read from.
#[derive(Debug, Parser)]
pub struct Paths {
    /// Key of the object.
    key: Key,
}

pub async fn run(config: ClientConfig, sub: Paths) -> Result<()> {
    let tracker = TrackerClient::new(&config.tracker)?;

    for path in tracker.get_paths(&sub.key).await? {
        println!("{}", path);
    }

    Ok(())
}
