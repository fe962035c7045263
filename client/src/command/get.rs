use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tokio::fs::File;
use tokio::io;

use crate::api::TrackerClient;
use crate::config::ClientConfig;
use crate::transfer;
use depot::key::Key;

/// Download an object.
#[derive(Debug, Parser)]
pub struct Get {
    /// Key of the object.
    key: Key,

    /// Destination file, or "-" for standard output.
    #[clap(default_value = "-")]
    output: PathBuf,
}

pub async fn run(config: ClientConfig, sub: Get) -> Result<()> {
    let tracker = TrackerClient::new(&config.tracker)?;

    let paths = tracker.get_paths(&sub.key).await?;
    if paths.is_empty() {
        bail!("Unknown key \"{}\"", sub.key.as_str());
    }

    let client = tracker.http_client();

    if sub.output.as_os_str() == "-" {
        let mut stdout = io::stdout();
        transfer::download(&client, &paths, &mut stdout).await?;
    } else {
        let mut file = File::create(&sub.output).await?;
        let written = transfer::download(&client, &paths, &mut file).await?;
        eprintln!("✅ {} ({} bytes)", sub.output.display(), written);
    }

    Ok(())
}
