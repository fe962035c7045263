use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use tokio::fs::File;
use tokio::io;

use crate::api::TrackerClient;
use crate::config::ClientConfig;
use crate::transfer::{progress_style, ProgressReader};
use depot::digest::Algorithm;
use depot::key::Key;
use depot::transfer::ChunkSender;

/// Upload an object.
#[derive(Debug, Parser)]
pub struct Put {
    /// Key to store the object under.
    key: Key,

    /// File to upload, or "-" for standard input.
    file: PathBuf,

    /// Verify the transfer with a checksum on both ends.
    #[clap(long)]
    verify: bool,
}

pub async fn run(config: ClientConfig, sub: Put) -> Result<()> {
    let tracker = TrackerClient::new(&config.tracker)?;

    if sub.file.as_os_str() == "-" {
        return put_stream(&tracker, &config, &sub).await;
    }

    let file = File::open(&sub.file)
        .await
        .with_context(|| format!("Failed to open {:?}", sub.file))?;
    let length = file.metadata().await?.len();

    let open = tracker.create_open(Some(length)).await?;
    tracing::debug!("Uploading fid {} to {}", open.fid, open.path);

    let bar = ProgressBar::new(length);
    bar.set_style(progress_style());

    let mut sender =
        ChunkSender::new(tracker.http_client(), open.path.clone()).with_chunk_size(config.chunk_size);
    if sub.verify {
        sender = sender.with_digest(Algorithm::Crc32);
    }

    let report = sender
        .send(ProgressReader::new(file, bar.clone()), Some(length))
        .await?;
    bar.finish_and_clear();

    tracker
        .create_close(open.fid, open.devid, &sub.key, length)
        .await?;

    eprintln!(
        "✅ {} ({} bytes{})",
        sub.key.as_str(),
        report.length,
        if report.verified { ", verified" } else { "" }
    );

    Ok(())
}

/// Uploads standard input, whose length is unknown in advance.
async fn put_stream(tracker: &TrackerClient, config: &ClientConfig, sub: &Put) -> Result<()> {
    let open = tracker.create_open(None).await?;
    tracing::debug!("Uploading fid {} to {}", open.fid, open.path);

    let sender =
        ChunkSender::new(tracker.http_client(), open.path.clone()).with_chunk_size(config.chunk_size);

    let report = sender.send_stream(io::stdin()).await?;

    tracker
        .create_close(open.fid, open.devid, &sub.key, report.length)
        .await?;

    eprintln!("✅ {} ({} bytes)", sub.key.as_str(), report.length);

    Ok(())
}
