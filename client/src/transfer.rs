//! Transfer helpers.
//!
//! The actual sending algorithm lives in `depot::transfer`; this module
//! adds the client-side trimmings: a progress-reporting source wrapper
//! and the per-path fallback downloader.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::{anyhow, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client as HttpClient;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, AsyncWriteExt, ReadBuf};

/// The progress bar style used for transfers.
pub fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner} {bar:40.green/blue} {bytes:>10} / {total_bytes} ({bytes_per_sec})",
    )
    .unwrap()
}

/// Wrapper that advances a progress bar as a source is read.
///
/// Seeks move the bar too, so offset-conflict reseeks in the sender show
/// up instead of freezing the display.
pub struct ProgressReader<R> {
    inner: R,
    bar: ProgressBar,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let old_filled = buf.filled().len();
        let r = Pin::new(&mut self.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &r {
            let read_len = buf.filled().len() - old_filled;
            self.bar.inc(read_len as u64);
        }

        r
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for ProgressReader<R> {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let r = Pin::new(&mut self.inner).poll_complete(cx);

        if let Poll::Ready(Ok(position)) = &r {
            self.bar.set_position(*position);
        }

        r
    }
}

/// Streams the first reachable path into the writer.
///
/// Paths that cannot be reached or refuse the request fall through to
/// the next candidate; an error after bytes have flowed is fatal since
/// the writer cannot be rewound.
pub async fn download<W>(client: &HttpClient, paths: &[String], dest: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut last_error = anyhow!("no paths to fetch");

    for path in paths {
        match try_fetch(client, path, dest).await {
            Ok(written) => return Ok(written),
            Err((started, e)) => {
                if started {
                    return Err(e);
                }

                tracing::warn!("Fetching {} failed: {}", path, e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

async fn try_fetch<W>(
    client: &HttpClient,
    url: &str,
    dest: &mut W,
) -> Result<u64, (bool, anyhow::Error)>
where
    W: AsyncWrite + Unpin,
{
    let res = client
        .get(url)
        .send()
        .await
        .map_err(|e| (false, e.into()))?;

    if !res.status().is_success() {
        return Err((false, anyhow!("HTTP {}", res.status())));
    }

    let mut stream = res.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| (written > 0, anyhow::Error::from(e)))?;

        dest.write_all(&chunk)
            .await
            .map_err(|e| (true, anyhow::Error::from(e)))?;

        written += chunk.len() as u64;
    }

    dest.flush()
        .await
        .map_err(|e| (true, anyhow::Error::from(e)))?;

    Ok(written)
}
