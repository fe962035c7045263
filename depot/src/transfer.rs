//! The chunk transfer protocol, client side.
//!
//! Chunk files are written with an offset-addressed, resumable protocol:
//! `create` starts an upload and a zero offset marker, `append` writes a
//! contiguous range at the marker's current value, `query-offset` reads
//! the durable byte count back, and `cancel` drops the marker. An append
//! whose claimed offset does not match the marker is rejected with the
//! true offset, so a sender can always reseek and continue after any
//! interruption without re-transferring accepted bytes.
//!
//! The offset and total length travel in exactly one pair of header
//! names, [`OFFSET_HEADER`] and [`TOTAL_LENGTH_HEADER`], shared by the
//! receiver and every sender in this workspace.

use std::error::Error as StdError;
use std::io::{self, SeekFrom};
use std::time::Duration;

use displaydoc::Display;
use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio::time;

use crate::digest::{Algorithm, ResumableDigest};

/// Claimed offset of an append request; the durable offset in responses.
pub const OFFSET_HEADER: &str = "x-depot-offset";

/// Total upload length, sent with appends when known in advance.
pub const TOTAL_LENGTH_HEADER: &str = "x-depot-total-length";

/// Digest algorithm requested at upload creation.
pub const DIGEST_ALGO_HEADER: &str = "x-depot-digest-algo";

/// Serialized partial digest state of an in-progress upload.
pub const DIGEST_STATE_HEADER: &str = "x-depot-digest-state";

/// Final digest of a completed upload.
pub const DIGEST_HEADER: &str = "x-depot-digest";

/// Default size of one append request.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;

/// Delay between retries of transient failures.
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub type TransferResult<T> = Result<T, Error>;

/// A transfer error.
#[derive(Debug, Display)]
pub enum Error {
    /// No upload is in progress for this path.
    NotFound,

    /// Upload stalled at offset {offset}.
    Stalled { offset: u64 },

    /// Source ended at {at} bytes, before the declared length {total}.
    SourceTruncated { at: u64, total: u64 },

    /// Cannot reseek a non-seekable source to offset {offset}.
    CannotReseek { offset: u64 },

    /// Digest mismatch: sent {local}, receiver computed {remote}.
    DigestMismatch { local: String, remote: String },

    /// HTTP {status}: {message}
    Rejected { status: StatusCode, message: String },

    /// Gave up after {attempts} attempts: {message}
    RetriesExhausted { attempts: u32, message: String },

    /// Malformed response: {reason}
    MalformedResponse { reason: &'static str },

    /// I/O error: {error}
    IoError { error: io::Error },
}

impl StdError for Error {}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::IoError { error }
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone)]
pub struct SendReport {
    /// Bytes the receiver ended up with.
    pub length: u64,

    /// Final digest over the sent bytes, when tracking was requested.
    pub digest: Option<String>,

    /// Whether the receiver confirmed the digest.
    pub verified: bool,
}

/// Result of one append request.
enum AppendOutcome {
    /// The body was accepted; the durable offset is now `offset`.
    Accepted {
        offset: u64,
        digest: Option<String>,
    },

    /// The claimed offset was wrong; the durable offset is `current`.
    Conflict { current: u64 },
}

/// Uploads one chunk file over the transfer protocol.
#[derive(Debug, Clone)]
pub struct ChunkSender {
    client: HttpClient,
    url: String,
    chunk_size: usize,
    digest: Option<Algorithm>,
    retry_limit: Option<u32>,
}

impl ChunkSender {
    pub fn new(client: HttpClient, url: String) -> Self {
        Self {
            client,
            url,
            chunk_size: DEFAULT_CHUNK_SIZE,
            digest: None,
            retry_limit: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Enables digest tracking and end-to-end verification.
    pub fn with_digest(mut self, algorithm: Algorithm) -> Self {
        self.digest = Some(algorithm);
        self
    }

    /// Bounds retries of transient failures. Unset, the sender retries
    /// indefinitely.
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    /// Idempotently creates the chunk file and a zero offset marker.
    pub async fn create(&self) -> TransferResult<()> {
        let resp = self
            .request_with_retry(|| {
                let mut req = self.client.post(&self.url);
                if let Some(algorithm) = self.digest {
                    req = req.header(DIGEST_ALGO_HEADER, algorithm.as_str());
                }
                req
            })
            .await?;

        expect_success(resp).await?;
        Ok(())
    }

    /// Returns the receiver's durable offset, or `None` when no upload is
    /// in progress (never started, or already complete).
    pub async fn query_offset(&self) -> TransferResult<Option<u64>> {
        let resp = self
            .request_with_retry(|| self.client.head(&self.url))
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = expect_success(resp).await?;
        Ok(Some(header_u64(resp.headers(), OFFSET_HEADER)?))
    }

    /// Abandons the upload, or marks an unknown-length stream complete, by
    /// deleting the offset marker.
    pub async fn cancel(&self) -> TransferResult<()> {
        let resp = self
            .request_with_retry(|| self.client.delete(&self.url))
            .await?;

        expect_success(resp).await?;
        Ok(())
    }

    /// Uploads a seekable source.
    ///
    /// The source is split into fixed-size chunks sent as appends. Offset
    /// conflicts reseek the source to the receiver's durable offset and
    /// continue; transient failures are retried with the offset re-queried.
    /// With a known `total`, the receiver completes the upload on the final
    /// append; without one, completion is signaled by dropping the marker
    /// once the source is exhausted.
    pub async fn send<S>(&self, mut source: S, total: Option<u64>) -> TransferResult<SendReport>
    where
        S: AsyncRead + AsyncSeek + Unpin,
    {
        self.create().await?;

        let mut digest = self.digest.map(ResumableDigest::new);
        let mut digest_pos: u64 = 0;
        let mut offset: u64 = 0;
        let mut zero_move_at: Option<u64> = None;
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            source.seek(SeekFrom::Start(offset)).await?;
            let n = read_chunk(&mut source, &mut buf).await?;

            if n == 0 {
                match total {
                    None => {
                        // Streaming completion: drop the marker.
                        self.cancel().await?;
                        let local = finalize_at(&mut source, digest, &mut digest_pos, offset).await?;
                        return Ok(SendReport {
                            length: offset,
                            digest: local,
                            verified: false,
                        });
                    }
                    Some(t) if offset < t => {
                        return Err(Error::SourceTruncated {
                            at: offset,
                            total: t,
                        });
                    }
                    Some(t) if t > 0 => {
                        // The completing append already went through.
                        let local = finalize_at(&mut source, digest, &mut digest_pos, t).await?;
                        return Ok(SendReport {
                            length: t,
                            digest: local,
                            verified: false,
                        });
                    }
                    // Zero-length upload: the empty append below completes it.
                    Some(_) => {}
                }
            }

            let start = offset;
            match self.append(start, &buf[..n], total).await {
                Ok(AppendOutcome::Accepted {
                    offset: new_offset,
                    digest: remote,
                }) => {
                    if let Some(d) = digest.as_mut() {
                        if digest_pos == start {
                            d.update(&buf[..n]);
                            digest_pos = new_offset;
                        } else {
                            resync_digest(&mut source, d, &mut digest_pos, new_offset).await?;
                        }
                    }
                    zero_move_at = None;
                    offset = new_offset;

                    if total == Some(new_offset) {
                        let local =
                            finalize_at(&mut source, digest, &mut digest_pos, new_offset).await?;
                        if let (Some(local), Some(remote)) = (&local, &remote) {
                            if local != remote {
                                return Err(Error::DigestMismatch {
                                    local: local.clone(),
                                    remote: remote.clone(),
                                });
                            }
                        }
                        return Ok(SendReport {
                            length: new_offset,
                            digest: local,
                            verified: remote.is_some(),
                        });
                    }
                }
                Ok(AppendOutcome::Conflict { current }) => {
                    tracing::debug!(
                        "Offset conflict at {}: receiver is at {}, reseeking",
                        start,
                        current
                    );

                    if current > start {
                        zero_move_at = None;
                    } else {
                        if zero_move_at == Some(start) {
                            return Err(Error::Stalled { offset: start });
                        }
                        zero_move_at = Some(start);
                    }
                    offset = current;
                }
                Err(Error::NotFound) => {
                    // The receiver already completed this upload; the
                    // response to the final append was lost.
                    let Some(t) = total else {
                        return Err(Error::NotFound);
                    };
                    let local = finalize_at(&mut source, digest, &mut digest_pos, t).await?;
                    return Ok(SendReport {
                        length: t,
                        digest: local,
                        verified: false,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Uploads a non-seekable stream of unknown length.
    ///
    /// Conflicts can only be resolved within the currently buffered chunk;
    /// a receiver offset outside that window fails with `CannotReseek`.
    /// Completion is signaled by dropping the marker after the stream ends.
    pub async fn send_stream<S>(&self, mut source: S) -> TransferResult<SendReport>
    where
        S: AsyncRead + Unpin,
    {
        self.create().await?;

        let mut digest = self.digest.map(ResumableDigest::new);
        let mut digest_pos: u64 = 0;
        let mut offset: u64 = 0;
        let mut zero_move_at: Option<u64> = None;
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let n = read_chunk(&mut source, &mut buf).await?;
            if n == 0 {
                self.cancel().await?;
                return Ok(SendReport {
                    length: offset,
                    digest: digest.map(|d| d.finalize()),
                    verified: false,
                });
            }

            let chunk_start = offset;
            let chunk_end = chunk_start + n as u64;

            while offset < chunk_end {
                let at = (offset - chunk_start) as usize;
                match self.append(offset, &buf[at..n], None).await? {
                    AppendOutcome::Accepted {
                        offset: new_offset, ..
                    } => {
                        if let Some(d) = digest.as_mut() {
                            if new_offset > digest_pos {
                                let from = (digest_pos - chunk_start) as usize;
                                let to = (new_offset - chunk_start) as usize;
                                d.update(&buf[from..to]);
                                digest_pos = new_offset;
                            }
                        }
                        zero_move_at = None;
                        offset = new_offset;
                    }
                    AppendOutcome::Conflict { current } => {
                        if current < chunk_start || current > chunk_end {
                            return Err(Error::CannotReseek { offset: current });
                        }
                        if current <= offset {
                            if zero_move_at == Some(offset) {
                                return Err(Error::Stalled { offset });
                            }
                            zero_move_at = Some(offset);
                        }
                        offset = current;
                    }
                }
            }
        }
    }

    async fn append(
        &self,
        offset: u64,
        bytes: &[u8],
        total: Option<u64>,
    ) -> TransferResult<AppendOutcome> {
        let resp = self
            .request_with_retry(|| {
                let mut req = self
                    .client
                    .patch(&self.url)
                    .header(OFFSET_HEADER, offset.to_string());
                if let Some(total) = total {
                    req = req.header(TOTAL_LENGTH_HEADER, total.to_string());
                }
                req.body(bytes.to_vec())
            })
            .await?;

        if resp.status() == StatusCode::PRECONDITION_FAILED {
            let current = header_u64(resp.headers(), OFFSET_HEADER)?;
            return Ok(AppendOutcome::Conflict { current });
        }

        let resp = expect_success(resp).await?;
        let digest = resp
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let offset = header_u64(resp.headers(), OFFSET_HEADER)?;

        Ok(AppendOutcome::Accepted { offset, digest })
    }

    /// Performs a request, retrying 5xx responses and network errors.
    async fn request_with_retry<F>(&self, build: F) -> TransferResult<Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempts = 0u32;

        loop {
            let message = match build().send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    format!("HTTP {}", resp.status())
                }
                Ok(resp) => return Ok(resp),
                Err(e) => e.to_string(),
            };

            attempts += 1;
            if let Some(limit) = self.retry_limit {
                if attempts >= limit {
                    return Err(Error::RetriesExhausted { attempts, message });
                }
            }

            tracing::debug!("Transient transfer failure ({}), retrying", message);
            time::sleep(RETRY_DELAY).await;
        }
    }
}

/// Fills `buf` from the source, stopping early only at EOF.
async fn read_chunk<S: AsyncRead + Unpin>(source: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(filled)
}

/// Brings a digest up to `target` by re-reading the source, then resets the
/// source position to the caller's responsibility.
async fn resync_digest<S>(
    source: &mut S,
    digest: &mut ResumableDigest,
    digest_pos: &mut u64,
    target: u64,
) -> TransferResult<()>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    if target < *digest_pos {
        *digest = ResumableDigest::new(digest.algorithm());
        *digest_pos = 0;
    }

    if target == *digest_pos {
        return Ok(());
    }

    source.seek(SeekFrom::Start(*digest_pos)).await?;

    let mut remaining = target - *digest_pos;
    let mut buf = vec![0u8; 64 * 1024];

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::SourceTruncated {
                at: target - remaining,
                total: target,
            });
        }
        digest.update(&buf[..n]);
        remaining -= n as u64;
    }

    *digest_pos = target;
    Ok(())
}

/// Finalizes an optional digest after syncing it to `target`.
async fn finalize_at<S>(
    source: &mut S,
    digest: Option<ResumableDigest>,
    digest_pos: &mut u64,
    target: u64,
) -> TransferResult<Option<String>>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    match digest {
        Some(mut d) => {
            resync_digest(source, &mut d, digest_pos, target).await?;
            Ok(Some(d.finalize()))
        }
        None => Ok(None),
    }
}

async fn expect_success(resp: Response) -> TransferResult<Response> {
    let status = resp.status();

    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound);
    }

    let message = resp.text().await.unwrap_or_default();
    Err(Error::Rejected { status, message })
}

fn header_u64(headers: &HeaderMap, name: &str) -> TransferResult<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or(Error::MalformedResponse {
            reason: "missing or invalid offset header",
        })
}
