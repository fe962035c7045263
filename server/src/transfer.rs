//! The chunk transfer receiver.
//!
//! Storage nodes expose each chunk file at its device-relative path:
//! `POST` creates an upload, `HEAD` reports the durable offset, `PATCH`
//! appends at the claimed offset, `DELETE` abandons the upload and `GET`
//! serves the bytes back. Appends whose claimed offset does not match
//! the marker fail with 412 and the true offset in the response header,
//! never silently overwriting data.
//!
//! The durable offset lives in a `.offset` sidecar next to the chunk
//! file; it disappears when the upload completes, which is the
//! completion signal. When the uploader requests checksumming, a `.info`
//! sidecar carries the resumable digest state across appends.

use std::io::{self, SeekFrom};
use std::path::{Path as FsPath, PathBuf};

use anyhow::anyhow;
use axum::body::StreamBody;
use axum::extract::{BodyStream, Extension, Path};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::head;
use axum::Router;
use futures::StreamExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::instrument;

use crate::error::{ServerError, ServerResult};
use crate::State;
use depot::chunkpath::{Fid, INFO_EXT, OFFSET_EXT};
use depot::digest::{Algorithm, ResumableDigest};
use depot::transfer::{
    DIGEST_ALGO_HEADER, DIGEST_HEADER, DIGEST_STATE_HEADER, OFFSET_HEADER, TOTAL_LENGTH_HEADER,
};

pub(crate) fn get_router() -> Router {
    Router::new().route(
        "/*path",
        head(query_offset)
            .get(fetch)
            .post(create)
            .patch(append)
            .delete(cancel),
    )
}

/// Filesystem locations of a chunk file and its sidecars.
pub(crate) struct ChunkLoc {
    file: PathBuf,
    offset_marker: PathBuf,
    info: PathBuf,
}

impl ChunkLoc {
    pub(crate) fn new(data_dir: &FsPath, devid: i32, fid: Fid) -> Self {
        let file = data_dir.join(fid.dev_path(devid));
        let offset_marker = file.with_extension(OFFSET_EXT);
        let info = file.with_extension(INFO_EXT);

        Self {
            file,
            offset_marker,
            info,
        }
    }
}

/// Resolves a request path to a local chunk location.
///
/// Only paths matching the canonical fid layout under a locally served
/// device resolve, so nothing outside the data directory is reachable.
fn resolve(state: &State, path: &str) -> ServerResult<ChunkLoc> {
    let node = state.node_config()?;

    let (dev, rest) = path.split_once('/').ok_or(ServerError::NotFound)?;
    let devid: i32 = dev
        .strip_prefix("dev")
        .and_then(|id| id.parse().ok())
        .ok_or(ServerError::NotFound)?;

    if !node.devices.contains(&devid) {
        return Err(ServerError::NotFound);
    }

    let fid = Fid::from_rel_path(rest)?;
    Ok(ChunkLoc::new(&node.data_dir, devid, fid))
}

/// Creates a new upload.
#[instrument(skip_all, fields(path))]
pub(crate) async fn create(
    Extension(state): Extension<State>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> ServerResult<StatusCode> {
    let loc = resolve(&state, &path)?;
    let digest = digest_algo_from_headers(&headers)?;

    ensure_created(&loc, digest).await?;
    Ok(StatusCode::CREATED)
}

/// Reports the durable offset of an in-progress upload.
#[instrument(skip_all, fields(path))]
pub(crate) async fn query_offset(
    Extension(state): Extension<State>,
    Path(path): Path<String>,
) -> ServerResult<Response> {
    let loc = resolve(&state, &path)?;
    let offset = read_offset(&loc.offset_marker).await?;

    let mut response = (StatusCode::OK, [(OFFSET_HEADER, offset.to_string())]).into_response();

    if let Ok(digest_state) = fs::read_to_string(&loc.info).await {
        if let Ok(value) = HeaderValue::from_str(digest_state.trim()) {
            response.headers_mut().insert(DIGEST_STATE_HEADER, value);
        }
    }

    Ok(response)
}

/// Appends a contiguous byte range at the claimed offset.
#[instrument(skip_all, fields(path))]
pub(crate) async fn append(
    Extension(state): Extension<State>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: BodyStream,
) -> ServerResult<Response> {
    let loc = resolve(&state, &path)?;

    let claimed = required_header_u64(&headers, OFFSET_HEADER)?;
    let total = optional_header_u64(&headers, TOTAL_LENGTH_HEADER)?;

    let current = match read_offset(&loc.offset_marker).await {
        Ok(offset) => offset,
        Err(ServerError::NoUploadInProgress) if claimed == 0 => {
            // An append at zero implicitly creates the upload.
            ensure_created(&loc, digest_algo_from_headers(&headers)?).await?;
            0
        }
        Err(e) => return Err(e),
    };

    if claimed != current {
        return Err(ServerError::OffsetConflict { claimed, current });
    }

    let body = StreamReader::new(
        body.map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))),
    );

    let outcome = apply_append(&loc, current, total, body).await?;

    let mut response =
        (StatusCode::OK, [(OFFSET_HEADER, outcome.offset.to_string())]).into_response();

    if let Some(digest) = &outcome.digest {
        if let Ok(value) = HeaderValue::from_str(digest) {
            response.headers_mut().insert(DIGEST_HEADER, value);
        }
    }

    Ok(response)
}

/// Abandons an upload by deleting its offset marker.
#[instrument(skip_all, fields(path))]
pub(crate) async fn cancel(
    Extension(state): Extension<State>,
    Path(path): Path<String>,
) -> ServerResult<StatusCode> {
    let loc = resolve(&state, &path)?;

    match fs::remove_file(&loc.offset_marker).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ServerError::NoUploadInProgress);
        }
        Err(e) => return Err(ServerError::storage_error(e)),
    }

    remove_if_exists(&loc.info).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serves a chunk file back.
#[instrument(skip_all, fields(path))]
pub(crate) async fn fetch(
    Extension(state): Extension<State>,
    Path(path): Path<String>,
) -> ServerResult<Response> {
    let loc = resolve(&state, &path)?;

    let file = match File::open(&loc.file).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ServerError::NotFound),
        Err(e) => return Err(ServerError::storage_error(e)),
    };

    let length = file
        .metadata()
        .await
        .map_err(ServerError::storage_error)?
        .len();

    Ok((
        StatusCode::OK,
        [(CONTENT_LENGTH, length.to_string())],
        StreamBody::new(ReaderStream::new(file)),
    )
        .into_response())
}

/// Outcome of one append.
#[derive(Debug)]
pub(crate) struct AppendOutcome {
    /// The new durable offset.
    pub offset: u64,

    /// Whether the upload is now complete.
    pub complete: bool,

    /// The final digest, when tracked and complete.
    pub digest: Option<String>,
}

/// Idempotently sets up the chunk file, a zero offset marker, and the
/// digest sidecar when checksumming was requested.
pub(crate) async fn ensure_created(loc: &ChunkLoc, digest: Option<Algorithm>) -> ServerResult<()> {
    if let Some(parent) = loc.file.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(ServerError::storage_error)?;
    }

    File::create(&loc.file)
        .await
        .map_err(ServerError::storage_error)?;

    write_offset(&loc.offset_marker, 0).await?;

    match digest {
        Some(algorithm) => {
            let fresh = ResumableDigest::new(algorithm);
            fs::write(&loc.info, fresh.serialize_state())
                .await
                .map_err(ServerError::storage_error)?;
        }
        // Re-creating an upload clears any stale digest state.
        None => remove_if_exists(&loc.info).await?,
    }

    Ok(())
}

/// Writes the body at `current` and advances the marker, deleting it when
/// the declared total length is reached.
pub(crate) async fn apply_append<R>(
    loc: &ChunkLoc,
    current: u64,
    total: Option<u64>,
    mut body: R,
) -> ServerResult<AppendOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut digest = match fs::read_to_string(&loc.info).await {
        Ok(digest_state) => Some(ResumableDigest::from_state(digest_state.trim())?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(ServerError::storage_error(e)),
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&loc.file)
        .await
        .map_err(ServerError::storage_error)?;

    file.seek(SeekFrom::Start(current))
        .await
        .map_err(ServerError::storage_error)?;

    let mut written: u64 = 0;
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = body
            .read(&mut buf)
            .await
            .map_err(ServerError::request_error)?;
        if n == 0 {
            break;
        }

        if let Some(total) = total {
            if current + written + n as u64 > total {
                return Err(ServerError::RequestError(anyhow!(
                    "body exceeds the declared total length {}",
                    total
                )));
            }
        }

        file.write_all(&buf[..n])
            .await
            .map_err(ServerError::storage_error)?;

        if let Some(digest) = digest.as_mut() {
            digest.update(&buf[..n]);
        }

        written += n as u64;
    }

    // The marker only ever reflects durable bytes.
    file.sync_data().await.map_err(ServerError::storage_error)?;

    let offset = current + written;

    if total == Some(offset) {
        remove_if_exists(&loc.offset_marker).await?;
        let final_digest = digest.map(|digest| digest.finalize());
        remove_if_exists(&loc.info).await?;

        return Ok(AppendOutcome {
            offset,
            complete: true,
            digest: final_digest,
        });
    }

    write_offset(&loc.offset_marker, offset).await?;
    if let Some(digest) = &digest {
        fs::write(&loc.info, digest.serialize_state())
            .await
            .map_err(ServerError::storage_error)?;
    }

    Ok(AppendOutcome {
        offset,
        complete: false,
        digest: None,
    })
}

/// Reads the durable offset from the marker.
pub(crate) async fn read_offset(marker: &FsPath) -> ServerResult<u64> {
    let content = match fs::read_to_string(marker).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ServerError::NoUploadInProgress);
        }
        Err(e) => return Err(ServerError::storage_error(e)),
    };

    content
        .trim()
        .parse()
        .map_err(|_| ServerError::StorageError(anyhow!("corrupt offset marker {:?}", marker)))
}

async fn write_offset(marker: &FsPath, offset: u64) -> ServerResult<()> {
    fs::write(marker, offset.to_string())
        .await
        .map_err(ServerError::storage_error)
}

async fn remove_if_exists(path: &FsPath) -> ServerResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ServerError::storage_error(e)),
    }
}

fn digest_algo_from_headers(headers: &HeaderMap) -> ServerResult<Option<Algorithm>> {
    let Some(value) = headers.get(DIGEST_ALGO_HEADER) else {
        return Ok(None);
    };

    let name = value
        .to_str()
        .map_err(|_| ServerError::RequestError(anyhow!("invalid digest algorithm header")))?;

    Ok(Some(name.parse().map_err(ServerError::DepotError)?))
}

fn required_header_u64(headers: &HeaderMap, name: &str) -> ServerResult<u64> {
    optional_header_u64(headers, name)?
        .ok_or_else(|| ServerError::RequestError(anyhow!("missing header {}", name)))
}

fn optional_header_u64(headers: &HeaderMap, name: &str) -> ServerResult<Option<u64>> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Some)
        .ok_or_else(|| ServerError::RequestError(anyhow!("invalid header {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_lifecycle() {
        let dir = tempdir().unwrap();
        let loc = ChunkLoc::new(dir.path(), 1, Fid::new(42));

        ensure_created(&loc, Some(Algorithm::Sha256)).await.unwrap();
        assert_eq!(0, read_offset(&loc.offset_marker).await.unwrap());

        let first = apply_append(&loc, 0, Some(11), &b"hello "[..]).await.unwrap();
        assert_eq!(6, first.offset);
        assert!(!first.complete);
        assert_eq!(6, read_offset(&loc.offset_marker).await.unwrap());

        let second = apply_append(&loc, 6, Some(11), &b"world"[..]).await.unwrap();
        assert_eq!(11, second.offset);
        assert!(second.complete);
        assert_eq!(
            Some("sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"),
            second.digest.as_deref()
        );

        // Completion deletes both sidecars; the bytes are exactly the
        // concatenation of the appends.
        assert!(matches!(
            read_offset(&loc.offset_marker).await,
            Err(ServerError::NoUploadInProgress)
        ));
        assert!(!loc.info.exists());
        assert_eq!(b"hello world".as_slice(), fs::read(&loc.file).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_append_at_accepted_offset() {
        let dir = tempdir().unwrap();
        let loc = ChunkLoc::new(dir.path(), 1, Fid::new(7));

        ensure_created(&loc, None).await.unwrap();
        apply_append(&loc, 0, Some(10), &b"01234"[..]).await.unwrap();

        // A retry of the same append overwrites the same range.
        apply_append(&loc, 0, Some(10), &b"01234"[..]).await.unwrap();
        apply_append(&loc, 5, Some(10), &b"56789"[..]).await.unwrap();

        assert_eq!(b"0123456789".as_slice(), fs::read(&loc.file).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_length_upload() {
        let dir = tempdir().unwrap();
        let loc = ChunkLoc::new(dir.path(), 1, Fid::new(8));

        ensure_created(&loc, None).await.unwrap();
        let outcome = apply_append(&loc, 0, Some(0), &b""[..]).await.unwrap();

        assert!(outcome.complete);
        assert_eq!(0, outcome.offset);
        assert_eq!(0, fs::metadata(&loc.file).await.unwrap().len());
        assert!(!loc.offset_marker.exists());
    }

    #[tokio::test]
    async fn test_recreate_resets_upload() {
        let dir = tempdir().unwrap();
        let loc = ChunkLoc::new(dir.path(), 1, Fid::new(9));

        ensure_created(&loc, None).await.unwrap();
        apply_append(&loc, 0, None, &b"partial"[..]).await.unwrap();
        assert_eq!(7, read_offset(&loc.offset_marker).await.unwrap());

        ensure_created(&loc, None).await.unwrap();
        assert_eq!(0, read_offset(&loc.offset_marker).await.unwrap());
        assert_eq!(0, fs::metadata(&loc.file).await.unwrap().len());
    }

    #[tokio::test]
    async fn test_body_beyond_declared_total_is_rejected() {
        let dir = tempdir().unwrap();
        let loc = ChunkLoc::new(dir.path(), 1, Fid::new(10));

        ensure_created(&loc, None).await.unwrap();
        apply_append(&loc, 0, Some(3), &b"hello"[..]).await.unwrap_err();
    }

    #[tokio::test]
    async fn test_digest_state_rides_the_sidecar() {
        let dir = tempdir().unwrap();
        let loc = ChunkLoc::new(dir.path(), 1, Fid::new(11));

        ensure_created(&loc, Some(Algorithm::Crc32)).await.unwrap();
        apply_append(&loc, 0, Some(11), &b"hello "[..]).await.unwrap();

        // The sidecar state resumes across appends.
        let outcome = apply_append(&loc, 6, Some(11), &b"world"[..]).await.unwrap();
        assert_eq!(Some("crc32:0d4a1185"), outcome.digest.as_deref());
    }
}
