use axum::extract::{Extension, Query};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::database::TrackerDatabase;
use crate::error::{ServerError, ServerResult};
use crate::State;
use depot::api::GetPathsResponse;
use depot::chunkpath::Fid;
use depot::key::Key;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GetPathsRequest {
    key: String,
}

/// Returns every reachable URL for an object, best placement first.
///
/// An unknown key is an empty list, not an error.
#[instrument(skip_all)]
pub(crate) async fn get_paths(
    Extension(state): Extension<State>,
    Query(req): Query<GetPathsRequest>,
) -> ServerResult<Json<GetPathsResponse>> {
    let key = Key::new(req.key).map_err(ServerError::DepotError)?;

    let database = state.database().await?;
    let Some((file, devids)) = database.locate_file(&key).await? else {
        return Ok(Json(GetPathsResponse { paths: Vec::new() }));
    };

    let placement = state.placement();
    let ordered = placement.order_readable(&devids).await;

    let mut paths = Vec::with_capacity(ordered.len());
    for device in ordered {
        if let Some(url) = placement
            .chunk_url(device.devid, Fid::new(file.fid), true)
            .await
        {
            paths.push(url);
        }
    }

    Ok(Json(GetPathsResponse { paths }))
}
