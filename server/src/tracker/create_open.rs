use axum::extract::{Extension, Form, Query};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::database::TrackerDatabase;
use crate::error::{ServerError, ServerResult};
use crate::State;
use depot::api::CreateOpenResponse;
use depot::chunkpath::Fid;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateOpenRequest {
    /// Declared object size, used to filter devices by free space.
    size: Option<i64>,
}

/// Reserves a fid and picks a destination device for a new upload.
///
/// The object stays invisible until the matching `create-close` commits
/// it; an uploader that never finishes leaves only a reservation, which
/// the reconciler purges.
#[instrument(skip_all)]
#[axum_macros::debug_handler]
pub(crate) async fn create_open(
    Extension(state): Extension<State>,
    Query(query): Query<CreateOpenRequest>,
    form: Option<Form<CreateOpenRequest>>,
) -> ServerResult<Json<CreateOpenResponse>> {
    let req = form.map(|form| form.0).unwrap_or(query);

    let database = state.database().await?;
    let placement = state.placement();

    let device = placement.choose_writable(req.size).await?;
    let fid = database.reserve_fid(device.devid).await?;

    let path = placement
        .chunk_url(device.devid, Fid::new(fid), false)
        .await
        .ok_or(ServerError::NoDeviceFound)?;

    tracing::debug!("Reserved fid {} on device {}", fid, device.devid);

    Ok(Json(CreateOpenResponse {
        path,
        fid,
        devid: device.devid,
    }))
}
