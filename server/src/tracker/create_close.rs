use axum::extract::{Extension, Form, Query};
use serde::Deserialize;
use tracing::instrument;

use super::require;
use crate::database::TrackerDatabase;
use crate::error::{ServerError, ServerResult};
use crate::State;
use depot::key::Key;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateCloseRequest {
    fid: Option<i64>,
    devid: Option<i32>,
    key: Option<String>,
    size: Option<i64>,
}

/// Commits an upload: deletes the reservation and creates the file and
/// its location in one transaction.
#[instrument(skip_all)]
pub(crate) async fn create_close(
    Extension(state): Extension<State>,
    Query(query): Query<CreateCloseRequest>,
    form: Option<Form<CreateCloseRequest>>,
) -> ServerResult<()> {
    let req = form.map(|form| form.0).unwrap_or(query);

    let fid = require(req.fid, "fid")?;
    let devid = require(req.devid, "devid")?;
    let key = require(req.key, "key")?;
    let size = require(req.size, "size")?;

    let key = Key::new(key).map_err(ServerError::DepotError)?;

    let database = state.database().await?;
    database.commit_file(fid, devid, &key, size).await?;

    tracing::debug!(
        "Committed fid {} as \"{}\" on device {}",
        fid,
        key.as_str(),
        devid
    );

    Ok(())
}
