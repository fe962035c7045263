use axum::extract::{Extension, Form, Query};
use serde::Deserialize;
use tokio::task::spawn;
use tracing::instrument;

use super::require;
use crate::database::TrackerDatabase;
use crate::error::{ServerError, ServerResult};
use crate::State;
use depot::key::Key;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeleteRequest {
    key: Option<String>,
}

/// Deletes an object and tells the affected devices to drop its chunk.
///
/// The notification is a best-effort hint; physical cleanup is
/// guaranteed by the disk-clean pass.
#[instrument(skip_all)]
pub(crate) async fn delete(
    Extension(state): Extension<State>,
    Query(query): Query<DeleteRequest>,
    form: Option<Form<DeleteRequest>>,
) -> ServerResult<()> {
    let req = form.map(|form| form.0).unwrap_or(query);
    let key = Key::new(require(req.key, "key")?).map_err(ServerError::DepotError)?;

    let database = state.database().await?;
    let Some((fid, devids)) = database.delete_file(&key).await? else {
        return Err(ServerError::NoSuchObject);
    };

    tracing::debug!("Deleted \"{}\" (fid {})", key.as_str(), fid);

    for devid in devids {
        let notifier = state.notifier().clone();
        spawn(async move { notifier.chunk_deleted(devid, fid).await });
    }

    Ok(())
}
