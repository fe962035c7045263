use axum::extract::Extension;
use axum::Json;
use sea_orm::entity::prelude::*;
use tracing::instrument;

use crate::database::entity::device::Entity as Device;
use crate::database::entity::host::Entity as Host;
use crate::error::{ServerError, ServerResult};
use crate::State;
use depot::api::{DeviceInfo, GetDevicesResponse, GetHostsResponse, HostInfo};

#[instrument(skip_all)]
pub(crate) async fn get_devices(
    Extension(state): Extension<State>,
) -> ServerResult<Json<GetDevicesResponse>> {
    let database = state.database().await?;

    let devices = Device::find()
        .all(database)
        .await
        .map_err(ServerError::database_error)?
        .into_iter()
        .map(|device| DeviceInfo {
            devid: device.devid,
            hostid: device.hostid,
            status: device.status.as_str().to_owned(),
            total_bytes: device.total_bytes,
            used_bytes: device.used_bytes,
            io_utilization: device.io_utilization,
        })
        .collect();

    Ok(Json(GetDevicesResponse { devices }))
}

#[instrument(skip_all)]
pub(crate) async fn get_hosts(
    Extension(state): Extension<State>,
) -> ServerResult<Json<GetHostsResponse>> {
    let database = state.database().await?;

    let hosts = Host::find()
        .all(database)
        .await
        .map_err(ServerError::database_error)?
        .into_iter()
        .map(|host| HostInfo {
            hostid: host.hostid,
            hostname: host.hostname,
            http_port: host.http_port as u16,
            http_get_port: host.http_get_port.map(|port| port as u16),
        })
        .collect();

    Ok(Json(GetHostsResponse { hosts }))
}
