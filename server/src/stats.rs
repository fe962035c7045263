//! Device capacity sampling.
//!
//! Each storage node periodically samples the filesystem under its
//! device mounts and writes total/used bytes back to the device rows,
//! which is what placement scoring runs on. The io-utilization
//! percentage is an opaque, externally sampled value and is not touched
//! here.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use tokio::task;
use tokio::time;
use tracing::instrument;

use crate::database::entity::device;
use crate::error::{ServerError, ServerResult};
use crate::shutdown::Shutdown;
use crate::State;

/// Samples device capacity periodically.
pub async fn run_device_stats(state: State, shutdown: Shutdown) {
    let interval = match &state.config.node {
        Some(node) => node.stats_interval,
        None => return,
    };

    loop {
        if let Err(e) = sample_once(&state).await {
            tracing::warn!("Device stats sampling failed: {}", e);
        }

        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::debug!("Device stats loop exited");
}

/// Samples every locally served device once.
#[instrument(skip_all)]
pub async fn sample_once(state: &State) -> ServerResult<()> {
    let node = state.node_config()?;
    let database = state.database().await?;

    for &devid in &node.devices {
        let mount = node.data_dir.join(format!("dev{}", devid));

        let stats = task::spawn_blocking(move || fs2::statvfs(&mount))
            .await
            .map_err(ServerError::storage_error)?;

        let stats = match stats {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Cannot sample device {}: {}", devid, e);
                continue;
            }
        };

        let total = stats.total_space() as i64;
        let used = (stats.total_space() - stats.available_space()) as i64;

        device::Entity::update_many()
            .col_expr(device::Column::TotalBytes, Expr::value(total))
            .col_expr(device::Column::UsedBytes, Expr::value(used))
            .filter(device::Column::Devid.eq(devid))
            .exec(database)
            .await
            .map_err(ServerError::database_error)?;
    }

    Ok(())
}
