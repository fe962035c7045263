use anyhow::Result;
use clap::Parser;
use sea_orm::{DatabaseConnection, EntityTrait};

use depot_server::database::entity::device::Entity as Device;

/// List every registered device.
#[derive(Debug, Parser)]
pub struct ListDevices {}

pub async fn run(database: &DatabaseConnection, _command: ListDevices) -> Result<()> {
    let devices = Device::find().all(database).await?;

    println!(
        "{:>6} {:>6} {:<9} {:>14} {:>14} {:>4}",
        "devid", "hostid", "status", "total", "used", "io"
    );

    for device in devices {
        println!(
            "{:>6} {:>6} {:<9} {:>14} {:>14} {:>4}",
            device.devid,
            device.hostid,
            device.status.as_str(),
            device
                .total_bytes
                .map(|bytes| bytes.to_string())
                .unwrap_or_else(|| "-".to_string()),
            device
                .used_bytes
                .map(|bytes| bytes.to_string())
                .unwrap_or_else(|| "-".to_string()),
            device
                .io_utilization
                .map(|pct| format!("{}%", pct))
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}
