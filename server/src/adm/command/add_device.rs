use anyhow::Result;
use clap::Parser;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};

use depot_server::database::entity::device::{self, DeviceStatus, Entity as Device};

/// Register a new device on a host.
#[derive(Debug, Parser)]
pub struct AddDevice {
    /// Numeric device id; must match the serving node's `devN` directory.
    #[clap(long)]
    devid: i32,

    /// Host serving the device.
    #[clap(long)]
    hostid: i32,

    /// Initial status.
    #[clap(long, default_value = "empty")]
    status: DeviceStatus,
}

pub async fn run(database: &DatabaseConnection, command: AddDevice) -> Result<()> {
    Device::insert(device::ActiveModel {
        devid: Set(command.devid),
        hostid: Set(command.hostid),
        status: Set(command.status),
        total_bytes: Set(None),
        used_bytes: Set(None),
        io_utilization: Set(None),
        last_drain_at: Set(None),
        last_disk_clean_at: Set(None),
        last_device_clean_at: Set(None),
    })
    .exec_without_returning(database)
    .await?;

    println!(
        "Added device {} on host {} ({})",
        command.devid,
        command.hostid,
        command.status.as_str()
    );

    Ok(())
}
