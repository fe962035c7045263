use anyhow::Result;
use clap::Parser;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};

use depot_server::database::entity::device::{self, DeviceStatus, Entity as Device};

/// Change a device's status.
#[derive(Debug, Parser)]
pub struct SetDeviceStatus {
    #[clap(long)]
    devid: i32,

    /// One of: alive, drain, readonly, dead, empty.
    #[clap(long)]
    status: DeviceStatus,
}

/// Record a device's externally sampled io utilization.
#[derive(Debug, Parser)]
pub struct SetDeviceIo {
    #[clap(long)]
    devid: i32,

    /// Utilization percentage.
    #[clap(long)]
    percent: i16,
}

pub async fn run_status(database: &DatabaseConnection, command: SetDeviceStatus) -> Result<()> {
    Device::update(device::ActiveModel {
        devid: Set(command.devid),
        status: Set(command.status),
        ..Default::default()
    })
    .exec(database)
    .await?;

    println!(
        "Device {} is now {}",
        command.devid,
        command.status.as_str()
    );

    Ok(())
}

pub async fn run_io(database: &DatabaseConnection, command: SetDeviceIo) -> Result<()> {
    Device::update(device::ActiveModel {
        devid: Set(command.devid),
        io_utilization: Set(Some(command.percent)),
        ..Default::default()
    })
    .exec(database)
    .await?;

    println!(
        "Device {} io utilization is now {}%",
        command.devid, command.percent
    );

    Ok(())
}
