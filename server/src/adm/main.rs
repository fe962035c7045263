mod command;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use command::add_device::{self, AddDevice};
use command::add_host::{self, AddHost};
use command::list_devices::{self, ListDevices};
use command::set_device::{self, SetDeviceIo, SetDeviceStatus};
use depot_server::config;

/// Depot server administration utilities.
#[derive(Debug, Parser)]
#[clap(version)]
#[clap(propagate_version = true)]
pub struct Opts {
    /// Path to the config file.
    #[clap(short = 'f', long)]
    config: Option<PathBuf>,

    /// The sub-command.
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    AddHost(AddHost),
    AddDevice(AddDevice),
    SetDeviceStatus(SetDeviceStatus),
    SetDeviceIo(SetDeviceIo),
    ListDevices(ListDevices),
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    let config = config::load_config(opts.config.as_deref())?;

    let database = sea_orm::Database::connect(&config.database.url).await?;

    match opts.command {
        Command::AddHost(command) => add_host::run(&database, command).await,
        Command::AddDevice(command) => add_device::run(&database, command).await,
        Command::SetDeviceStatus(command) => set_device::run_status(&database, command).await,
        Command::SetDeviceIo(command) => set_device::run_io(&database, command).await,
        Command::ListDevices(command) => list_devices::run(&database, command).await,
    }
}
