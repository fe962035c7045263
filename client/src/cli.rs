//! Global CLI setup.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::command::get::{self, Get};
use crate::command::list::{self, Devices, Hosts};
use crate::command::paths::{self, Paths};
use crate::command::ping::{self, Ping};
use crate::command::put::{self, Put};
use crate::command::rm::{self, Rm};
use crate::config::ClientConfig;

/// Depot blob store client.
#[derive(Debug, Parser)]
#[clap(version)]
#[clap(propagate_version = true)]
pub struct Opts {
    /// Tracker endpoint, overriding the configuration file.
    #[clap(long, global = true)]
    tracker: Option<String>,

    /// Size of one append request in bytes, overriding the configuration
    /// file.
    #[clap(long, global = true)]
    chunk_size: Option<usize>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Put(Put),
    Get(Get),
    Rm(Rm),
    Paths(Paths),
    Devices(Devices),
    Hosts(Hosts),
    Ping(Ping),
}

pub async fn run() -> Result<()> {
    let opts = Opts::parse();
    let config = ClientConfig::load(opts.tracker, opts.chunk_size)?;

    match opts.command {
        Command::Put(sub) => put::run(config, sub).await,
        Command::Get(sub) => get::run(config, sub).await,
        Command::Rm(sub) => rm::run(config, sub).await,
        Command::Paths(sub) => paths::run(config, sub).await,
        Command::Devices(sub) => list::run_devices(config, sub).await,
        Command::Hosts(sub) => list::run_hosts(config, sub).await,
        Command::Ping(sub) => ping::run(config, sub).await,
    }
}
