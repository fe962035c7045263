use anyhow::Result;
use clap::Parser;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};

use depot_server::database::entity::host::{self, Entity as Host};

/// Register a new storage host.
#[derive(Debug, Parser)]
pub struct AddHost {
    /// Address clients reach the host at.
    #[clap(long)]
    hostname: String,

    /// Port of the chunk transfer endpoint.
    #[clap(long, default_value = "7501")]
    http_port: u16,

    /// Dedicated read port, if any.
    #[clap(long)]
    http_get_port: Option<u16>,
}

pub async fn run(database: &DatabaseConnection, command: AddHost) -> Result<()> {
    let insertion = Host::insert(host::ActiveModel {
        hostname: Set(command.hostname.clone()),
        http_port: Set(command.http_port as i32),
        http_get_port: Set(command.http_get_port.map(|port| port as i32)),
        ..Default::default()
    })
    .exec(database)
    .await?;

    println!(
        "Added host {} (hostid {})",
        command.hostname, insertion.last_insert_id
    );

    Ok(())
}
