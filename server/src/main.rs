use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::join;
use tracing_subscriber::EnvFilter;

use depot_server::config;
use depot_server::shutdown::{self, ShutdownHandle};

/// Distributed blob store server.
#[derive(Debug, Parser)]
#[clap(version)]
#[clap(propagate_version = true)]
struct Opts {
    /// Path to the config file.
    #[clap(short = 'f', long)]
    config: Option<PathBuf>,

    /// Socket address the tracker listens on.
    ///
    /// This overrides `listen` in the config.
    #[clap(short = 'l', long)]
    listen: Option<SocketAddr>,

    /// Mode to run.
    #[clap(long, default_value = "monolithic")]
    mode: ServerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ServerMode {
    /// Run the tracker and, when configured, the storage node.
    Monolithic,

    /// Run the tracker API and its background loops.
    Tracker,

    /// Run the storage node and its background loops.
    StorageNode,

    /// Run the database migrations then exit.
    DbMigrations,

    /// Run every reconciliation pass once then exit.
    ReconcileOnce,

    /// Check the configuration then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    init_logging();
    dump_version();

    let config = config::load_config(opts.config.as_deref())?;

    let (handle, shutdown) = shutdown::channel();
    tokio::spawn(handle_signals(handle));

    match opts.mode {
        ServerMode::Monolithic => {
            depot_server::run_migrations(config.clone()).await?;

            if config.node.is_some() {
                let (tracker, node) = join!(
                    depot_server::run_tracker(opts.listen, config.clone(), shutdown.clone()),
                    depot_server::run_storage_node(config.clone(), shutdown.clone()),
                );

                tracker?;
                node?;
            } else {
                depot_server::run_tracker(opts.listen, config, shutdown).await?;
            }
        }
        ServerMode::Tracker => {
            depot_server::run_tracker(opts.listen, config, shutdown).await?;
        }
        ServerMode::StorageNode => {
            depot_server::run_storage_node(config, shutdown).await?;
        }
        ServerMode::DbMigrations => {
            depot_server::run_migrations(config).await?;
        }
        ServerMode::ReconcileOnce => {
            depot_server::run_reconciliation_once(config).await?;
        }
        ServerMode::CheckConfig => {
            // config is valid, let's just exit :)
        }
    }

    Ok(())
}

/// Maps the first interrupt to a graceful shutdown; a second one exits
/// immediately.
async fn handle_signals(handle: ShutdownHandle) {
    wait_for_signal().await;
    tracing::info!("Shutting down; interrupt again to exit immediately");
    handle.shutdown();

    wait_for_signal().await;
    tracing::warn!("Exiting immediately");
    process::exit(130);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_logging() {
    let env_filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn dump_version() {
    #[cfg(debug_assertions)]
    eprintln!("Depot Server {} (debug)", env!("CARGO_PKG_VERSION"));

    #[cfg(not(debug_assertions))]
    eprintln!("Depot Server {} (release)", env!("CARGO_PKG_VERSION"));
}
