#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

//! The Depot server.
//!
//! One binary carries both halves of the cluster: the **tracker** (the
//! metadata API over the relational store, plus the placement cache and
//! the stale-reservation purge) and the **storage node** (the chunk
//! transfer API over the local data directory, plus the disk-clean,
//! device-clean and auto-drain loops). `depotd --mode` selects which
//! halves run.

pub mod config;
pub mod database;
pub mod error;
pub mod notify;
pub mod placement;
pub mod reconcile;
pub mod shutdown;
pub mod stats;
#[cfg(test)]
mod testing;
mod tracker;
mod transfer;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use axum::extract::Extension;
use axum::http::Uri;
use axum::Router;
use sea_orm::{Database, DatabaseConnection};
use tokio::sync::OnceCell;
use tokio::time;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use config::{Config, NodeConfig};
use database::migration::{Migrator, MigratorTrait};
use error::{ServerError, ServerResult};
use notify::DeleteNotifier;
use placement::PlacementCache;
use shutdown::Shutdown;

type State = Arc<StateInner>;

/// How long background loops get to wind down after the listener stops.
const WINDDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Global server state.
pub struct StateInner {
    /// The server configuration.
    config: Config,

    /// Handle to the database.
    database: OnceCell<DatabaseConnection>,

    /// The placement cache.
    placement: Arc<PlacementCache>,

    /// Delete notification fan-out.
    notifier: Arc<dyn DeleteNotifier>,

    /// Shared HTTP client for drain transfers.
    http_client: OnceCell<reqwest::Client>,
}

impl StateInner {
    async fn new(config: Config) -> State {
        let notifier: Arc<dyn DeleteNotifier> = Arc::new(notify::from_config(&config));

        Arc::new(Self {
            config,
            database: OnceCell::new(),
            placement: PlacementCache::new(),
            notifier,
            http_client: OnceCell::new(),
        })
    }

    /// Returns a handle to the database.
    async fn database(&self) -> ServerResult<&DatabaseConnection> {
        self.database
            .get_or_try_init(|| async {
                Database::connect(&self.config.database.url)
                    .await
                    .map_err(ServerError::database_error)
            })
            .await
    }

    fn placement(&self) -> &Arc<PlacementCache> {
        &self.placement
    }

    fn notifier(&self) -> &Arc<dyn DeleteNotifier> {
        &self.notifier
    }

    /// Storage node settings; an error on tracker-only processes.
    fn node_config(&self) -> ServerResult<&NodeConfig> {
        self.config
            .node
            .as_ref()
            .ok_or(ServerError::InternalServerError)
    }

    /// Returns the shared HTTP client.
    async fn http_client(&self) -> ServerResult<&reqwest::Client> {
        self.http_client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .build()
                    .map_err(ServerError::request_error)
            })
            .await
    }
}

/// The fallback route.
#[axum_macros::debug_handler]
async fn fallback(_: Uri) -> ServerResult<()> {
    Err(ServerError::NotFound)
}

/// Runs the tracker: the metadata API plus its background loops.
pub async fn run_tracker(
    cli_listen: Option<SocketAddr>,
    config: Config,
    shutdown: Shutdown,
) -> Result<()> {
    let state = StateInner::new(config).await;

    let listen = cli_listen.unwrap_or(state.config.listen);

    let rest = Router::new()
        .merge(tracker::get_router())
        .fallback(fallback)
        .layer(Extension(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    // Warm the placement cache before accepting traffic; failures are
    // retried by the refresh loop.
    if let Ok(db) = state.database().await {
        let _ = state.placement().refresh(db).await;
    }

    let background = vec![
        tokio::spawn(placement::run_placement_refresh(
            state.clone(),
            shutdown.clone(),
        )),
        tokio::spawn(reconcile::tempfile_purge::run_tempfile_purge(
            state.clone(),
            shutdown.clone(),
        )),
    ];

    tracing::info!("Tracker listening on {}", listen);
    serve(rest, listen, &state.config, &shutdown).await?;
    join_background(background).await;

    Ok(())
}

/// Runs the storage node: the chunk transfer API plus its loops.
pub async fn run_storage_node(config: Config, shutdown: Shutdown) -> Result<()> {
    let state = StateInner::new(config).await;

    let Some(node) = &state.config.node else {
        bail!("storage-node mode requires a [node] section in the configuration");
    };
    let listen = node.listen;

    let rest = Router::new()
        .merge(transfer::get_router())
        .fallback(fallback)
        .layer(Extension(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    if let Ok(db) = state.database().await {
        let _ = state.placement().refresh(db).await;
    }

    let background = vec![
        tokio::spawn(placement::run_placement_refresh(
            state.clone(),
            shutdown.clone(),
        )),
        tokio::spawn(stats::run_device_stats(state.clone(), shutdown.clone())),
        tokio::spawn(reconcile::run_node_loops(state.clone(), shutdown.clone())),
    ];

    tracing::info!("Storage node listening on {}", listen);
    serve(rest, listen, &state.config, &shutdown).await?;
    join_background(background).await;

    Ok(())
}

/// Runs database migrations.
pub async fn run_migrations(config: Config) -> Result<()> {
    eprintln!("Running migrations...");

    let state = StateInner::new(config).await;
    let db = state.database().await?;
    Migrator::up(db, None).await?;

    Ok(())
}

/// Runs every reconciliation pass once, then returns.
pub async fn run_reconciliation_once(config: Config) -> Result<()> {
    let state = StateInner::new(config).await;

    let db = state.database().await?;
    state.placement().refresh(db).await?;

    reconcile::run_once(&state).await
}

/// Serves a router until shutdown, bounded by the grace timeout.
async fn serve(
    rest: Router,
    listen: SocketAddr,
    config: &Config,
    shutdown: &Shutdown,
) -> Result<()> {
    let server = axum::Server::bind(&listen)
        .serve(rest.into_make_service())
        .with_graceful_shutdown(shutdown.cancelled());

    tokio::select! {
        ret = server => ret?,
        _ = async {
            shutdown.cancelled().await;
            time::sleep(config.shutdown_timeout).await;
        } => {
            tracing::warn!("Shutdown grace period expired; dropping in-flight requests");
        }
    }

    Ok(())
}

/// Waits for background loops to wind down.
///
/// Loops exit on the shutdown signal before shared resources close;
/// anything still running after the window dies with the process.
async fn join_background(tasks: Vec<tokio::task::JoinHandle<()>>) {
    if time::timeout(WINDDOWN_TIMEOUT, futures::future::join_all(tasks))
        .await
        .is_err()
    {
        tracing::warn!("Background loops did not exit in time");
    }
}
