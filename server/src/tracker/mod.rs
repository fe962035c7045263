//! The tracker HTTP API.
//!
//! Requests are form-encoded (query parameters are accepted too);
//! responses are JSON.

mod create_close;
mod create_open;
mod delete;
mod get_paths;
mod list;

use anyhow::anyhow;
use axum::routing::{get, post};
use axum::Router;

use crate::error::{ServerError, ServerResult};

async fn ping() -> &'static str {
    "pong"
}

pub(crate) fn get_router() -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/get-paths", get(get_paths::get_paths))
        .route("/create-open", post(create_open::create_open))
        .route("/create-close", post(create_close::create_close))
        .route("/delete", post(delete::delete))
        .route("/get-devices", get(list::get_devices))
        .route("/get-hosts", get(list::get_hosts))
}

/// Unwraps a required request parameter.
fn require<T>(value: Option<T>, name: &'static str) -> ServerResult<T> {
    value.ok_or_else(|| ServerError::RequestError(anyhow!("missing parameter {}", name)))
}
