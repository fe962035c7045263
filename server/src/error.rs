//! Error handling.

use std::error::Error as StdError;

use anyhow::Error as AnyError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use displaydoc::Display;

use depot::error::DepotError;
use depot::transfer::OFFSET_HEADER;

pub type ServerResult<T> = Result<T, ServerError>;

/// An error.
#[derive(Debug, Display)]
pub enum ServerError {
    // Generic responses
    /// The URL you requested was not found.
    NotFound,

    /// The server encountered an internal error or misconfiguration.
    InternalServerError,

    // Specialized responses
    /// The requested object does not exist.
    NoSuchObject,

    /// No reservation exists for this fid.
    NoSuchReservation,

    /// No upload is in progress for this path.
    NoUploadInProgress,

    /// Claimed offset {claimed} does not match the current offset {current}.
    OffsetConflict { claimed: u64, current: u64 },

    /// No device satisfies the placement constraints.
    NoDeviceFound,

    /// Database error: {0}
    DatabaseError(AnyError),

    /// Storage error: {0}
    StorageError(AnyError),

    /// General request error: {0}
    RequestError(AnyError),

    /// Error from the common components.
    DepotError(DepotError),
}

impl ServerError {
    pub fn database_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::DatabaseError(AnyError::new(error))
    }

    pub fn storage_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::StorageError(AnyError::new(error))
    }

    pub fn request_error(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::RequestError(AnyError::new(error))
    }

    /// Returns a version of this error for clients.
    fn into_clients(self) -> Self {
        match self {
            Self::DatabaseError(_) => Self::InternalServerError,
            Self::StorageError(_) => Self::InternalServerError,

            _ => self,
        }
    }

    fn http_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NoSuchObject => StatusCode::NOT_FOUND,
            Self::NoSuchReservation => StatusCode::NOT_FOUND,
            Self::NoUploadInProgress => StatusCode::NOT_FOUND,
            Self::NoDeviceFound => StatusCode::NOT_FOUND,

            Self::OffsetConflict { .. } => StatusCode::PRECONDITION_FAILED,

            Self::RequestError(_) => StatusCode::BAD_REQUEST,
            Self::DepotError(_) => StatusCode::BAD_REQUEST,

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl StdError for ServerError {}

impl From<DepotError> for ServerError {
    fn from(error: DepotError) -> Self {
        Self::DepotError(error)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if matches!(self, Self::DatabaseError(_) | Self::StorageError(_)) {
            tracing::error!("{:?}", self);
        }

        // The true offset rides along on conflicts so senders can reseek.
        if let Self::OffsetConflict { current, .. } = &self {
            let current = current.to_string();
            let body = self.to_string();
            return (
                StatusCode::PRECONDITION_FAILED,
                [(OFFSET_HEADER, current)],
                body,
            )
                .into_response();
        }

        let sanitized = self.into_clients();
        (sanitized.http_status_code(), sanitized.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_conflict_reports_the_true_offset() {
        let response = ServerError::OffsetConflict {
            claimed: 3,
            current: 6,
        }
        .into_response();

        assert_eq!(StatusCode::PRECONDITION_FAILED, response.status());
        assert_eq!(
            "6",
            response.headers().get(OFFSET_HEADER).unwrap().to_str().unwrap()
        );
    }

    #[test]
    fn test_internal_detail_is_sanitized() {
        let response =
            ServerError::DatabaseError(anyhow::anyhow!("connection refused")).into_response();

        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status());
    }
}
