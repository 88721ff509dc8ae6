//! JSON error responses for the HTTP API.
//!
//! Every failure leaves the API as `{ "kind": ..., "message": ... }` with a
//! matching status code. Storage details are logged and never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorKind, IngestError, StoreError};
use crate::worker::QueueClosed;

// ---

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Unavailable(#[from] QueueClosed),

    #[error("CSV export failed: {0}")]
    Export(#[from] csv::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(e) => kind_status(e.kind()),
            Self::Ingest(e) => kind_status(e.kind()),
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => ErrorKind::NotFound.as_str(),
            Self::Store(e) => e.kind().as_str(),
            Self::Ingest(e) => e.kind().as_str(),
            Self::Unavailable(_) => "unavailable",
            Self::Export(_) => "export_error",
        }
    }

    fn public_message(&self) -> String {
        let kind = match self {
            Self::Store(e) => e.kind(),
            Self::Ingest(e) => e.kind(),
            _ => return self.to_string(),
        };
        if kind == ErrorKind::StorageError {
            "Internal storage error".to_string()
        } else {
            self.to_string()
        }
    }
}

fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            kind: self.kind(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(StoreError::not_found("test group", "Test #3")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::LabelConflict("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(IngestError::TimestampFormat("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(QueueClosed).status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_storage_details_are_hidden() {
        let err = ApiError::from(StoreError::LabelConflict("secret-id".into()));
        assert_eq!(err.kind(), "storage_error");
        assert_eq!(err.public_message(), "Internal storage error");

        let err = ApiError::from(StoreError::not_found("test group", "Test #3"));
        assert_eq!(err.public_message(), "test group not found: Test #3");
    }
}
