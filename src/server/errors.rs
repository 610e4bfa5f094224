use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

/// Message returned whenever internal detail must not leak to the client.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";

/// Message for chat attempts while no index is active.
pub const NO_ACTIVE_INDEX_MESSAGE: &str =
    "No active index. Switch to an index before chatting.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{NO_ACTIVE_INDEX_MESSAGE}")]
    NoActiveIndex,
    /// Internal detail is logged, never serialized to the client.
    #[error("{INTERNAL_ERROR_MESSAGE}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NoActiveIndex => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    #[inline]
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(name) => Self::NotFound(format!("Index '{name}' not found")),
            StoreError::InvalidRequest(msg) => Self::Validation(msg),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("Internal server error: {detail:#}");
        } else {
            warn!("Request rejected: {self}");
        }

        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
