//! JSON error responses for the HTTP edge.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::domains::results::ValidationError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("{message}")]
    Unavailable {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn session_not_found() -> Self {
        ApiError::NotFound("Session not found.".to_string())
    }

    /// A store failure, reported as retryable.
    pub fn store(message: &str, source: anyhow::Error) -> Self {
        ApiError::Unavailable {
            message: message.to_string(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Unavailable { message, source } = &self {
            error!(error = %source, "{}", message);
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
