//! Common error type and result alias.
//!
//! `AppError` doubles as the HTTP error body for the axum handlers: every
//! variant maps to a status code and renders as `{"error": "..."}`.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::prompt::extractor::ExtractError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud API request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Unexpected cloud API response: {0}")]
    MalformedUpstream(String),

    #[error(transparent)]
    Prompt(#[from] ExtractError),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Timed out: {0}")]
    Timeout(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Prompt(ExtractError::NoPrompt) => StatusCode::BAD_REQUEST,
            AppError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            AppError::ImageNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
