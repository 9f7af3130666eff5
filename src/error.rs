use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("missing text")]
    MissingText,

    #[error("text too long ({len} chars, max {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("Voice model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Failed to load voice model: {0}")]
    ModelLoad(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TTS generation failed: {0}")]
    TtsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::MissingText => "MISSING_TEXT",
            AppError::TextTooLong { .. } => "TEXT_TOO_LONG",
            AppError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            AppError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::TtsError(_) => "TTS_ERROR",
            AppError::IoError(_) => "IO_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Client errors carry a fixed reason; server-side detail stays in the log.
        let (status, message) = match &self {
            AppError::MissingText => (StatusCode::BAD_REQUEST, "missing text"),
            AppError::TextTooLong { .. } => (StatusCode::BAD_REQUEST, "text too long"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "synthesis failed"),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {} - {}", self.code(), self);
        } else {
            tracing::warn!("Rejected request: {} - {}", self.code(), self);
        }

        (
            status,
            Json(ErrorResponse {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}
