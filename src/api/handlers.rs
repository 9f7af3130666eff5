use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{HealthResponse, SynthesizeRequest};
use crate::api::routes::AppState;
use crate::error::AppError;

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let text = extract_text(&body)?;

    let len = text.chars().count();
    if len > state.max_text_chars {
        return Err(AppError::TextTooLong {
            len,
            max: state.max_text_chars,
        });
    }

    // Inference is CPU-bound; keep it off the async workers.
    let worker_state = Arc::clone(&state);
    let wav = tokio::task::spawn_blocking(move || worker_state.tts.synthesize(&text))
        .await
        .map_err(|e| AppError::TtsError(format!("Synthesis task failed: {}", e)))??;

    tracing::debug!(chars = len, bytes = wav.len(), "Synthesized");

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/wav")], wav).into_response())
}

/// Pulls a non-empty `text` string out of the request body. Anything else,
/// including a body that is not a JSON object, counts as missing text.
fn extract_text(body: &[u8]) -> Result<String, AppError> {
    match serde_json::from_slice::<SynthesizeRequest>(body) {
        Ok(SynthesizeRequest { text: Some(text) }) if !text.is_empty() => Ok(text),
        Ok(_) => Err(AppError::MissingText),
        Err(e) => {
            tracing::debug!("Unreadable synthesize body: {}", e);
            Err(AppError::MissingText)
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
