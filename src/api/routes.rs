use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::tts::TtsService;

pub struct AppState {
    pub tts: TtsService,
    pub max_text_chars: usize,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/synthesize", post(handlers::synthesize))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
