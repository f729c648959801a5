pub mod config;
pub mod handlers;
pub mod models;
pub mod ocr_bridge;
pub mod parser;
pub mod preprocess;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// Re-export main types
pub use config::Config;
pub use models::*;
pub use ocr_bridge::{TesseractCli, TextRecognizer, NUMERIC_ALPHABET};

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub recognizer: Arc<dyn TextRecognizer>,
}

impl AppState {
    pub fn new(config: Config, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            config: Arc::new(config),
            recognizer,
        }
    }
}

/// Build the application routes.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit;

    Router::new()
        .route("/", get(handlers::root))
        .route("/process-image", post(handlers::process_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
