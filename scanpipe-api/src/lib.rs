//! scanpipe-api library - ingestion and serving process
//!
//! Accepts page image uploads, answers status polls from request store file
//! presence, and serves structured results and auxiliary artifacts. All
//! operations are non-blocking filesystem reads or single writes; processing
//! happens in the separate scanpipe-worker process.

use axum::Router;
use scanpipe_common::RequestStore;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod records;

pub use crate::error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Request store (the only mutable state, and it lives on disk)
    pub store: RequestStore,
}

impl AppState {
    pub fn new(store: RequestStore) -> Self {
        Self { store }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/upload_image", post(api::upload_image))
        .route("/get_status/:request_id", get(api::get_status))
        .route("/get_image/:request_id", get(api::get_image))
        .route("/get_lines/:request_id", get(api::get_lines))
        .route("/get_music/:request_id", get(api::get_music_page))
        .route("/get_music/:request_id/:line_id", get(api::get_music_line))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
