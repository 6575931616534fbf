//! Auxiliary music artifact endpoint
//!
//! Absence of an artifact is a normal outcome (204), not an error.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::AppState;

/// GET /get_music/:request_id
pub async fn get_music_page(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    serve_midi(&state, &request_id, None)
}

/// GET /get_music/:request_id/:line_id
pub async fn get_music_line(
    State(state): State<AppState>,
    Path((request_id, line_id)): Path<(String, String)>,
) -> Response {
    serve_midi(&state, &request_id, Some(&line_id))
}

fn serve_midi(state: &AppState, request_id: &str, line_id: Option<&str>) -> Response {
    match state.store.read_midi(request_id, line_id) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/midi")], bytes).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}
