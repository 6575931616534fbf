//! Status polling endpoint
//!
//! The response is a bare status code derived from request store file
//! presence; the body is always empty.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use scanpipe_common::RequestState;

use crate::AppState;

/// GET /get_status/:request_id
///
/// 404 unknown / 202 pending / 500 error / 200 done.
pub async fn get_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> StatusCode {
    match state.store.state(&request_id) {
        RequestState::Done => StatusCode::OK,
        RequestState::Error => StatusCode::INTERNAL_SERVER_ERROR,
        RequestState::Pending => StatusCode::ACCEPTED,
        RequestState::Unknown => StatusCode::NOT_FOUND,
    }
}
