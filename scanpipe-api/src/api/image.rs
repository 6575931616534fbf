//! Raw image retrieval endpoint

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use crate::{ApiError, ApiResult, AppState};

/// GET /get_image/:request_id
///
/// Returns the originally uploaded bytes.
pub async fn get_image(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .store
        .read_upload(&request_id)
        .map_err(|_| ApiError::NotFound(format!("no image for request {request_id}")))?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}
