//! Structured result retrieval endpoint

use axum::extract::{Path, State};
use axum::Json;
use scanpipe_common::logits::LogitsDoc;
use scanpipe_common::pagexml;
use serde::Serialize;
use tracing::warn;

use crate::records::{self, ResultRecord};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct LinesResponse {
    pub image_id: String,
    pub width: u32,
    pub height: u32,
    pub lines: Vec<ResultRecord>,
}

/// GET /get_lines/:request_id
///
/// Serializes the persisted page descriptor into the client record stream.
/// 404 whenever no result document exists, regardless of pending/error
/// state.
pub async fn get_lines(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<LinesResponse>> {
    let xml = state
        .store
        .read_result(&request_id)
        .map_err(|_| ApiError::NotFound(format!("no result for request {request_id}")))?;

    let descriptor = pagexml::from_xml(&xml)
        .map_err(|e| ApiError::Internal(format!("corrupt result document: {e}")))?;

    // A done request has a logits blob; if it is unreadable the response
    // degrades to uniform confidences instead of failing.
    let logits = match state.store.read_logits(&request_id) {
        Ok(bytes) => match LogitsDoc::from_json(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "corrupt logits document");
                None
            }
        },
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "missing logits document");
            None
        }
    };

    let lines = records::convert_page(&descriptor, logits.as_ref());

    Ok(Json(LinesResponse {
        image_id: descriptor.id,
        width: descriptor.width,
        height: descriptor.height,
        lines,
    }))
}
