//! Image upload endpoint
//!
//! Assigns a fresh request identifier and writes the decoded image into the
//! request store. A malformed upload is recorded as an error-state request
//! rather than a synchronous HTTP error, so clients observe every upload
//! through the same polling contract.

use axum::extract::State;
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

const PNG_PREFIX: &str = "data:image/png;base64,";
const JPEG_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Data URI: `data:image/(png|jpeg);base64,<data>`
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub request_id: String,
}

/// POST /upload_image
pub async fn upload_image(
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> Json<UploadResponse> {
    let request_id = Uuid::new_v4().simple().to_string();

    match decode_data_uri(&body.image) {
        Ok(bytes) => match state.store.write_upload(&request_id, &bytes) {
            Ok(()) => info!(request_id = %request_id, bytes = bytes.len(), "image uploaded"),
            Err(e) => {
                error!(request_id = %request_id, error = %e, "failed to store upload");
                mark_error(&state, &request_id);
            }
        },
        Err(reason) => {
            warn!(request_id = %request_id, reason = %reason, "rejected upload encoding");
            mark_error(&state, &request_id);
        }
    }

    Json(UploadResponse { request_id })
}

fn mark_error(state: &AppState, request_id: &str) {
    if let Err(e) = state.store.write_error_marker(request_id) {
        error!(request_id = %request_id, error = %e, "failed to write error marker");
    }
}

/// Strip the data URI prefix and decode. Only PNG and JPEG prefixes are
/// accepted.
fn decode_data_uri(encoded: &str) -> Result<Vec<u8>, String> {
    let payload = if let Some(rest) = encoded.strip_prefix(PNG_PREFIX) {
        rest
    } else if let Some(rest) = encoded.strip_prefix(JPEG_PREFIX) {
        rest
    } else {
        return Err("unsupported data URI prefix".to_string());
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("base64 decode failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_and_jpeg_prefixes_decode() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"bytes");
        assert_eq!(
            decode_data_uri(&format!("{PNG_PREFIX}{payload}")).unwrap(),
            b"bytes"
        );
        assert_eq!(
            decode_data_uri(&format!("{JPEG_PREFIX}{payload}")).unwrap(),
            b"bytes"
        );
    }

    #[test]
    fn other_prefixes_are_rejected() {
        assert!(decode_data_uri("data:image/gif;base64,AAAA").is_err());
        assert!(decode_data_uri("AAAA").is_err());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(decode_data_uri(&format!("{PNG_PREFIX}!!not-base64!!")).is_err());
    }
}
