//! Music notation export
//!
//! Hands finished descriptors containing music-notation regions to the
//! external notation-rendering collaborator and persists the returned MIDI
//! under the music root. Persistence here is independent of the request's
//! `done` state; failures are reported to the caller, who logs them.

use reqwest::Client;
use scanpipe_common::config::MusicConfig;
use scanpipe_common::layout::{PageDescriptor, RegionCategory};
use scanpipe_common::RequestStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use base64::Engine as _;

#[derive(Debug, Error)]
pub enum MusicError {
    #[error("music export request failed: {0}")]
    Network(String),

    #[error("music endpoint returned error: {0}")]
    Api(String),

    #[error("cannot parse music response: {0}")]
    Parse(String),

    #[error("cannot persist MIDI: {0}")]
    Store(#[from] scanpipe_common::Error),
}

/// Music-notation exporter collaborator client
pub struct MusicExporter {
    http_client: Client,
    url: String,
    store: RequestStore,
}

impl MusicExporter {
    pub fn new(config: &MusicConfig, url: String, store: RequestStore) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("Failed to create HTTP client"),
            url,
            store,
        }
    }

    /// Render the page's music notation and persist `{id}.mid` plus one
    /// `{id}_{lineId}.mid` per rendered line. Pages without music regions
    /// are skipped without a collaborator call.
    pub async fn export_page(&self, descriptor: &PageDescriptor) -> Result<(), MusicError> {
        let lines: Vec<NotationLine> = descriptor
            .regions
            .iter()
            .filter(|region| region.category == RegionCategory::Music)
            .flat_map(|region| {
                region.lines.iter().map(|line| NotationLine {
                    id: line.id.clone(),
                    transcription: line.transcription.clone(),
                })
            })
            .collect();

        if lines.is_empty() {
            debug!(request_id = %descriptor.id, "no music notation on page");
            return Ok(());
        }

        let response = self
            .http_client
            .post(&self.url)
            .json(&ExportRequest {
                id: &descriptor.id,
                lines,
            })
            .send()
            .await
            .map_err(|e| MusicError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MusicError::Api(format!("{status}: {body}")));
        }

        let payload: ExportResponse = response
            .json()
            .await
            .map_err(|e| MusicError::Parse(e.to_string()))?;

        if let Some(encoded) = payload.page {
            let midi = decode_midi(&encoded)?;
            self.store.write_midi(&descriptor.id, None, &midi)?;
        }

        for line in payload.lines {
            let midi = decode_midi(&line.midi)?;
            self.store
                .write_midi(&descriptor.id, Some(&line.id), &midi)?;
        }

        debug!(request_id = %descriptor.id, "music export persisted");
        Ok(())
    }
}

fn decode_midi(encoded: &str) -> Result<Vec<u8>, MusicError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| MusicError::Parse(format!("bad MIDI encoding: {e}")))
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    id: &'a str,
    lines: Vec<NotationLine>,
}

#[derive(Debug, Serialize)]
struct NotationLine {
    id: String,
    transcription: String,
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    /// Base64 MIDI for the whole page
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    lines: Vec<LineMidi>,
}

#[derive(Debug, Deserialize)]
struct LineMidi {
    id: String,
    /// Base64 MIDI
    midi: String,
}
