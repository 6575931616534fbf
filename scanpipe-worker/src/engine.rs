//! Layout engine adapter
//!
//! Wraps the external layout-analysis/OCR engine behind a trait: given an
//! image and an empty descriptor seeded with the page dimensions, return the
//! populated descriptor plus the per-line logits. The production adapter
//! talks to the engine process over HTTP; tests substitute in-process
//! implementations.

use crate::jpeg::encode_jpeg;
use async_trait::async_trait;
use base64::Engine as _;
use image::RgbImage;
use reqwest::Client;
use scanpipe_common::config::EngineConfig;
use scanpipe_common::layout::{PageDescriptor, Point, Region, RegionCategory, TextLine};
use scanpipe_common::logits::{LineLogits, LogitsDoc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Network(String),

    #[error("engine returned error: {0}")]
    Api(String),

    #[error("cannot parse engine response: {0}")]
    Parse(String),

    #[error("cannot encode page image: {0}")]
    Image(String),
}

/// Layout engine boundary
#[async_trait]
pub trait LayoutEngine: Send + Sync {
    /// Populate the seeded descriptor from the page image.
    async fn process(
        &self,
        image: &RgbImage,
        seed: PageDescriptor,
    ) -> Result<(PageDescriptor, LogitsDoc), EngineError>;
}

/// HTTP-backed layout engine adapter
pub struct HttpLayoutEngine {
    http_client: Client,
    url: String,
}

impl HttpLayoutEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("Failed to create HTTP client"),
            url: config.url.clone(),
        }
    }
}

#[async_trait]
impl LayoutEngine for HttpLayoutEngine {
    async fn process(
        &self,
        image: &RgbImage,
        seed: PageDescriptor,
    ) -> Result<(PageDescriptor, LogitsDoc), EngineError> {
        let jpeg = encode_jpeg(image, 95).map_err(|e| EngineError::Image(e.to_string()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);

        debug!(
            request_id = %seed.id,
            width = seed.width,
            height = seed.height,
            "sending page to layout engine"
        );

        let response = self
            .http_client
            .post(&self.url)
            .json(&ProcessRequest {
                id: &seed.id,
                width: seed.width,
                height: seed.height,
                image: encoded,
            })
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Api(format!("{status}: {body}")));
        }

        let payload: ProcessResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        Ok(response_to_descriptor(seed, payload))
    }
}

#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    id: &'a str,
    width: u32,
    height: u32,
    /// Base64 JPEG
    image: String,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    /// Model character inventory; position = class index
    #[serde(default)]
    characters: Vec<char>,
    #[serde(default)]
    regions: Vec<RegionPayload>,
}

#[derive(Debug, Deserialize)]
struct RegionPayload {
    id: String,
    category: RegionCategory,
    polygon: Vec<[f32; 2]>,
    #[serde(default)]
    transcription: Option<String>,
    #[serde(default)]
    lines: Vec<LinePayload>,
}

#[derive(Debug, Deserialize)]
struct LinePayload {
    id: String,
    polygon: Vec<[f32; 2]>,
    #[serde(default)]
    transcription: String,
    heights: [f32; 2],
    /// Frame-by-class logit matrix, last class blank
    #[serde(default)]
    logits: Vec<Vec<f32>>,
}

fn response_to_descriptor(
    mut seed: PageDescriptor,
    payload: ProcessResponse,
) -> (PageDescriptor, LogitsDoc) {
    let mut logits = LogitsDoc {
        characters: payload.characters,
        lines: Default::default(),
    };

    for region in payload.regions {
        let lines = region
            .lines
            .into_iter()
            .map(|line| {
                if !line.logits.is_empty() {
                    logits
                        .lines
                        .insert(line.id.clone(), LineLogits { frames: line.logits });
                }
                TextLine {
                    id: line.id,
                    polygon: to_points(&line.polygon),
                    transcription: line.transcription,
                    heights: line.heights,
                }
            })
            .collect();

        seed.regions.push(Region {
            id: region.id,
            category: region.category,
            polygon: to_points(&region.polygon),
            transcription: region.transcription,
            lines,
        });
    }

    (seed, logits)
}

fn to_points(pairs: &[[f32; 2]]) -> Vec<Point> {
    pairs.iter().map(|&[x, y]| Point::new(x, y)).collect()
}
