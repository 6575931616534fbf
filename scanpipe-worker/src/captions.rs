//! Caption enrichment pool
//!
//! Crops caption-eligible regions out of the page image and dispatches them
//! to the external captioning collaborator, bounded to a fixed number of
//! concurrent calls per page. Best-effort: a failure yields an empty caption
//! for that region and never aborts the page.

use crate::jpeg::encode_jpeg;
use async_trait::async_trait;
use base64::Engine as _;
use futures::stream::{self, StreamExt};
use image::imageops::{self, FilterType};
use image::RgbImage;
use reqwest::Client;
use scanpipe_common::config::CaptionsConfig;
use scanpipe_common::layout::{BoundingBox, PageDescriptor, Point};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const CAPTION_PROMPT: &str = "Give me one short sentence describing the image.";

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("caption request failed: {0}")]
    Network(String),

    #[error("caption endpoint returned error: {0}")]
    Api(String),

    #[error("cannot parse caption response: {0}")]
    Parse(String),
}

/// Captioning collaborator boundary: a JPEG in, a short text out.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, jpeg: Vec<u8>) -> Result<String, CaptionError>;
}

/// OpenAI-compatible chat-completions captioning client
pub struct OpenAiCaptioner {
    http_client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCaptioner {
    pub fn new(config: &CaptionsConfig, api_key: String) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl Captioner for OpenAiCaptioner {
    async fn caption(&self, jpeg: Vec<u8>) -> Result<String, CaptionError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);

        let payload = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ChatContent::Text {
                        text: CAPTION_PROMPT,
                    },
                    ChatContent::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{encoded}"),
                        },
                    },
                ],
            }],
            max_tokens: 300,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CaptionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CaptionError::Api(format!("{status}: {body}")));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::Parse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CaptionError::Parse("response has no choices".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ChatContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContent<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Bounded-concurrency enrichment over one page's eligible regions
pub struct CaptionPool {
    captioner: Arc<dyn Captioner>,
    max_image_size: u32,
    workers: usize,
}

impl CaptionPool {
    pub fn new(captioner: Arc<dyn Captioner>, config: &CaptionsConfig) -> Self {
        Self {
            captioner,
            max_image_size: config.max_image_size,
            workers: config.workers.max(1),
        }
    }

    /// Caption every eligible region and assign the results back to the
    /// regions' transcription fields, preserving input order. Never fails.
    pub async fn enrich(&self, page_image: &RgbImage, descriptor: &mut PageDescriptor) {
        let mut targets: Vec<(usize, RgbImage)> = Vec::new();

        for (index, region) in descriptor.regions.iter().enumerate() {
            if !region.category.caption_eligible() {
                continue;
            }
            match crop_region(page_image, &region.polygon, self.max_image_size) {
                Some(crop) => targets.push((index, crop)),
                None => warn!(
                    region_id = %region.id,
                    category = region.category.as_str(),
                    "empty caption crop, skipping region"
                ),
            }
        }

        if targets.is_empty() {
            return;
        }
        debug!(regions = targets.len(), "dispatching caption requests");

        let results: Vec<(usize, String)> = stream::iter(targets.into_iter().map(
            |(index, crop)| {
                let captioner = Arc::clone(&self.captioner);
                async move { (index, caption_one(captioner, crop).await) }
            },
        ))
        .buffer_unordered(self.workers)
        .collect()
        .await;

        for (index, caption) in results {
            descriptor.regions[index].transcription = Some(caption);
        }
    }
}

async fn caption_one(captioner: Arc<dyn Captioner>, crop: RgbImage) -> String {
    let jpeg = match encode_jpeg(&crop, 90) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "cannot encode caption crop");
            return String::new();
        }
    };

    match captioner.caption(jpeg).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "caption request failed");
            String::new()
        }
    }
}

/// Crop the axis-aligned bounding box of `polygon` out of the page image,
/// downscaling so the larger dimension does not exceed `max_size`. Returns
/// None for crops with zero area.
fn crop_region(page_image: &RgbImage, polygon: &[Point], max_size: u32) -> Option<RgbImage> {
    let bbox = BoundingBox::of(polygon)?;
    let (page_width, page_height) = page_image.dimensions();

    let x1 = (bbox.x1.round().max(0.0) as u32).min(page_width);
    let y1 = (bbox.y1.round().max(0.0) as u32).min(page_height);
    let x2 = (bbox.x2.round().max(0.0) as u32).min(page_width);
    let y2 = (bbox.y2.round().max(0.0) as u32).min(page_height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let (width, height) = (x2 - x1, y2 - y1);
    let crop = imageops::crop_imm(page_image, x1, y1, width, height).to_image();

    if width <= max_size && height <= max_size {
        return Some(crop);
    }

    let (new_width, new_height) = if width > height {
        (
            max_size,
            ((max_size as f32 * height as f32 / width as f32).round() as u32).max(1),
        )
    } else {
        (
            ((max_size as f32 * width as f32 / height as f32).round() as u32).max(1),
            max_size,
        )
    };

    Some(imageops::resize(&crop, new_width, new_height, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<Point> {
        vec![
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ]
    }

    fn page() -> RgbImage {
        RgbImage::from_pixel(1000, 800, Rgb([128, 128, 128]))
    }

    #[test]
    fn crops_to_the_bounding_box() {
        let crop = crop_region(&page(), &rect(100.0, 50.0, 400.0, 250.0), 512).unwrap();
        assert_eq!(crop.dimensions(), (300, 200));
    }

    #[test]
    fn zero_area_crop_is_skipped() {
        assert!(crop_region(&page(), &rect(100.0, 50.0, 100.0, 250.0), 512).is_none());
        assert!(crop_region(&page(), &[], 512).is_none());
    }

    #[test]
    fn crop_outside_the_page_is_skipped() {
        assert!(crop_region(&page(), &rect(2000.0, 50.0, 2300.0, 250.0), 512).is_none());
    }

    #[test]
    fn oversized_crop_is_downscaled_preserving_aspect_ratio() {
        let crop = crop_region(&page(), &rect(0.0, 0.0, 1000.0, 500.0), 512).unwrap();
        assert_eq!(crop.dimensions(), (512, 256));

        let crop = crop_region(&page(), &rect(0.0, 0.0, 400.0, 800.0), 512).unwrap();
        assert_eq!(crop.dimensions(), (256, 512));
    }

    #[test]
    fn small_crop_keeps_its_resolution() {
        let crop = crop_region(&page(), &rect(0.0, 0.0, 100.0, 80.0), 512).unwrap();
        assert_eq!(crop.dimensions(), (100, 80));
    }
}
