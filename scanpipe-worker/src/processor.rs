//! Per-request processing pipeline
//!
//! Runs one request from upload to terminal state: load, optional A4
//! padding, layout analysis, caption enrichment, persistence, music export.
//! Persistence is all-or-nothing: the logits blob is written first and the
//! result document last via atomic rename, and any failure before that
//! rename removes the partial logits and writes the single error marker, so
//! a request can never carry two terminal states.

use crate::captions::CaptionPool;
use crate::engine::LayoutEngine;
use crate::loader::ImageLoader;
use crate::music::MusicExporter;
use image::{imageops, Rgb, RgbImage};
use scanpipe_common::layout::PageDescriptor;
use scanpipe_common::{pagexml, Error, RequestStore, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A4 reference dimensions used for aspect-ratio padding
const A4_WIDTH: f32 = 2100.0;
const A4_HEIGHT: f32 = 2970.0;

pub struct Processor {
    store: RequestStore,
    loader: ImageLoader,
    engine: Arc<dyn LayoutEngine>,
    captions: Option<CaptionPool>,
    music: Option<MusicExporter>,
    pad_to_a4: bool,
}

impl Processor {
    pub fn new(
        store: RequestStore,
        loader: ImageLoader,
        engine: Arc<dyn LayoutEngine>,
        captions: Option<CaptionPool>,
        music: Option<MusicExporter>,
        pad_to_a4: bool,
    ) -> Self {
        Self {
            store,
            loader,
            engine,
            captions,
            music,
            pad_to_a4,
        }
    }

    /// Process one request to its terminal state. Never returns an error:
    /// every failure mode collapses to the error marker.
    pub async fn process(&self, request_id: &str) {
        info!(request_id = %request_id, "processing started");

        let image_path = self.store.image_path(request_id);
        let image = match self.loader.load(&image_path).await {
            Ok(image) => image,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "cannot load image, saving error marker");
                self.mark_error(request_id);
                return;
            }
        };

        match self.run_pipeline(request_id, image).await {
            Ok(descriptor) => {
                info!(request_id = %request_id, regions = descriptor.regions.len(), "processing finished");

                // Music export is independent of the `done` state; the
                // result document already exists, so a failure here must
                // not produce a second terminal marker.
                if let Some(exporter) = &self.music {
                    if let Err(e) = exporter.export_page(&descriptor).await {
                        warn!(request_id = %request_id, error = %e, "music export failed");
                    }
                }
            }
            Err(e) => {
                error!(request_id = %request_id, error = %e, "processing failed, saving error marker");
                self.store.remove_logits(request_id);
                self.mark_error(request_id);
            }
        }
    }

    async fn run_pipeline(&self, request_id: &str, image: RgbImage) -> Result<PageDescriptor> {
        // The descriptor is seeded with the original dimensions even when
        // the engine sees the padded canvas.
        let seed = PageDescriptor::new(request_id, image.width(), image.height());

        let image = if self.pad_to_a4 {
            pad_to_a4(&image)
        } else {
            image
        };

        let (mut descriptor, logits) = self
            .engine
            .process(&image, seed)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        if let Some(pool) = &self.captions {
            pool.enrich(&image, &mut descriptor).await;
        }

        self.store.write_logits(request_id, &logits.to_json()?)?;
        self.store
            .write_result_atomic(request_id, &pagexml::to_xml(&descriptor)?)?;

        Ok(descriptor)
    }

    fn mark_error(&self, request_id: &str) {
        if let Err(e) = self.store.write_error_marker(request_id) {
            error!(request_id = %request_id, error = %e, "failed to write error marker");
        }
    }
}

/// Place the image top-left on a white canvas extended to A4 aspect ratio,
/// preserving the original content at full resolution.
pub fn pad_to_a4(image: &RgbImage) -> RgbImage {
    let a4_ratio = A4_WIDTH / A4_HEIGHT;

    let (width, height) = image.dimensions();
    let image_ratio = width as f32 / height as f32;

    let (target_width, target_height) = if image_ratio > a4_ratio {
        (width, (width as f32 / a4_ratio).round() as u32)
    } else {
        ((height as f32 * a4_ratio).round() as u32, height)
    };

    let mut canvas = RgbImage::from_pixel(target_width, target_height, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, image, 0, 0);
    canvas
}
