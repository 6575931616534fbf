//! End-to-end tests for the processing worker
//!
//! Each test runs against a fresh request store in a temp directory, with
//! in-process mock collaborators standing in for the layout engine and the
//! captioning service.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use scanpipe_common::config::{CaptionsConfig, RequestsConfig};
use scanpipe_common::layout::{PageDescriptor, Point, Region, RegionCategory, TextLine};
use scanpipe_common::logits::{LineLogits, LogitsDoc};
use scanpipe_common::{pagexml, RequestState, RequestStore};
use scanpipe_worker::captions::{CaptionError, CaptionPool, Captioner};
use scanpipe_worker::engine::{EngineError, LayoutEngine};
use scanpipe_worker::loader::ImageLoader;
use scanpipe_worker::processor::Processor;
use scanpipe_worker::watcher::Watcher;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn test_store() -> (tempfile::TempDir, RequestStore) {
    let dir = tempfile::tempdir().unwrap();
    let config = RequestsConfig {
        upload_path: dir.path().join("upload"),
        result_path: dir.path().join("result"),
        logits_path: dir.path().join("logits"),
        error_path: dir.path().join("error"),
        music_path: dir.path().join("music"),
    };
    let store = RequestStore::new(&config);
    store.ensure_dirs().unwrap();
    (dir, store)
}

fn fast_loader() -> ImageLoader {
    ImageLoader::new(3, Duration::from_millis(10))
}

fn upload_page(store: &RequestStore, request_id: &str, width: u32, height: u32) {
    let image = RgbImage::from_pixel(width, height, Rgb([180, 180, 180]));
    let bytes = scanpipe_worker::jpeg::encode_jpeg(&image, 90).unwrap();
    store.write_upload(request_id, &bytes).unwrap();
}

fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<Point> {
    vec![
        Point::new(x1, y1),
        Point::new(x2, y1),
        Point::new(x2, y2),
        Point::new(x1, y2),
    ]
}

/// Engine mock: appends fixed regions to the seed, or fails.
struct MockEngine {
    regions: Vec<Region>,
    logits: LogitsDoc,
    fail: bool,
}

impl MockEngine {
    fn succeeding() -> Self {
        let mut logits = LogitsDoc {
            characters: vec!['a', 'b'],
            lines: BTreeMap::new(),
        };
        let frame = |active: usize| {
            let mut row = vec![0.0f32, 0.0, 0.0];
            row[active] = 8.0;
            row
        };
        logits.lines.insert(
            "l001".to_string(),
            LineLogits {
                frames: vec![frame(0), frame(2), frame(1)],
            },
        );

        Self {
            regions: vec![
                Region {
                    id: "r001".to_string(),
                    category: RegionCategory::Text,
                    polygon: rect(10.0, 10.0, 500.0, 100.0),
                    transcription: None,
                    lines: vec![TextLine {
                        id: "l001".to_string(),
                        polygon: rect(12.0, 14.0, 490.0, 50.0),
                        transcription: "ab".to_string(),
                        heights: [28.0, 9.0],
                    }],
                },
                Region {
                    id: "r002".to_string(),
                    category: RegionCategory::Photo,
                    polygon: rect(50.0, 150.0, 250.0, 300.0),
                    transcription: None,
                    lines: vec![],
                },
            ],
            logits,
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            regions: vec![],
            logits: LogitsDoc::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl LayoutEngine for MockEngine {
    async fn process(
        &self,
        _image: &RgbImage,
        mut seed: PageDescriptor,
    ) -> Result<(PageDescriptor, LogitsDoc), EngineError> {
        if self.fail {
            return Err(EngineError::Api("engine exploded".to_string()));
        }
        seed.regions = self.regions.clone();
        Ok((seed, self.logits.clone()))
    }
}

/// Captioner mock: counts calls, fails for crops narrower than 50 px.
struct MockCaptioner {
    calls: AtomicUsize,
}

impl MockCaptioner {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Captioner for MockCaptioner {
    async fn caption(&self, jpeg: Vec<u8>) -> Result<String, CaptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let crop = image::load_from_memory(&jpeg)
            .map_err(|e| CaptionError::Parse(e.to_string()))?
            .to_rgb8();
        if crop.width() < 50 {
            return Err(CaptionError::Api("captioning refused".to_string()));
        }
        Ok("A short caption.".to_string())
    }
}

fn processor(store: &RequestStore, engine: MockEngine, captions: Option<CaptionPool>) -> Processor {
    Processor::new(
        store.clone(),
        fast_loader(),
        Arc::new(engine),
        captions,
        None,
        false,
    )
}

// =============================================================================
// Terminal states
// =============================================================================

#[tokio::test]
async fn successful_processing_reaches_done_with_both_artifacts() {
    let (_dir, store) = test_store();
    upload_page(&store, "req1", 600, 400);

    processor(&store, MockEngine::succeeding(), None)
        .process("req1")
        .await;

    assert_eq!(store.state("req1"), RequestState::Done);
    assert!(store.read_logits("req1").is_ok());

    // round trip: persisted descriptor matches what the engine produced
    let descriptor = pagexml::from_xml(&store.read_result("req1").unwrap()).unwrap();
    assert_eq!(descriptor.id, "req1");
    assert_eq!(descriptor.width, 600);
    assert_eq!(descriptor.height, 400);
    assert_eq!(descriptor.regions.len(), 2);
    assert_eq!(descriptor.regions[0].lines.len(), 1);

    let logits = LogitsDoc::from_json(&store.read_logits("req1").unwrap()).unwrap();
    assert!(logits.lines.contains_key("l001"));
}

#[tokio::test]
async fn engine_failure_collapses_to_the_error_marker() {
    let (_dir, store) = test_store();
    upload_page(&store, "req1", 600, 400);

    processor(&store, MockEngine::failing(), None)
        .process("req1")
        .await;

    assert_eq!(store.state("req1"), RequestState::Error);
    assert!(store.read_result("req1").is_err(), "no partial result");
    assert!(store.read_logits("req1").is_err(), "no partial logits");
}

#[tokio::test]
async fn unreadable_image_reaches_error_after_bounded_retries() {
    let (_dir, store) = test_store();
    store.write_upload("req1", b"not an image at all").unwrap();

    processor(&store, MockEngine::succeeding(), None)
        .process("req1")
        .await;

    assert_eq!(store.state("req1"), RequestState::Error);
}

// =============================================================================
// Caption enrichment
// =============================================================================

#[tokio::test]
async fn captions_are_assigned_to_eligible_regions() {
    let (_dir, store) = test_store();
    upload_page(&store, "req1", 600, 400);

    let captioner = Arc::new(MockCaptioner::new());
    let pool = CaptionPool::new(captioner.clone(), &CaptionsConfig::default());

    processor(&store, MockEngine::succeeding(), Some(pool))
        .process("req1")
        .await;

    assert_eq!(store.state("req1"), RequestState::Done);
    let descriptor = pagexml::from_xml(&store.read_result("req1").unwrap()).unwrap();

    // text region untouched, photo region captioned
    assert_eq!(descriptor.regions[0].transcription, None);
    assert_eq!(
        descriptor.regions[1].transcription.as_deref(),
        Some("A short caption.")
    );
    assert_eq!(captioner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_area_crops_are_never_dispatched() {
    let captioner = Arc::new(MockCaptioner::new());
    let pool = CaptionPool::new(captioner.clone(), &CaptionsConfig::default());

    let page = RgbImage::from_pixel(600, 400, Rgb([128, 128, 128]));
    let mut descriptor = PageDescriptor::new("req1", 600, 400);
    descriptor.regions.push(Region {
        id: "degenerate".to_string(),
        category: RegionCategory::Photo,
        // zero width
        polygon: rect(100.0, 50.0, 100.0, 200.0),
        transcription: None,
        lines: vec![],
    });
    descriptor.regions.push(Region {
        id: "fine".to_string(),
        category: RegionCategory::Photo,
        polygon: rect(200.0, 50.0, 400.0, 200.0),
        transcription: None,
        lines: vec![],
    });

    pool.enrich(&page, &mut descriptor).await;

    assert_eq!(captioner.calls.load(Ordering::SeqCst), 1, "only the real crop");
    assert_eq!(descriptor.regions[0].transcription, None);
    assert_eq!(
        descriptor.regions[1].transcription.as_deref(),
        Some("A short caption.")
    );
}

#[tokio::test]
async fn caption_failure_is_isolated_to_its_region() {
    let captioner = Arc::new(MockCaptioner::new());
    let pool = CaptionPool::new(captioner.clone(), &CaptionsConfig::default());

    let page = RgbImage::from_pixel(600, 400, Rgb([128, 128, 128]));
    let mut descriptor = PageDescriptor::new("req1", 600, 400);
    descriptor.regions.push(Region {
        id: "narrow".to_string(),
        category: RegionCategory::Photo,
        // narrower than the mock's 50 px refusal threshold
        polygon: rect(10.0, 50.0, 40.0, 200.0),
        transcription: None,
        lines: vec![],
    });
    descriptor.regions.push(Region {
        id: "wide".to_string(),
        category: RegionCategory::Photo,
        polygon: rect(200.0, 50.0, 400.0, 200.0),
        transcription: None,
        lines: vec![],
    });

    pool.enrich(&page, &mut descriptor).await;

    assert_eq!(captioner.calls.load(Ordering::SeqCst), 2);
    assert_eq!(descriptor.regions[0].transcription.as_deref(), Some(""));
    assert_eq!(
        descriptor.regions[1].transcription.as_deref(),
        Some("A short caption.")
    );
}

// =============================================================================
// Watch loop
// =============================================================================

#[tokio::test]
async fn watcher_and_processor_drive_requests_to_exactly_one_terminal_state() {
    let (_dir, store) = test_store();
    upload_page(&store, "good-req", 600, 400);
    store.write_upload("bad-req", b"garbage").unwrap();

    let processor = processor(&store, MockEngine::succeeding(), None);
    let mut watcher = Watcher::new(store.clone(), Duration::from_millis(10));

    for request_id in watcher.scan().unwrap() {
        processor.process(&request_id).await;
    }

    assert_eq!(store.state("good-req"), RequestState::Done);
    assert_eq!(store.state("bad-req"), RequestState::Error);

    // a second scan pass finds nothing new
    assert!(watcher.scan().unwrap().is_empty());
}
