//! Result serializer
//!
//! Converts a persisted page descriptor into the uniform client-facing
//! record stream: one record per text line, one placeholder record per
//! non-text region with a running per-category counter, and per-character
//! confidences computed from the persisted logits.

use scanpipe_common::layout::{BoundingBox, PageDescriptor, Point, Region, RegionCategory, TextLine};
use scanpipe_common::logits::{estimate_line_confidences, LogitsDoc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Client-facing record for one line or non-text region
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub id: String,
    pub text: String,
    pub points: Vec<[i64; 2]>,
    pub heights: Vec<f32>,
    pub confidences: Vec<f32>,
    pub ligature_mapping: Vec<Vec<usize>>,
    pub category: &'static str,
}

struct Placeholder {
    /// Human-readable label inside the brackets
    label: &'static str,
    /// Append the region's own transcription (caption) after the label
    append_transcription: bool,
}

/// Placeholder table for the non-text categories. Text and Music are
/// handled separately; a category absent from this table would be omitted
/// from the output.
fn placeholder(category: RegionCategory) -> Option<Placeholder> {
    let (label, append_transcription) = match category {
        RegionCategory::Image => ("Image", true),
        RegionCategory::Photo => ("Photo", true),
        RegionCategory::Graph => ("Graph", true),
        RegionCategory::Initial => ("Initial", false),
        RegionCategory::Map => ("Map", true),
        RegionCategory::DecorativeText => ("Decorative text", true),
        RegionCategory::Stamp => ("Stamp", false),
        RegionCategory::Code => ("QR/Barcode", false),
        RegionCategory::Schema => ("Schema", true),
        RegionCategory::Other => ("Other object", false),
        RegionCategory::Text | RegionCategory::Music => return None,
    };
    Some(Placeholder {
        label,
        append_transcription,
    })
}

/// Convert a full page into the client record stream, in document order.
pub fn convert_page(descriptor: &PageDescriptor, logits: Option<&LogitsDoc>) -> Vec<ResultRecord> {
    let mut records = Vec::new();
    let mut counts: HashMap<&'static str, usize> = HashMap::new();

    for region in &descriptor.regions {
        match region.category {
            RegionCategory::Text => {
                for line in &region.lines {
                    records.push(convert_line(line, logits));
                }
            }
            RegionCategory::Music => {
                records.push(convert_region_object(region, String::new()));
            }
            category => {
                if let Some(rule) = placeholder(category) {
                    let count = counts.entry(category.as_str()).or_insert(0);
                    *count += 1;
                    let mut text = format!("[{} #{}]", rule.label, count);

                    if rule.append_transcription {
                        if let Some(caption) = region.transcription.as_deref() {
                            if !caption.is_empty() {
                                text = format!("{text} {caption}");
                            }
                        }
                    }

                    records.push(convert_region_object(region, text));
                }
            }
        }
    }

    records
}

fn convert_line(line: &TextLine, logits: Option<&LogitsDoc>) -> ResultRecord {
    let char_count = line.transcription.chars().count();

    ResultRecord {
        id: line.id.clone(),
        text: line.transcription.clone(),
        points: round_points(&line.polygon),
        heights: line.heights.to_vec(),
        confidences: line_confidences(line, logits),
        ligature_mapping: identity_mapping(char_count),
        category: "text",
    }
}

fn convert_region_object(region: &Region, text: String) -> ResultRecord {
    let height = region
        .bounding_box()
        .map(|bbox: BoundingBox| bbox.height())
        .unwrap_or(0.0);
    let char_count = text.chars().count();

    ResultRecord {
        id: region.id.clone(),
        text,
        points: round_points(&region.polygon),
        heights: vec![height, 0.0],
        confidences: vec![1.0; char_count],
        ligature_mapping: identity_mapping(char_count),
        category: region.category.as_str(),
    }
}

/// Per-character confidences for one text line. Any failure — missing
/// logits, a character outside the inventory, an estimation error — degrades
/// to uniform 1.0 of transcription length rather than failing the response.
fn line_confidences(line: &TextLine, logits: Option<&LogitsDoc>) -> Vec<f32> {
    let char_count = line.transcription.chars().count();
    if char_count == 0 {
        return Vec::new();
    }

    let Some(doc) = logits else {
        return vec![1.0; char_count];
    };
    let Some(line_logits) = doc.lines.get(&line.id) else {
        debug!(line_id = %line.id, "no logits for line, using uniform confidence");
        return vec![1.0; char_count];
    };

    let char_map = doc.char_map();
    let mut indices = Vec::with_capacity(char_count);
    for c in line.transcription.chars() {
        match char_map.get(&c) {
            Some(&index) => indices.push(index),
            None => {
                debug!(line_id = %line.id, character = %c, "character outside inventory");
                return vec![1.0; char_count];
            }
        }
    }

    match estimate_line_confidences(line_logits, &indices, doc.characters.len()) {
        Ok(confidences) => confidences,
        Err(e) => {
            debug!(line_id = %line.id, error = %e, "confidence estimation failed");
            vec![1.0; char_count]
        }
    }
}

/// One-element index list per output character; placeholder for future
/// multi-character-glyph support.
fn identity_mapping(char_count: usize) -> Vec<Vec<usize>> {
    (0..char_count).map(|i| vec![i]).collect()
}

fn round_points(points: &[Point]) -> Vec<[i64; 2]> {
    points
        .iter()
        .map(|p| [p.x.round() as i64, p.y.round() as i64])
        .collect()
}
