//! Logits persistence and confidence estimation
//!
//! The layout engine emits, per text line, a frame-by-class logit matrix
//! whose last column is the CTC blank. The worker persists one logits
//! document per request alongside the layout XML; the serving process loads
//! it to score transcription characters at query time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Per-line logit matrix, `frames x (inventory size + 1)`, last class blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineLogits {
    pub frames: Vec<Vec<f32>>,
}

/// One logits document per request: the model character inventory plus the
/// logit matrix of every text line, keyed by line id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogitsDoc {
    /// Character inventory; position = class index
    pub characters: Vec<char>,
    pub lines: BTreeMap<String, LineLogits>,
}

impl LogitsDoc {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Character → class index lookup table.
    pub fn char_map(&self) -> HashMap<char, usize> {
        self.characters
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i))
            .collect()
    }
}

/// Estimation failures; callers degrade to uniform confidence rather than
/// failing the response.
#[derive(Debug, Error, PartialEq)]
pub enum EstimateError {
    #[error("line has no logit frames")]
    EmptyLogits,

    #[error("logit frame {frame} has {found} classes, expected {expected}")]
    FrameWidth {
        frame: usize,
        expected: usize,
        found: usize,
    },

    #[error("character index {index} outside inventory of {inventory} classes")]
    IndexOutOfRange { index: usize, inventory: usize },

    #[error("alignment produced {found} characters, transcription has {expected}")]
    AlignmentMismatch { expected: usize, found: usize },
}

/// Estimate one probability per transcribed character.
///
/// Frames are softmaxed, then greedily decoded (argmax per frame, repeats
/// collapsed, blanks dropped). The decode must reproduce `char_indices`
/// exactly; each character's confidence is the best probability its class
/// reached within its aligned run of frames.
pub fn estimate_line_confidences(
    logits: &LineLogits,
    char_indices: &[usize],
    inventory_size: usize,
) -> Result<Vec<f32>, EstimateError> {
    if char_indices.is_empty() {
        return Ok(Vec::new());
    }
    if logits.frames.is_empty() {
        return Err(EstimateError::EmptyLogits);
    }

    let class_count = inventory_size + 1;
    let blank = inventory_size;

    for (frame, row) in logits.frames.iter().enumerate() {
        if row.len() != class_count {
            return Err(EstimateError::FrameWidth {
                frame,
                expected: class_count,
                found: row.len(),
            });
        }
    }

    for &index in char_indices {
        if index >= inventory_size {
            return Err(EstimateError::IndexOutOfRange {
                index,
                inventory: inventory_size,
            });
        }
    }

    // Greedy decode over softmaxed frames: each non-blank run of a single
    // class is one emitted character.
    let mut decoded: Vec<(usize, f32)> = Vec::new();
    let mut previous = blank;

    for row in &logits.frames {
        let probs = softmax(row);
        let (label, _) = argmax(&probs);

        if label != blank {
            let confidence = probs[label];
            if label == previous {
                if let Some(last) = decoded.last_mut() {
                    last.1 = last.1.max(confidence);
                }
            } else {
                decoded.push((label, confidence));
            }
        }
        previous = label;
    }

    if decoded.len() != char_indices.len()
        || decoded
            .iter()
            .zip(char_indices)
            .any(|((label, _), &expected)| *label != expected)
    {
        return Err(EstimateError::AlignmentMismatch {
            expected: char_indices.len(),
            found: decoded.len(),
        });
    }

    Ok(decoded.into_iter().map(|(_, confidence)| confidence).collect())
}

fn softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn argmax(row: &[f32]) -> (usize, f32) {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    (best, row[best])
}
