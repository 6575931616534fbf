//! Page layout data model
//!
//! The layout engine's output for one page: an ordered list of regions, each
//! carrying a polygon and a category, text regions additionally carrying
//! their lines. The descriptor is owned by the worker until persisted and
//! read-only once the serving process loads it for a query.

use serde::{Deserialize, Serialize};

/// A 2-D point in page pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box of a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Bounding box of a point sequence, None for an empty sequence.
    pub fn of(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            x1: first.x,
            y1: first.y,
            x2: first.x,
            y2: first.y,
        };
        for p in &points[1..] {
            bbox.x1 = bbox.x1.min(p.x);
            bbox.y1 = bbox.y1.min(p.y);
            bbox.x2 = bbox.x2.max(p.x);
            bbox.y2 = bbox.y2.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Region category label set
///
/// A closed enumeration: the engine reports one of these for every region,
/// and all downstream dispatch (placeholder labels, caption eligibility) is
/// keyed by the variant rather than a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionCategory {
    Text,
    Image,
    Photo,
    Graph,
    Initial,
    Map,
    DecorativeText,
    Stamp,
    Code,
    Schema,
    Music,
    Other,
}

impl RegionCategory {
    /// Stable string form used in the layout document and client records.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionCategory::Text => "text",
            RegionCategory::Image => "image",
            RegionCategory::Photo => "photo",
            RegionCategory::Graph => "graph",
            RegionCategory::Initial => "initial",
            RegionCategory::Map => "map",
            RegionCategory::DecorativeText => "decorative_text",
            RegionCategory::Stamp => "stamp",
            RegionCategory::Code => "code",
            RegionCategory::Schema => "schema",
            RegionCategory::Music => "music",
            RegionCategory::Other => "other",
        }
    }

    /// Categories whose crops may be sent to the captioning collaborator.
    pub fn caption_eligible(&self) -> bool {
        matches!(
            self,
            RegionCategory::Image
                | RegionCategory::Photo
                | RegionCategory::Graph
                | RegionCategory::Map
                | RegionCategory::DecorativeText
                | RegionCategory::Schema
        )
    }
}

impl std::str::FromStr for RegionCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(RegionCategory::Text),
            "image" => Ok(RegionCategory::Image),
            "photo" => Ok(RegionCategory::Photo),
            "graph" => Ok(RegionCategory::Graph),
            "initial" => Ok(RegionCategory::Initial),
            "map" => Ok(RegionCategory::Map),
            "decorative_text" => Ok(RegionCategory::DecorativeText),
            "stamp" => Ok(RegionCategory::Stamp),
            "code" => Ok(RegionCategory::Code),
            "schema" => Ok(RegionCategory::Schema),
            "music" => Ok(RegionCategory::Music),
            "other" => Ok(RegionCategory::Other),
            other => Err(format!("unknown region category: {other}")),
        }
    }
}

/// A single text line within a text region
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub id: String,
    pub polygon: Vec<Point>,
    pub transcription: String,
    /// Height above and below the baseline
    pub heights: [f32; 2],
}

/// A labeled area of the page
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: String,
    pub category: RegionCategory,
    pub polygon: Vec<Point>,
    /// Region-level transcription: a caption for caption-eligible regions,
    /// a notation encoding for music regions.
    pub transcription: Option<String>,
    /// Populated for text regions only
    pub lines: Vec<TextLine>,
}

impl Region {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::of(&self.polygon)
    }
}

/// Layout engine output for one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageDescriptor {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<Region>,
}

impl PageDescriptor {
    /// Empty descriptor seeded with the original pixel dimensions, handed to
    /// the layout engine for population.
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            regions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_spans_all_points() {
        let points = vec![
            Point::new(10.0, 40.0),
            Point::new(120.0, 35.0),
            Point::new(60.0, 90.0),
        ];
        let bbox = BoundingBox::of(&points).unwrap();
        assert_eq!(bbox.x1, 10.0);
        assert_eq!(bbox.y1, 35.0);
        assert_eq!(bbox.x2, 120.0);
        assert_eq!(bbox.y2, 90.0);
        assert_eq!(bbox.width(), 110.0);
        assert_eq!(bbox.height(), 55.0);
    }

    #[test]
    fn bounding_box_of_empty_polygon_is_none() {
        assert!(BoundingBox::of(&[]).is_none());
    }

    #[test]
    fn caption_eligibility_is_limited_to_pictorial_categories() {
        assert!(RegionCategory::Photo.caption_eligible());
        assert!(RegionCategory::Schema.caption_eligible());
        assert!(!RegionCategory::Text.caption_eligible());
        assert!(!RegionCategory::Stamp.caption_eligible());
        assert!(!RegionCategory::Music.caption_eligible());
    }
}
