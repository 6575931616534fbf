//! Persisted layout document
//!
//! The worker writes one XML document per finished request and the serving
//! process reads it back for `get_lines`. Polygons are encoded as
//! space-separated `x,y` pairs in the `points` attribute of a `Coords`
//! element.

use crate::layout::{PageDescriptor, Point, Region, RegionCategory, TextLine};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "Page")]
struct PageElem {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@width")]
    width: u32,
    #[serde(rename = "@height")]
    height: u32,
    #[serde(rename = "Region", default)]
    regions: Vec<RegionElem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegionElem {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@category")]
    category: String,
    #[serde(rename = "Coords")]
    coords: CoordsElem,
    #[serde(rename = "Transcription", skip_serializing_if = "Option::is_none")]
    transcription: Option<TextElem>,
    #[serde(rename = "TextLine", default)]
    lines: Vec<TextLineElem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextLineElem {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "Coords")]
    coords: CoordsElem,
    #[serde(rename = "Heights")]
    heights: HeightsElem,
    #[serde(rename = "Transcription", default)]
    transcription: Option<TextElem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CoordsElem {
    #[serde(rename = "@points")]
    points: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeightsElem {
    #[serde(rename = "@above")]
    above: f32,
    #[serde(rename = "@below")]
    below: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextElem {
    #[serde(rename = "$text", default)]
    text: String,
}

/// Serialize a page descriptor to the on-disk XML form.
pub fn to_xml(descriptor: &PageDescriptor) -> Result<String> {
    let elem = PageElem {
        id: descriptor.id.clone(),
        width: descriptor.width,
        height: descriptor.height,
        regions: descriptor.regions.iter().map(region_to_elem).collect(),
    };
    let body = quick_xml::se::to_string(&elem)?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
}

/// Parse the on-disk XML form back into a page descriptor.
pub fn from_xml(xml: &str) -> Result<PageDescriptor> {
    let elem: PageElem = quick_xml::de::from_str(xml)?;

    let regions = elem
        .regions
        .into_iter()
        .map(region_from_elem)
        .collect::<Result<Vec<_>>>()?;

    Ok(PageDescriptor {
        id: elem.id,
        width: elem.width,
        height: elem.height,
        regions,
    })
}

fn region_to_elem(region: &Region) -> RegionElem {
    RegionElem {
        id: region.id.clone(),
        category: region.category.as_str().to_string(),
        coords: CoordsElem {
            points: format_points(&region.polygon),
        },
        transcription: region.transcription.as_ref().map(|text| TextElem {
            text: text.clone(),
        }),
        lines: region
            .lines
            .iter()
            .map(|line| TextLineElem {
                id: line.id.clone(),
                coords: CoordsElem {
                    points: format_points(&line.polygon),
                },
                heights: HeightsElem {
                    above: line.heights[0],
                    below: line.heights[1],
                },
                transcription: Some(TextElem {
                    text: line.transcription.clone(),
                }),
            })
            .collect(),
    }
}

fn region_from_elem(elem: RegionElem) -> Result<Region> {
    let category: RegionCategory = elem
        .category
        .parse()
        .map_err(|e: String| Error::Layout(e))?;

    let lines = elem
        .lines
        .into_iter()
        .map(|line| {
            Ok(TextLine {
                id: line.id,
                polygon: parse_points(&line.coords.points)?,
                transcription: line.transcription.map(|t| t.text).unwrap_or_default(),
                heights: [line.heights.above, line.heights.below],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Region {
        id: elem.id,
        category,
        polygon: parse_points(&elem.coords.points)?,
        transcription: elem.transcription.map(|t| t.text),
        lines,
    })
}

fn format_points(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_points(s: &str) -> Result<Vec<Point>> {
    s.split_whitespace()
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| Error::Layout(format!("malformed point: {pair}")))?;
            let x = x
                .parse::<f32>()
                .map_err(|_| Error::Layout(format!("malformed point: {pair}")))?;
            let y = y
                .parse::<f32>()
                .map_err(|_| Error::Layout(format!("malformed point: {pair}")))?;
            Ok(Point::new(x, y))
        })
        .collect()
}
