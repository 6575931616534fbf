//! In-memory JPEG encoding

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageResult, RgbImage};

/// Encode an RGB image as JPEG bytes.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(encoded)
}
