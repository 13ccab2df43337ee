// Core types for pixel comparison

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

/// Default per-channel tolerance before two pixels count as different
pub const DEFAULT_TOLERANCE: u8 = 10;

/// Result type for diff operations
pub type DiffResult<T> = Result<T, DiffError>;

/// Error types for raster decoding and encoding
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),
}

/// Outcome of a pixel comparison over the overlapping region of two rasters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelDiffResult {
    /// Pixels where at least one channel differs by more than the tolerance
    pub different_pixels: u64,

    /// `min(w1, w2) * min(h1, h2)`
    pub total_pixels: u64,

    /// Unrounded percentage in `0.0..=100.0`
    pub difference_percentage: f64,
}

impl PixelDiffResult {
    pub fn new(different_pixels: u64, total_pixels: u64) -> Self {
        let difference_percentage = if total_pixels > 0 {
            different_pixels as f64 / total_pixels as f64 * 100.0
        } else {
            0.0
        };
        Self {
            different_pixels,
            total_pixels,
            difference_percentage,
        }
    }

    /// Percentage rounded to the nearest integer (ties to even), as
    /// reported in metadata
    pub fn rounded_percentage(&self) -> f64 {
        self.difference_percentage.round_ties_even()
    }
}

/// Decode screenshot bytes (any format `image` understands) into an RGBA raster
pub fn decode_raster(what: &str, data: &[u8]) -> DiffResult<RgbaImage> {
    let img = image::load_from_memory(data).map_err(|source| DiffError::Decode {
        what: what.to_string(),
        source,
    })?;
    Ok(img.to_rgba8())
}

/// Encode a raster as lossless PNG bytes
pub fn encode_png(img: &RgbaImage) -> DiffResult<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(DiffError::Encode)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_zero_area_is_zero_percent() {
        let result = PixelDiffResult::new(0, 0);
        assert_eq!(result.difference_percentage, 0.0);
        assert_eq!(result.rounded_percentage(), 0.0);
    }

    #[test]
    fn test_rounding() {
        // 1 of 3 pixels = 33.33..%
        assert_eq!(PixelDiffResult::new(1, 3).rounded_percentage(), 33.0);
        // 2 of 3 pixels = 66.66..%
        assert_eq!(PixelDiffResult::new(2, 3).rounded_percentage(), 67.0);
        // 1 of 8 = 12.5%, 7 of 8 = 87.5%
        assert_eq!(PixelDiffResult::new(1, 8).rounded_percentage(), 12.0);
        assert_eq!(PixelDiffResult::new(7, 8).rounded_percentage(), 88.0);
    }

    #[test]
    fn test_png_roundtrip_keeps_alpha() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([255, 0, 255, 180]));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);
        let decoded = decode_raster("fixture", &png).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1), &Rgba([255, 0, 255, 180]));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_raster("before screenshot", b"not an image").unwrap_err();
        assert!(err.to_string().contains("before screenshot"));
    }
}
