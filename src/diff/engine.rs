//! Channel-tolerant pixel difference over the overlap of two rasters.

use image::{Rgba, RgbaImage};

use super::types::PixelDiffResult;

/// Check whether two pixels differ.
///
/// Each of R, G, B and A is compared on its own; a single channel whose
/// absolute difference exceeds `tolerance` makes the pixels different.
pub fn pixels_differ(a: &Rgba<u8>, b: &Rgba<u8>, tolerance: u8) -> bool {
    a.0.iter()
        .zip(b.0.iter())
        .any(|(x, y)| x.abs_diff(*y) > tolerance)
}

/// Count differing pixels in the intersection of `before` and `after`.
///
/// Pixels outside `min(w) x min(h)` are not scored. A zero-area overlap
/// yields 0 of 0 pixels and 0%.
pub fn compare(before: &RgbaImage, after: &RgbaImage, tolerance: u8) -> PixelDiffResult {
    let width = before.width().min(after.width());
    let height = before.height().min(after.height());
    let total_pixels = u64::from(width) * u64::from(height);

    let mut different_pixels = 0u64;
    for y in 0..height {
        for x in 0..width {
            if pixels_differ(before.get_pixel(x, y), after.get_pixel(x, y), tolerance) {
                different_pixels += 1;
            }
        }
    }

    PixelDiffResult::new(different_pixels, total_pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::types::DEFAULT_TOLERANCE;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(color))
    }

    #[test]
    fn test_identical_images() {
        let a = solid(20, 10, [12, 34, 56, 255]);
        let result = compare(&a, &a.clone(), DEFAULT_TOLERANCE);
        assert_eq!(result.different_pixels, 0);
        assert_eq!(result.total_pixels, 200);
        assert_eq!(result.difference_percentage, 0.0);
    }

    #[test]
    fn test_all_channels_far_apart() {
        let a = solid(8, 8, [0, 0, 0, 0]);
        let b = solid(8, 8, [200, 200, 200, 200]);
        let result = compare(&a, &b, DEFAULT_TOLERANCE);
        assert_eq!(result.different_pixels, 64);
        assert_eq!(result.difference_percentage, 100.0);
    }

    #[test]
    fn test_tolerance_boundary() {
        let base = Rgba([100, 100, 100, 255]);
        assert!(!pixels_differ(&base, &Rgba([110, 100, 100, 255]), 10));
        assert!(pixels_differ(&base, &Rgba([111, 100, 100, 255]), 10));
        assert!(!pixels_differ(&base, &Rgba([90, 100, 100, 255]), 10));
        assert!(pixels_differ(&base, &Rgba([89, 100, 100, 255]), 10));
    }

    #[test]
    fn test_alpha_alone_counts() {
        let a = Rgba([1, 2, 3, 255]);
        let b = Rgba([1, 2, 3, 0]);
        assert!(pixels_differ(&a, &b, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_channels_not_summed() {
        // Every channel off by exactly the tolerance: a Euclidean test would
        // flag this, the per-channel test must not.
        let a = Rgba([50, 50, 50, 50]);
        let b = Rgba([60, 60, 60, 60]);
        assert!(!pixels_differ(&a, &b, 10));
    }

    #[test]
    fn test_differing_sizes_score_overlap_only() {
        let a = solid(30, 5, [255, 255, 255, 255]);
        let mut b = solid(10, 40, [255, 255, 255, 255]);
        b.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        // Outside the overlap: must not be counted
        b.put_pixel(5, 30, Rgba([0, 0, 0, 255]));

        let result = compare(&a, &b, DEFAULT_TOLERANCE);
        assert_eq!(result.total_pixels, 10 * 5);
        assert_eq!(result.different_pixels, 1);
        assert_eq!(result.rounded_percentage(), 2.0);
    }

    #[test]
    fn test_zero_area() {
        let a = RgbaImage::new(0, 0);
        let b = solid(4, 4, [0, 0, 0, 255]);
        let result = compare(&a, &b, DEFAULT_TOLERANCE);
        assert_eq!(result.total_pixels, 0);
        assert_eq!(result.different_pixels, 0);
        assert_eq!(result.difference_percentage, 0.0);
    }
}
