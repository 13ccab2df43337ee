//! Diagnostic renderings of a before/after raster pair.
//!
//! Three independent images are produced:
//! - `compare`: both captures side by side, separated by a margin
//! - `diff`: an overlay that greys out unchanged pixels and highlights
//!   changed ones, with tinted bands where only one capture has content
//! - `diff-shifted`: silhouettes of non-white content, before in red and
//!   after in blue, so layout shift stands out regardless of color

use image::imageops;
use image::{Rgba, RgbaImage};

use super::engine::pixels_differ;
use super::types::{DEFAULT_TOLERANCE, DiffResult, encode_png};

/// Default gap between the two halves of the compare image (pixels)
pub const DEFAULT_MARGIN: u32 = 50;

/// Channels at or above this value on R, G and B count as near-white
pub const DEFAULT_WHITE_THRESHOLD: u8 = 240;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const HIGHLIGHT: Rgba<u8> = Rgba([255, 0, 255, 180]);
const DELETED: Rgba<u8> = Rgba([255, 100, 100, 150]);
const ADDED: Rgba<u8> = Rgba([100, 255, 100, 150]);
const SILHOUETTE_BEFORE: Rgba<u8> = Rgba([255, 0, 0, 255]);
const SILHOUETTE_AFTER: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Tunables shared by the three renderings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualizerOptions {
    /// Gap between halves of the compare image
    pub margin: u32,
    /// Per-channel tolerance for the overlay diff
    pub tolerance: u8,
    /// Near-white threshold for the shifted silhouette
    pub white_threshold: u8,
}

impl Default for VisualizerOptions {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            tolerance: DEFAULT_TOLERANCE,
            white_threshold: DEFAULT_WHITE_THRESHOLD,
        }
    }
}

/// PNG-encoded visualizations for one before/after pair
#[derive(Debug, Clone)]
pub struct DiffImages {
    pub compare: Vec<u8>,
    pub diff: Vec<u8>,
    pub shifted: Vec<u8>,
}

fn union_dimensions(before: &RgbaImage, after: &RgbaImage) -> (u32, u32) {
    (
        before.width().max(after.width()),
        before.height().max(after.height()),
    )
}

/// Side-by-side image of size `(max_w * 2 + margin, max_h)`.
///
/// Inputs are copied unscaled; slot area not covered by a smaller image
/// stays transparent.
pub fn render_compare(before: &RgbaImage, after: &RgbaImage, margin: u32) -> RgbaImage {
    let (max_width, max_height) = union_dimensions(before, after);
    let mut canvas = RgbaImage::from_pixel(max_width * 2 + margin, max_height, TRANSPARENT);

    imageops::replace(&mut canvas, before, 0, 0);
    imageops::replace(&mut canvas, after, i64::from(max_width + margin), 0);

    canvas
}

/// Overlay diff of size `(max_w, max_h)`.
pub fn render_overlay_diff(before: &RgbaImage, after: &RgbaImage, tolerance: u8) -> RgbaImage {
    let (width, height) = union_dimensions(before, after);
    let mut canvas = RgbaImage::from_pixel(width, height, WHITE);

    for (x, y, out) in canvas.enumerate_pixels_mut() {
        let in_before = x < before.width() && y < before.height();
        let in_after = x < after.width() && y < after.height();

        *out = match (in_before, in_after) {
            (true, true) => {
                let after_pixel = after.get_pixel(x, y);
                if pixels_differ(before.get_pixel(x, y), after_pixel, tolerance) {
                    HIGHLIGHT
                } else {
                    let [r, g, b, _] = after_pixel.0;
                    let gray = ((u16::from(r) + u16::from(g) + u16::from(b)) / 3) as u8;
                    Rgba([gray, gray, gray, 255])
                }
            }
            (true, false) => DELETED,
            (false, true) => ADDED,
            (false, false) => continue,
        };
    }

    canvas
}

fn is_near_white(pixel: &Rgba<u8>, threshold: u8) -> bool {
    let [r, g, b, _] = pixel.0;
    r >= threshold && g >= threshold && b >= threshold
}

/// Shifted silhouette of size `(max_w, max_h)`.
///
/// The after pass runs second and overwrites, so coordinates with content
/// in both captures come out in the after color.
pub fn render_shifted(before: &RgbaImage, after: &RgbaImage, white_threshold: u8) -> RgbaImage {
    let (width, height) = union_dimensions(before, after);
    let mut canvas = RgbaImage::from_pixel(width, height, WHITE);

    for (source, color) in [(before, SILHOUETTE_BEFORE), (after, SILHOUETTE_AFTER)] {
        for (x, y, pixel) in source.enumerate_pixels() {
            if !is_near_white(pixel, white_threshold) {
                canvas.put_pixel(x, y, color);
            }
        }
    }

    canvas
}

/// Render and PNG-encode all three visualizations.
///
/// PNG has no zero-area images, so when both inputs are empty in either
/// dimension this returns `DiffError::Encode`. The `render_*` functions
/// still produce the (empty) rasters in that case.
pub fn visualize(
    before: &RgbaImage,
    after: &RgbaImage,
    options: VisualizerOptions,
) -> DiffResult<DiffImages> {
    Ok(DiffImages {
        compare: encode_png(&render_compare(before, after, options.margin))?,
        diff: encode_png(&render_overlay_diff(before, after, options.tolerance))?,
        shifted: encode_png(&render_shifted(before, after, options.white_threshold))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(color))
    }

    #[test]
    fn test_compare_dimensions_ignore_order() {
        let small = solid(10, 30, [0, 0, 0, 255]);
        let large = solid(25, 12, [0, 0, 0, 255]);
        assert_eq!(render_compare(&small, &large, 50).dimensions(), (25 * 2 + 50, 30));
        assert_eq!(render_compare(&large, &small, 50).dimensions(), (25 * 2 + 50, 30));
    }

    #[test]
    fn test_compare_placement_and_padding() {
        let before = solid(4, 4, [255, 0, 0, 255]);
        let after = solid(2, 2, [0, 255, 0, 255]);
        let img = render_compare(&before, &after, 3);

        assert_eq!(img.dimensions(), (11, 4));
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(3, 3), &Rgba([255, 0, 0, 255]));
        // Margin
        assert_eq!(img.get_pixel(5, 0), &TRANSPARENT);
        // After slot starts at max_w + margin = 7
        assert_eq!(img.get_pixel(7, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(img.get_pixel(8, 1), &Rgba([0, 255, 0, 255]));
        // Unpainted part of the smaller image's slot
        assert_eq!(img.get_pixel(10, 3), &TRANSPARENT);
    }

    #[test]
    fn test_overlay_regions() {
        // before 4x2, after 2x4: (0..2, 0..2) shared, x>=2 only before, y>=2 only after
        let before = solid(4, 2, [90, 120, 150, 255]);
        let mut after = solid(2, 4, [90, 120, 150, 255]);
        after.put_pixel(1, 1, Rgba([0, 0, 0, 255]));

        let img = render_overlay_diff(&before, &after, DEFAULT_TOLERANCE);
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(0, 0), &Rgba([120, 120, 120, 255]));
        assert_eq!(img.get_pixel(1, 1), &HIGHLIGHT);
        assert_eq!(img.get_pixel(3, 0), &DELETED);
        assert_eq!(img.get_pixel(0, 3), &ADDED);
        // Outside both rasters keeps the white background
        assert_eq!(img.get_pixel(3, 3), &WHITE);
    }

    #[test]
    fn test_overlay_gray_uses_after_pixel() {
        let before = solid(1, 1, [30, 30, 30, 255]);
        let after = solid(1, 1, [36, 33, 39, 255]);
        let img = render_overlay_diff(&before, &after, DEFAULT_TOLERANCE);
        assert_eq!(img.get_pixel(0, 0), &Rgba([36, 36, 36, 255]));
    }

    #[test]
    fn test_shifted_after_wins_overlap() {
        let before = solid(3, 3, [10, 10, 10, 255]);
        let mut after = solid(3, 3, [255, 255, 255, 255]);
        after.put_pixel(1, 1, Rgba([10, 10, 10, 255]));

        let img = render_shifted(&before, &after, DEFAULT_WHITE_THRESHOLD);
        assert_eq!(img.get_pixel(0, 0), &SILHOUETTE_BEFORE);
        assert_eq!(img.get_pixel(1, 1), &SILHOUETTE_AFTER);
    }

    #[test]
    fn test_shifted_near_white_is_background() {
        let before = solid(2, 1, [240, 245, 250, 255]);
        let after = solid(4, 2, [239, 255, 255, 255]);
        let img = render_shifted(&before, &after, DEFAULT_WHITE_THRESHOLD);
        assert_eq!(img.dimensions(), (4, 2));
        // 239 on red is below the threshold, so after content everywhere
        assert_eq!(img.get_pixel(3, 1), &SILHOUETTE_AFTER);

        let blank = solid(2, 1, [255, 255, 255, 255]);
        let img = render_shifted(&before, &blank, DEFAULT_WHITE_THRESHOLD);
        assert_eq!(img.get_pixel(0, 0), &WHITE);
    }

    #[test]
    fn test_visualize_encodes_all_three() {
        let before = solid(5, 5, [0, 0, 0, 255]);
        let after = solid(6, 4, [0, 0, 0, 255]);
        let images = visualize(&before, &after, VisualizerOptions::default()).unwrap();
        for png in [&images.compare, &images.diff, &images.shifted] {
            assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);
        }
    }

    #[test]
    fn test_zero_area_renders_but_does_not_encode() {
        let empty = RgbaImage::new(0, 0);
        assert_eq!(render_compare(&empty, &empty, 50).dimensions(), (50, 0));
        assert_eq!(render_overlay_diff(&empty, &empty, 10).dimensions(), (0, 0));
        assert_eq!(render_shifted(&empty, &empty, 240).dimensions(), (0, 0));

        let result = visualize(&empty, &empty, VisualizerOptions::default());
        assert!(matches!(result, Err(crate::diff::DiffError::Encode(_))));

        // One non-empty side is enough to encode
        let tall = solid(0, 4, [0, 0, 0, 255]);
        let wide = solid(3, 0, [0, 0, 0, 255]);
        let images = visualize(&tall, &wide, VisualizerOptions::default()).unwrap();
        assert!(!images.diff.is_empty());
    }
}
