//! Properties of the pixel diff engine and its visualizations

use image::{Rgba, RgbaImage};
use page_compare::diff::{
    DEFAULT_TOLERANCE, VisualizerOptions, compare, decode_raster, render_compare,
    render_overlay_diff, render_shifted, visualize,
};
use page_compare::MockFramebuffer;

fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(color))
}

/// Deterministic noise so tests cover more than flat colors
fn pattern(w: u32, h: u32, seed: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let v = x.wrapping_mul(31).wrapping_add(y.wrapping_mul(17)).wrapping_add(seed);
        Rgba([(v % 200) as u8, (v / 3 % 200) as u8, (v / 7 % 200) as u8, 255])
    })
}

#[test]
fn test_identical_rasters_have_no_difference() {
    for (w, h) in [(1, 1), (7, 3), (64, 48)] {
        let img = pattern(w, h, w + h);
        let result = compare(&img, &img.clone(), DEFAULT_TOLERANCE);
        assert_eq!(result.different_pixels, 0);
        assert_eq!(result.difference_percentage, 0.0);
    }
}

#[test]
fn test_every_channel_beyond_tolerance_is_full_difference() {
    let before = pattern(32, 16, 1);
    let after = RgbaImage::from_fn(32, 16, |x, y| {
        let p = before.get_pixel(x, y).0;
        Rgba([p[0] + 50, p[1] + 50, p[2] + 50, 200])
    });
    let result = compare(&before, &after, 10);
    assert_eq!(result.difference_percentage, 100.0);
}

#[test]
fn test_tolerance_boundary() {
    let base = solid(4, 4, [100, 100, 100, 255]);
    for channel in 0..4 {
        let mut at = [100u8, 100, 100, 255];
        let mut over = at;
        if channel == 3 {
            at[3] = 245;
            over[3] = 244;
        } else {
            at[channel] = 110;
            over[channel] = 111;
        }
        assert_eq!(compare(&base, &solid(4, 4, at), 10).different_pixels, 0);
        assert_eq!(compare(&base, &solid(4, 4, over), 10).different_pixels, 16);
    }
}

#[test]
fn test_differing_sizes_score_overlap_only() {
    let before = solid(30, 10, [0, 0, 0, 255]);
    let after = solid(12, 25, [0, 0, 0, 255]);
    let result = compare(&before, &after, DEFAULT_TOLERANCE);
    assert_eq!(result.total_pixels, 12 * 10);
    assert_eq!(result.different_pixels, 0);
}

#[test]
fn test_zero_area_is_not_an_error() {
    let empty = RgbaImage::new(0, 5);
    let result = compare(&empty, &solid(5, 5, [0, 0, 0, 255]), DEFAULT_TOLERANCE);
    assert_eq!(result.total_pixels, 0);
    assert_eq!(result.difference_percentage, 0.0);
}

#[test]
fn test_output_dimensions() {
    let sizes = [((10, 20), (30, 5)), ((30, 5), (10, 20)), ((8, 8), (8, 8))];
    for ((w1, h1), (w2, h2)) in sizes {
        let a = pattern(w1, h1, 3);
        let b = pattern(w2, h2, 9);
        let (mw, mh) = (w1.max(w2), h1.max(h2));

        assert_eq!(render_compare(&a, &b, 50).dimensions(), (mw * 2 + 50, mh));
        assert_eq!(render_overlay_diff(&a, &b, 10).dimensions(), (mw, mh));
        assert_eq!(render_shifted(&a, &b, 240).dimensions(), (mw, mh));
    }
}

#[test]
fn test_shifted_overlap_renders_after_color() {
    let mut before = MockFramebuffer::new(20, 20);
    before.draw_rect(0, 0, 12, 12, [10, 10, 10, 255]);
    let mut after = MockFramebuffer::new(20, 20);
    after.draw_rect(8, 8, 12, 12, [200, 10, 10, 255]);

    let shifted = render_shifted(before.as_image(), after.as_image(), 240);
    assert_eq!(shifted.get_pixel(2, 2).0, [255, 0, 0, 255]);
    assert_eq!(shifted.get_pixel(10, 10).0, [0, 0, 255, 255]);
    assert_eq!(shifted.get_pixel(18, 18).0, [0, 0, 255, 255]);
    assert_eq!(shifted.get_pixel(18, 2).0, [255, 255, 255, 255]);
}

#[test]
fn test_overlay_marks_growth_and_shrinkage() {
    let before = solid(10, 4, [50, 50, 50, 255]);
    let after = solid(6, 8, [50, 50, 50, 255]);
    let diff = render_overlay_diff(&before, &after, 10);

    assert_eq!(diff.get_pixel(0, 0).0, [50, 50, 50, 255]);
    // Only before covers (8, 1); only after covers (1, 6)
    assert_eq!(diff.get_pixel(8, 1).0, [255, 100, 100, 150]);
    assert_eq!(diff.get_pixel(1, 6).0, [100, 255, 100, 150]);
    // Neither covers (8, 6)
    assert_eq!(diff.get_pixel(8, 6).0, [255, 255, 255, 255]);
}

#[test]
fn test_visualize_encodes_decodable_pngs() {
    let before = pattern(16, 12, 0);
    let after = pattern(20, 10, 5);
    let images = visualize(&before, &after, VisualizerOptions::default()).unwrap();

    let compare_img = decode_raster("compare", &images.compare).unwrap();
    assert_eq!(compare_img.dimensions(), (20 * 2 + 50, 12));
    assert_eq!(decode_raster("diff", &images.diff).unwrap().dimensions(), (20, 12));
    assert_eq!(decode_raster("shifted", &images.shifted).unwrap().dimensions(), (20, 12));
}
