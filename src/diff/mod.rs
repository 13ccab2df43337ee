pub mod engine;
pub mod types;
pub mod visualize;

pub use engine::{compare, pixels_differ};
pub use types::{DEFAULT_TOLERANCE, DiffError, DiffResult, PixelDiffResult, decode_raster, encode_png};
pub use visualize::{
    DEFAULT_MARGIN, DEFAULT_WHITE_THRESHOLD, DiffImages, VisualizerOptions, render_compare,
    render_overlay_diff, render_shifted, visualize,
};
