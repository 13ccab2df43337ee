//! Page Compare - visual regression between two web origins.
//!
//! This crate provides:
//! - A channel-tolerant pixel diff engine and three diff visualizations
//! - Page capture over a `RenderPage` session (Playwright, or `MockPage` for tests)
//! - Route orchestration with concurrent captures and per-route retries
//! - Archive sinks (zip file or in-memory) for the per-route artifacts
//!
//! # Example
//!
//! ```rust,no_run
//! use page_compare::{
//!     DriverOptions, RunConfig, ZipArchiveSink, default_routes, launch_sessions, run_comparison,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::new("https://a.test", "https://b.test");
//! let mut sessions = launch_sessions(&DriverOptions::default(), &config).await?;
//! let mut sink = ZipArchiveSink::create("compares/compare.zip")?;
//! let report = run_comparison(&config, &default_routes(), &mut sessions, &mut sink).await?;
//! println!("{} routes compared", report.routes.len());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod device;
pub mod diff;
pub mod error;
pub mod metadata;
pub mod routes;
pub mod runner;
pub mod snapshot;

// Re-export orchestration types
pub use runner::{
    DeviceReport, RouteOrchestrator, RouteReport, RunReport, SessionPair, SessionSet,
    launch_sessions, run_comparison,
};

pub use config::{Config, RunConfig};
pub use device::{DeviceKind, DeviceProfile, parse_viewport};
pub use error::{CompareError, CompareResult};
pub use metadata::ScreenshotMetadata;
pub use routes::{PageAction, RouteDefinition, default_routes, load_routes, parse_routes};

// Re-export diff engine and visualizations
pub use diff::{DiffError, DiffImages, PixelDiffResult, VisualizerOptions, compare, visualize};

// Re-export archive sinks
pub use archive::{ArchiveContent, ArchiveEntry, ArchiveError, ArchiveSink, MemoryArchive, ZipArchiveSink};

// Re-export capture types and backends
pub use snapshot::{
    CaptureResult, DriverOptions, Hook, MockFramebuffer, MockPage, MockPageContent,
    PlaywrightSession, RenderPage, SnapshotError, SnapshotResult, capture_page,
};
