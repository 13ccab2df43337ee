//! Route orchestration: capture, diff and package every route in turn.
//!
//! Each route moves through an explicit state sequence:
//!
//! ```text
//! Pending -> Capturing -> Diffing -> Packaging -> Done
//!               ^            |
//!               |            v
//!               +------- Retrying -----> Aborted
//! ```
//!
//! Captures and diffs are kept in memory until the attempt succeeds, so a
//! failed attempt never leaves entries in the archive. Archive write
//! failures abort the run without a retry.

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveEntry, ArchiveSink};
use crate::config::RunConfig;
use crate::device::DeviceProfile;
use crate::diff::{DiffImages, DiffResult, PixelDiffResult, VisualizerOptions, compare, decode_raster, visualize};
use crate::error::{CompareError, CompareResult};
use crate::metadata::ScreenshotMetadata;
use crate::routes::{RouteDefinition, validate_routes};
use crate::snapshot::{
    CaptureResult, DriverOptions, PlaywrightSession, RenderPage, SnapshotResult, capture_page,
};

// ============================================================================
// Render sessions
// ============================================================================

/// Sessions rendering the before and after origin for one device
#[derive(Debug)]
pub struct SessionPair<P> {
    pub before: P,
    pub after: P,
}

/// The long-lived sessions of a run, reused for every route and attempt
#[derive(Debug)]
pub struct SessionSet<P> {
    pub desktop: SessionPair<P>,
    pub mobile: Option<SessionPair<P>>,
}

impl<P: RenderPage> SessionSet<P> {
    pub fn new(desktop: SessionPair<P>, mobile: Option<SessionPair<P>>) -> Self {
        Self { desktop, mobile }
    }

    /// Close every session, logging failures instead of returning them
    pub async fn close_all(&mut self) {
        let pairs = std::iter::once(&mut self.desktop).chain(self.mobile.as_mut());
        for pair in pairs {
            for page in [&mut pair.before, &mut pair.after] {
                match page.close().await {
                    Ok(()) => debug!("Closed session {}", page.slot()),
                    Err(e) => warn!("Failed to close session {}: {}", page.slot(), e),
                }
            }
        }
    }
}

/// Launch the Playwright sessions the run configuration asks for
pub async fn launch_sessions(
    options: &DriverOptions,
    config: &RunConfig,
) -> SnapshotResult<SessionSet<PlaywrightSession>> {
    let desktop = launch_pair(options, &config.desktop).await?;
    let mobile = match &config.mobile {
        Some(profile) => Some(launch_pair(options, profile).await?),
        None => None,
    };
    Ok(SessionSet::new(desktop, mobile))
}

async fn launch_pair(
    options: &DriverOptions,
    profile: &DeviceProfile,
) -> SnapshotResult<SessionPair<PlaywrightSession>> {
    let (before_slot, after_slot) = profile.kind.slots();
    let (before, after) = tokio::try_join!(
        PlaywrightSession::launch(before_slot, profile, options),
        PlaywrightSession::launch(after_slot, profile, options),
    )?;
    Ok(SessionPair { before, after })
}

// ============================================================================
// Run report
// ============================================================================

/// Diff outcome for one device of one route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device: String,
    pub difference_percentage: f64,
    pub different_pixels: u64,
    pub total_pixels: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteReport {
    pub name: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
    pub devices: Vec<DeviceReport>,
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub routes: Vec<RouteReport>,
    /// Archive entries written
    pub entries: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

struct DeviceCaptures {
    profile: DeviceProfile,
    before: CaptureResult,
    after: CaptureResult,
}

struct DeviceArtifacts {
    profile: DeviceProfile,
    before: CaptureResult,
    after: CaptureResult,
    diff: PixelDiffResult,
    images: DiffImages,
}

enum RouteState {
    Pending,
    Capturing { attempt: u32 },
    Diffing { attempt: u32, captures: Vec<DeviceCaptures> },
    Retrying { attempt: u32, error: CompareError },
    Packaging { attempts: u32, artifacts: Vec<DeviceArtifacts> },
    Done(RouteReport),
    Aborted(CompareError),
}

impl RouteState {
    fn name(&self) -> &'static str {
        match self {
            RouteState::Pending => "Pending",
            RouteState::Capturing { .. } => "Capturing",
            RouteState::Diffing { .. } => "Diffing",
            RouteState::Retrying { .. } => "Retrying",
            RouteState::Packaging { .. } => "Packaging",
            RouteState::Done(_) => "Done",
            RouteState::Aborted(_) => "Aborted",
        }
    }
}

/// Drives routes sequentially through capture, diff and packaging.
///
/// Borrows the sessions and the sink for the duration of the run; writes
/// go through the single `&mut` sink so they are never concurrent.
pub struct RouteOrchestrator<'a, P, S: ?Sized> {
    config: &'a RunConfig,
    sessions: &'a mut SessionSet<P>,
    sink: &'a mut S,
    entries: usize,
}

impl<'a, P, S> RouteOrchestrator<'a, P, S>
where
    P: RenderPage,
    S: ArchiveSink + ?Sized,
{
    pub fn new(config: &'a RunConfig, sessions: &'a mut SessionSet<P>, sink: &'a mut S) -> Self {
        Self {
            config,
            sessions,
            sink,
            entries: 0,
        }
    }

    /// Process every route in order, stopping at the first route that
    /// exhausts its attempts or fails to write.
    pub async fn run(&mut self, routes: &[RouteDefinition]) -> CompareResult<RunReport> {
        self.config.validate()?;
        validate_routes(routes)?;
        if self.config.mobile.is_some() != self.sessions.mobile.is_some() {
            return Err(CompareError::InvalidConfig(
                "mobile sessions must match the mobile device profile".into(),
            ));
        }

        let started_at = Utc::now();
        info!(
            "Comparing {} routes: {} -> {}",
            routes.len(),
            self.config.before_origin,
            self.config.after_origin
        );

        let mut reports = Vec::with_capacity(routes.len());
        for route in routes {
            reports.push(self.run_route(route).await?);
        }

        info!("Compared {} routes, {} entries written", reports.len(), self.entries);
        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            routes: reports,
            entries: self.entries,
        })
    }

    async fn run_route(&mut self, route: &RouteDefinition) -> CompareResult<RouteReport> {
        let max_attempts = self.config.max_retries;
        let mut state = RouteState::Pending;

        loop {
            debug!("Route '{}': {}", route.name, state.name());
            state = match state {
                RouteState::Pending => RouteState::Capturing { attempt: 1 },

                RouteState::Capturing { attempt } => {
                    info!("Route '{}': capturing (attempt {}/{})", route.name, attempt, max_attempts);
                    match self.capture_all(route).await {
                        Ok(captures) => RouteState::Diffing { attempt, captures },
                        Err(e) => RouteState::Retrying {
                            attempt,
                            error: e.into(),
                        },
                    }
                }

                RouteState::Diffing { attempt, captures } => match self.analyze(captures).await {
                    Ok(artifacts) => RouteState::Packaging {
                        attempts: attempt,
                        artifacts,
                    },
                    Err(error) => RouteState::Retrying { attempt, error },
                },

                RouteState::Retrying { attempt, error } => {
                    warn!(
                        "Route '{}' attempt {}/{} failed: {}",
                        route.name, attempt, max_attempts, error
                    );
                    if attempt >= max_attempts {
                        RouteState::Aborted(CompareError::RetriesExhausted {
                            route: route.name.clone(),
                            attempts: attempt,
                            source: Box::new(error),
                        })
                    } else {
                        RouteState::Capturing { attempt: attempt + 1 }
                    }
                }

                RouteState::Packaging { attempts, artifacts } => {
                    match self.package(route, &artifacts) {
                        Ok(()) => RouteState::Done(RouteReport {
                            name: route.name.clone(),
                            attempts,
                            devices: artifacts.iter().map(device_report).collect(),
                        }),
                        Err(e) => RouteState::Aborted(e),
                    }
                }

                RouteState::Done(report) => {
                    info!("Route '{}' done after {} attempt(s)", route.name, report.attempts);
                    return Ok(report);
                }

                RouteState::Aborted(e) => {
                    error!("Route '{}' aborted: {}", route.name, e);
                    return Err(e);
                }
            };
        }
    }

    /// All four captures, issued concurrently.
    ///
    /// Every capture runs to completion (cleanup hooks included) even when
    /// a sibling fails; the first failure is reported afterwards.
    async fn capture_all(&mut self, route: &RouteDefinition) -> SnapshotResult<Vec<DeviceCaptures>> {
        let config = self.config;
        let SessionSet { desktop, mobile } = &mut *self.sessions;

        let desktop_captures = capture_pair(desktop, config, route, &config.desktop);
        let mobile_captures = async {
            match (mobile.as_mut(), config.mobile.as_ref()) {
                (Some(pair), Some(profile)) => capture_pair(pair, config, route, profile).await.map(Some),
                _ => Ok(None),
            }
        };

        let (desktop, mobile) = tokio::join!(desktop_captures, mobile_captures);
        let (desktop, mobile) = first_error(desktop, mobile)?;
        Ok(std::iter::once(desktop).chain(mobile).collect())
    }

    /// Diff and visualize each device pair on the blocking pool
    async fn analyze(&self, captures: Vec<DeviceCaptures>) -> CompareResult<Vec<DeviceArtifacts>> {
        let options = self.config.visualizer_options();
        let tolerance = self.config.tolerance;

        let handles: Vec<_> = captures
            .into_iter()
            .map(|captures| tokio::task::spawn_blocking(move || analyze_pair(captures, tolerance, options)))
            .collect();

        let mut artifacts = Vec::with_capacity(handles.len());
        for handle in handles {
            let device = handle.await??;
            info!(
                "{}: {}% different ({} of {} pixels)",
                device.profile.label(),
                device.diff.rounded_percentage(),
                device.diff.different_pixels,
                device.diff.total_pixels
            );
            artifacts.push(device);
        }
        Ok(artifacts)
    }

    /// Build every entry for the route, then write them in order
    fn package(&mut self, route: &RouteDefinition, artifacts: &[DeviceArtifacts]) -> CompareResult<()> {
        let mut entries = Vec::new();
        for device in artifacts {
            let metadata = ScreenshotMetadata::new(
                route,
                &self.config.before_origin,
                &self.config.after_origin,
                &device.profile,
                &device.diff,
                Utc::now(),
            );
            entries.extend(route_entries(&route.name, device, metadata.to_json()?));
        }

        for entry in &entries {
            self.sink.write_entry(entry)?;
            debug!("Wrote {}", entry.key());
        }
        self.entries += entries.len();
        Ok(())
    }
}

async fn capture_pair<P: RenderPage>(
    pair: &mut SessionPair<P>,
    config: &RunConfig,
    route: &RouteDefinition,
    profile: &DeviceProfile,
) -> SnapshotResult<DeviceCaptures> {
    let SessionPair { before, after } = pair;
    let (before, after) = tokio::join!(
        capture_page(before, &config.before_origin, route),
        capture_page(after, &config.after_origin, route),
    );
    let (before, after) = first_error(before, after)?;
    Ok(DeviceCaptures {
        profile: profile.clone(),
        before,
        after,
    })
}

/// Combine two completed results, keeping the first error
fn first_error<A, B, E: std::fmt::Display>(a: Result<A, E>, b: Result<B, E>) -> Result<(A, B), E> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(sibling)) => {
            debug!("Sibling capture also failed: {}", sibling);
            Err(e)
        }
    }
}

fn analyze_pair(
    captures: DeviceCaptures,
    tolerance: u8,
    options: VisualizerOptions,
) -> DiffResult<DeviceArtifacts> {
    let before: RgbaImage = decode_raster("before screenshot", &captures.before.screenshot)?;
    let after: RgbaImage = decode_raster("after screenshot", &captures.after.screenshot)?;
    let diff = compare(&before, &after, tolerance);
    let images = visualize(&before, &after, options)?;

    Ok(DeviceArtifacts {
        profile: captures.profile,
        before: captures.before,
        after: captures.after,
        diff,
        images,
    })
}

/// Entries for one device, in archive order
fn route_entries(folder: &str, device: &DeviceArtifacts, metadata_json: String) -> Vec<ArchiveEntry> {
    let prefix = device.profile.kind.archive_prefix();
    let name = |file: &str| format!("{}{}", prefix, file);

    vec![
        ArchiveEntry::text(folder, name("before-aria.txt"), device.before.accessibility_snapshot.clone()),
        ArchiveEntry::text(folder, name("after-aria.txt"), device.after.accessibility_snapshot.clone()),
        ArchiveEntry::text(folder, name("before-dom.html"), device.before.dom_snapshot.clone()),
        ArchiveEntry::text(folder, name("after-dom.html"), device.after.dom_snapshot.clone()),
        ArchiveEntry::bytes(folder, name("before.png"), device.before.screenshot.clone()),
        ArchiveEntry::bytes(folder, name("after.png"), device.after.screenshot.clone()),
        ArchiveEntry::bytes(folder, name("compare.png"), device.images.compare.clone()),
        ArchiveEntry::bytes(folder, name("diff.png"), device.images.diff.clone()),
        ArchiveEntry::bytes(folder, name("diff-shifted.png"), device.images.shifted.clone()),
        ArchiveEntry::text(folder, name("metadata.json"), metadata_json),
    ]
}

fn device_report(device: &DeviceArtifacts) -> DeviceReport {
    DeviceReport {
        device: device.profile.label().to_string(),
        difference_percentage: device.diff.rounded_percentage(),
        different_pixels: device.diff.different_pixels,
        total_pixels: device.diff.total_pixels,
    }
}

/// Run all routes, then close the sessions and finish the sink whatever
/// the outcome. The run error wins over a finish error.
pub async fn run_comparison<P, S>(
    config: &RunConfig,
    routes: &[RouteDefinition],
    sessions: &mut SessionSet<P>,
    sink: &mut S,
) -> CompareResult<RunReport>
where
    P: RenderPage,
    S: ArchiveSink + ?Sized,
{
    let result = RouteOrchestrator::new(config, sessions, sink).run(routes).await;

    sessions.close_all().await;
    let finished = sink.finish();

    match (result, finished) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(finish_err)) => {
            warn!("Failed to finish archive after error: {}", finish_err);
            Err(e)
        }
    }
}
