//! Configuration management with environment variable support.
//!
//! Every value has a compile-time default that can be overridden through a
//! `PAGE_COMPARE_*` environment variable. The CLI layers its own flags on
//! top and hands the core a plain [`RunConfig`].
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PAGE_COMPARE_BEFORE_URL` | Origin rendered as "before" | `https://getbootstrap.com/docs/5.0` |
//! | `PAGE_COMPARE_AFTER_URL` | Origin rendered as "after" | `https://getbootstrap.com/docs/5.2` |
//! | `PAGE_COMPARE_OUTPUT_DIR` | Directory holding the archive | `./compares` |
//! | `PAGE_COMPARE_ARCHIVE_NAME` | Archive file name | `compare.zip` |
//! | `PAGE_COMPARE_TOLERANCE` | Per-channel tolerance | `10` |
//! | `PAGE_COMPARE_MARGIN` | Gap in the side-by-side image (px) | `50` |
//! | `PAGE_COMPARE_MAX_RETRIES` | Attempts per route | `3` |
//! | `PAGE_COMPARE_HEADLESS` | Run the browser headless | `true` |
//! | `PAGE_COMPARE_NODE` | JavaScript runtime hosting the driver | `node` |
//!
//! # Example
//!
//! ```bash
//! export PAGE_COMPARE_BEFORE_URL="https://staging.example.com"
//! export PAGE_COMPARE_AFTER_URL="https://preview.example.com"
//! export PAGE_COMPARE_MAX_RETRIES=5
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::device::DeviceProfile;
use crate::diff::{DEFAULT_MARGIN, DEFAULT_TOLERANCE, DEFAULT_WHITE_THRESHOLD, VisualizerOptions};
use crate::error::{CompareError, CompareResult};

// ============================================================================
// Default Values
// ============================================================================

pub const DEFAULT_BEFORE_URL: &str = "https://getbootstrap.com/docs/5.0";

pub const DEFAULT_AFTER_URL: &str = "https://getbootstrap.com/docs/5.2";

/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "./compares";

/// Default archive file name
pub const DEFAULT_ARCHIVE_NAME: &str = "compare.zip";

/// Default attempts per route
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_HEADLESS: bool = true;

/// Default JavaScript runtime for the Playwright driver
pub const DEFAULT_NODE: &str = "node";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_BEFORE_URL: &str = "PAGE_COMPARE_BEFORE_URL";
pub const ENV_AFTER_URL: &str = "PAGE_COMPARE_AFTER_URL";
pub const ENV_OUTPUT_DIR: &str = "PAGE_COMPARE_OUTPUT_DIR";
pub const ENV_ARCHIVE_NAME: &str = "PAGE_COMPARE_ARCHIVE_NAME";
pub const ENV_TOLERANCE: &str = "PAGE_COMPARE_TOLERANCE";
pub const ENV_MARGIN: &str = "PAGE_COMPARE_MARGIN";
pub const ENV_MAX_RETRIES: &str = "PAGE_COMPARE_MAX_RETRIES";
pub const ENV_HEADLESS: &str = "PAGE_COMPARE_HEADLESS";
pub const ENV_NODE: &str = "PAGE_COMPARE_NODE";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub origins: OriginSettings,
    pub output: OutputSettings,
    pub diff: DiffSettings,
    pub run: RunSettings,
}

/// The two origins being compared
#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub before_url: String,
    pub after_url: String,
}

/// Where the archive is written
#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub archive_name: String,
}

/// Pixel diff and visualization parameters
#[derive(Debug, Clone)]
pub struct DiffSettings {
    pub tolerance: u8,
    pub margin: u32,
    pub white_threshold: u8,
}

/// Orchestration and browser settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Attempts per route before the run aborts
    pub max_retries: u32,
    pub headless: bool,
    /// Executable used to host the Playwright driver
    pub node: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            origins: OriginSettings::from_env(),
            output: OutputSettings::from_env(),
            diff: DiffSettings::from_env(),
            run: RunSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            origins: OriginSettings::defaults(),
            output: OutputSettings::defaults(),
            diff: DiffSettings::defaults(),
            run: RunSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl OriginSettings {
    pub fn from_env() -> Self {
        Self {
            before_url: env::var(ENV_BEFORE_URL).unwrap_or_else(|_| DEFAULT_BEFORE_URL.to_string()),
            after_url: env::var(ENV_AFTER_URL).unwrap_or_else(|_| DEFAULT_AFTER_URL.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            before_url: DEFAULT_BEFORE_URL.to_string(),
            after_url: DEFAULT_AFTER_URL.to_string(),
        }
    }
}

impl OutputSettings {
    pub fn from_env() -> Self {
        Self {
            dir: env::var(ENV_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            archive_name: env::var(ENV_ARCHIVE_NAME)
                .unwrap_or_else(|_| DEFAULT_ARCHIVE_NAME.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
        }
    }

    /// Full path of the archive file
    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(&self.archive_name)
    }
}

impl DiffSettings {
    pub fn from_env() -> Self {
        Self {
            tolerance: parse_env(ENV_TOLERANCE).unwrap_or(DEFAULT_TOLERANCE),
            margin: parse_env(ENV_MARGIN).unwrap_or(DEFAULT_MARGIN),
            white_threshold: DEFAULT_WHITE_THRESHOLD,
        }
    }

    pub fn defaults() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            margin: DEFAULT_MARGIN,
            white_threshold: DEFAULT_WHITE_THRESHOLD,
        }
    }
}

impl RunSettings {
    pub fn from_env() -> Self {
        Self {
            max_retries: parse_env(ENV_MAX_RETRIES).unwrap_or(DEFAULT_MAX_RETRIES),
            headless: env::var(ENV_HEADLESS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(DEFAULT_HEADLESS),
            node: env::var(ENV_NODE).unwrap_or_else(|_| DEFAULT_NODE.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            headless: DEFAULT_HEADLESS,
            node: DEFAULT_NODE.to_string(),
        }
    }
}

// ============================================================================
// Run configuration handed to the orchestrator
// ============================================================================

/// Plain values the route orchestrator works from
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub before_origin: String,
    pub after_origin: String,
    pub tolerance: u8,
    pub margin: u32,
    pub white_threshold: u8,
    /// Attempts per route, at least 1
    pub max_retries: u32,
    pub desktop: DeviceProfile,
    /// `None` runs desktop only
    pub mobile: Option<DeviceProfile>,
}

impl RunConfig {
    /// Build from process configuration with both device profiles at their defaults
    pub fn from_config(config: &Config) -> Self {
        Self {
            before_origin: config.origins.before_url.clone(),
            after_origin: config.origins.after_url.clone(),
            tolerance: config.diff.tolerance,
            margin: config.diff.margin,
            white_threshold: config.diff.white_threshold,
            max_retries: config.run.max_retries,
            desktop: DeviceProfile::desktop(),
            mobile: Some(DeviceProfile::mobile()),
        }
    }

    /// Desktop-only run against the given origins, every other value defaulted
    pub fn new(before_origin: impl Into<String>, after_origin: impl Into<String>) -> Self {
        Self {
            before_origin: before_origin.into(),
            after_origin: after_origin.into(),
            mobile: None,
            ..Self::from_config(&Config::defaults())
        }
    }

    pub fn with_mobile(mut self, profile: DeviceProfile) -> Self {
        self.mobile = Some(profile);
        self
    }

    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts;
        self
    }

    /// Device profiles in processing order
    pub fn devices(&self) -> impl Iterator<Item = &DeviceProfile> {
        std::iter::once(&self.desktop).chain(self.mobile.as_ref())
    }

    pub fn visualizer_options(&self) -> VisualizerOptions {
        VisualizerOptions {
            margin: self.margin,
            tolerance: self.tolerance,
            white_threshold: self.white_threshold,
        }
    }

    pub fn validate(&self) -> CompareResult<()> {
        if self.max_retries == 0 {
            return Err(CompareError::InvalidConfig("max retries must be at least 1".into()));
        }
        if self.before_origin.trim().is_empty() || self.after_origin.trim().is_empty() {
            return Err(CompareError::InvalidConfig("before and after origins are required".into()));
        }
        for device in self.devices() {
            if device.viewport_width == 0 || device.viewport_height == 0 {
                return Err(CompareError::InvalidConfig(format!(
                    "{} viewport must be non-zero",
                    device.label()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Accepts `true/false`, `1/0`, `yes/no`, `on/off`
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.origins.before_url, DEFAULT_BEFORE_URL);
        assert_eq!(config.origins.after_url, DEFAULT_AFTER_URL);
        assert_eq!(config.diff.tolerance, 10);
        assert_eq!(config.diff.margin, 50);
        assert_eq!(config.run.max_retries, 3);
        assert!(config.run.headless);
        assert_eq!(config.output.archive_path(), PathBuf::from("./compares/compare.zip"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_run_config_devices() {
        let config = RunConfig::new("https://a.test", "https://b.test");
        assert_eq!(config.devices().count(), 1);

        let config = config.with_mobile(DeviceProfile::mobile());
        let labels: Vec<_> = config.devices().map(|d| d.label()).collect();
        assert_eq!(labels, vec!["Desktop", "Mobile"]);
    }

    #[test]
    fn test_run_config_validate() {
        let config = RunConfig::new("https://a.test", "https://b.test");
        assert!(config.validate().is_ok());

        let err = config.clone().max_retries(0).validate().unwrap_err();
        assert!(matches!(err, CompareError::InvalidConfig(_)));

        let mut bad_viewport = config.clone();
        bad_viewport.desktop = DeviceProfile::desktop().viewport(0, 720);
        assert!(bad_viewport.validate().is_err());

        let mut no_origin = config;
        no_origin.after_origin = " ".into();
        assert!(no_origin.validate().is_err());
    }
}
