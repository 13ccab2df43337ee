//! Device profiles a route is rendered with.

use serde::{Deserialize, Serialize};

pub const DESKTOP_WIDTH: u32 = 1280;
pub const DESKTOP_HEIGHT: u32 = 720;
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.159 Safari/537.36";

pub const MOBILE_WIDTH: u32 = 375;
pub const MOBILE_HEIGHT: u32 = 800;
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";

/// Archive file prefix for mobile artifacts
pub const MOBILE_PREFIX: &str = "mobile_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Desktop,
    Mobile,
}

impl DeviceKind {
    /// Label written to metadata ("Desktop" / "Mobile")
    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::Desktop => "Desktop",
            DeviceKind::Mobile => "Mobile",
        }
    }

    /// Prefix prepended to every archive file name
    pub fn archive_prefix(&self) -> &'static str {
        match self {
            DeviceKind::Desktop => "",
            DeviceKind::Mobile => MOBILE_PREFIX,
        }
    }

    /// Session slot names for the before and after origin
    pub fn slots(&self) -> (&'static str, &'static str) {
        match self {
            DeviceKind::Desktop => ("desktop-before", "desktop-after"),
            DeviceKind::Mobile => ("mobile-before", "mobile-after"),
        }
    }
}

/// Viewport and user agent used for one device class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub kind: DeviceKind,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
}

impl DeviceProfile {
    pub fn desktop() -> Self {
        Self {
            kind: DeviceKind::Desktop,
            viewport_width: DESKTOP_WIDTH,
            viewport_height: DESKTOP_HEIGHT,
            user_agent: DESKTOP_USER_AGENT.to_string(),
        }
    }

    pub fn mobile() -> Self {
        Self {
            kind: DeviceKind::Mobile,
            viewport_width: MOBILE_WIDTH,
            viewport_height: MOBILE_HEIGHT,
            user_agent: MOBILE_USER_AGENT.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    /// Override the viewport size
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Parse a viewport size written as `WxH` (e.g. `1280x720`)
pub fn parse_viewport(size: &str) -> Option<(u32, u32)> {
    let lower = size.trim().to_lowercase();
    let (w, h) = lower.split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        let desktop = DeviceProfile::desktop();
        assert_eq!((desktop.viewport_width, desktop.viewport_height), (1280, 720));
        assert_eq!(desktop.label(), "Desktop");
        assert_eq!(desktop.kind.archive_prefix(), "");

        let mobile = DeviceProfile::mobile();
        assert_eq!((mobile.viewport_width, mobile.viewport_height), (375, 800));
        assert_eq!(mobile.label(), "Mobile");
        assert_eq!(mobile.kind.archive_prefix(), "mobile_");
    }

    #[test]
    fn test_parse_viewport() {
        assert_eq!(parse_viewport("1280x720"), Some((1280, 720)));
        assert_eq!(parse_viewport("375X800"), Some((375, 800)));
        assert_eq!(parse_viewport("0x800"), None);
        assert_eq!(parse_viewport("1280"), None);
        assert_eq!(parse_viewport("wide"), None);
    }
}
