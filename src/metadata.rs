// Per-device metadata written next to the images of a route

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceProfile;
use crate::diff::PixelDiffResult;
use crate::routes::RouteDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

/// Description of one (route, device) comparison, stored as `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScreenshotMetadata {
    pub page_name: String,
    pub before_url: String,
    pub after_url: String,
    #[serde(with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub device_type: String,
    pub viewport: ViewportSize,
    pub user_agent: String,
    /// Rounded to the nearest integer, written without a fraction (`12`)
    #[serde(serialize_with = "whole_number")]
    pub difference_percentage: f64,
    pub total_pixels: u64,
    pub different_pixels: u64,
}

impl ScreenshotMetadata {
    pub fn new(
        route: &RouteDefinition,
        before_origin: &str,
        after_origin: &str,
        device: &DeviceProfile,
        diff: &PixelDiffResult,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            page_name: route.name.clone(),
            before_url: route.url(before_origin),
            after_url: route.url(after_origin),
            timestamp,
            device_type: device.label().to_string(),
            viewport: ViewportSize {
                width: device.viewport_width,
                height: device.viewport_height,
            },
            user_agent: device.user_agent.clone(),
            difference_percentage: diff.rounded_percentage(),
            total_pixels: diff.total_pixels,
            different_pixels: diff.different_pixels,
        }
    }

    /// Indented JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn whole_number<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() <= i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

mod rfc3339 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_metadata_json_layout() {
        let route = RouteDefinition::new("Home", "/home");
        let diff = PixelDiffResult::new(125, 1000);
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let meta = ScreenshotMetadata::new(
            &route,
            "https://a.test",
            "https://b.test",
            &DeviceProfile::desktop(),
            &diff,
            timestamp,
        );

        let text = meta.to_json().unwrap();
        assert!(text.contains("\"DifferencePercentage\": 12,"));
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["PageName"], "Home");
        assert_eq!(json["BeforeUrl"], "https://a.test/home");
        assert_eq!(json["AfterUrl"], "https://b.test/home");
        assert_eq!(json["Timestamp"], "2024-05-01T12:30:00.000Z");
        assert_eq!(json["DeviceType"], "Desktop");
        assert_eq!(json["Viewport"]["Width"], 1280);
        assert_eq!(json["Viewport"]["Height"], 720);
        // Ties round to even
        assert_eq!(json["DifferencePercentage"], 12);
        assert_eq!(json["TotalPixels"], 1000);
        assert_eq!(json["DifferentPixels"], 125);

        let back: ScreenshotMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
