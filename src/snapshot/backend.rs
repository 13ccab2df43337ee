//! Render-session abstraction and page capture.
//!
//! This module provides:
//! - `RenderPage`, the capability surface a browser session must offer
//! - `Hook`, the route lifecycle action run against a page
//! - `capture_page`, the navigate/hook/snapshot sequence for one capture
//! - `MockPage` and `MockFramebuffer` for testing without a browser

use async_trait::async_trait;
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use tracing::debug;

use super::types::{ARIA_ROOT_SELECTOR, CaptureResult, HookStage, SnapshotError, SnapshotResult};
use crate::diff::{decode_raster, encode_png};
use crate::routes::RouteDefinition;

/// A single long-lived rendering context (one browser page).
///
/// Implementations keep state between calls: navigating reuses the same
/// page, cookies and storage, so a retry sees whatever a failed attempt
/// left behind.
#[async_trait]
pub trait RenderPage: Send {
    /// Session slot name used in logs (e.g. "desktop-before")
    fn slot(&self) -> &str;

    /// Navigate to an absolute URL
    async fn navigate(&mut self, url: &str) -> SnapshotResult<()>;

    /// Wait until the network has been idle
    async fn wait_for_network_idle(&mut self) -> SnapshotResult<()>;

    /// Evaluate a JavaScript expression in the page
    async fn evaluate(&mut self, script: &str) -> SnapshotResult<serde_json::Value>;

    /// Click the first element matching a selector
    async fn click(&mut self, selector: &str) -> SnapshotResult<()>;

    /// Fill an input matching a selector
    async fn fill(&mut self, selector: &str, value: &str) -> SnapshotResult<()>;

    /// Wait for an element matching a selector to appear
    async fn wait_for_selector(&mut self, selector: &str) -> SnapshotResult<()>;

    /// Full-page screenshot as encoded image bytes
    async fn screenshot_full_page(&mut self) -> SnapshotResult<Vec<u8>>;

    /// Accessibility tree snapshot rooted at a selector
    async fn accessibility_snapshot(&mut self, root_selector: &str) -> SnapshotResult<String>;

    /// Serialized markup of the current document
    async fn serialized_content(&mut self) -> SnapshotResult<String>;

    /// Release the session
    async fn close(&mut self) -> SnapshotResult<()> {
        Ok(())
    }
}

/// Route lifecycle action (preLoad, afterLoad or cleanup)
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, page: &mut dyn RenderPage) -> SnapshotResult<()>;
}

async fn run_hook(
    hook: &dyn Hook,
    stage: HookStage,
    page: &mut dyn RenderPage,
) -> SnapshotResult<()> {
    debug!("Running {} hook on {}", stage, page.slot());
    hook.run(page).await.map_err(|err| match err {
        SnapshotError::Hook { .. } => err,
        other => SnapshotError::Hook {
            stage,
            message: other.to_string(),
        },
    })
}

/// Capture one route against one origin on the given page.
///
/// Sequence: navigate; with a preLoad hook, wait for idle, run it and
/// navigate again; wait for idle; run afterLoad; take the screenshot,
/// accessibility and DOM snapshots; run cleanup. Any failure is returned
/// as-is and the remaining steps are skipped.
pub async fn capture_page<P: RenderPage>(
    page: &mut P,
    origin: &str,
    route: &RouteDefinition,
) -> SnapshotResult<CaptureResult> {
    let url = route.url(origin);
    debug!("Capturing '{}' on {} ({})", route.name, page.slot(), url);

    page.navigate(&url).await?;
    if let Some(hook) = &route.pre_load {
        page.wait_for_network_idle().await?;
        run_hook(hook.as_ref(), HookStage::PreLoad, page).await?;
        page.navigate(&url).await?;
    }
    page.wait_for_network_idle().await?;

    if let Some(hook) = &route.after_load {
        run_hook(hook.as_ref(), HookStage::AfterLoad, page).await?;
    }

    let screenshot = page.screenshot_full_page().await?;
    let accessibility_snapshot = page.accessibility_snapshot(ARIA_ROOT_SELECTOR).await?;
    let dom_snapshot = page.serialized_content().await?;

    if let Some(hook) = &route.cleanup {
        run_hook(hook.as_ref(), HookStage::Cleanup, page).await?;
    }

    Ok(CaptureResult {
        screenshot,
        accessibility_snapshot,
        dom_snapshot,
    })
}

/// A virtual framebuffer for building screenshot fixtures
///
/// Provides a small drawing API:
/// - `fill()` - Fill entire buffer with a color
/// - `draw_rect()` - Draw a filled rectangle
/// - `draw_text()` - Draw text using font8x8 glyphs
/// - `get_pixel()` / `set_pixel()` - Direct pixel access
#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    image: RgbaImage,
}

impl MockFramebuffer {
    /// Create a blank (opaque white) framebuffer
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_color(width, height, [255, 255, 255, 255])
    }

    /// Create a framebuffer initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba(color)),
        }
    }

    /// Load a framebuffer from encoded image bytes
    pub fn from_png_bytes(data: &[u8]) -> SnapshotResult<Self> {
        let image = decode_raster("framebuffer", data).map_err(|e| SnapshotError::Snapshot {
            kind: "framebuffer",
            message: e.to_string(),
        })?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Fill the entire framebuffer with a color
    pub fn fill(&mut self, color: [u8; 4]) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba(color);
        }
    }

    /// Draw a filled rectangle, clipped to the buffer
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) {
        for py in y..y.saturating_add(h).min(self.height()) {
            for px in x..x.saturating_add(w).min(self.width()) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using font8x8 glyphs
    ///
    /// Each character is 8x8 pixels. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 4], bg: [u8; 4]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width() {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 4], bg: [u8; 4]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            for bit in 0..8 {
                // font8x8 stores LSB as leftmost pixel
                let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                self.set_pixel(x + bit, py, color);
            }
        }
    }

    /// Get the color of a pixel (transparent black when out of bounds)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image
            .get_pixel_checked(x, y)
            .map(|p| p.0)
            .unwrap_or([0, 0, 0, 0])
    }

    /// Set the color of a pixel; out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if let Some(pixel) = self.image.get_pixel_mut_checked(x, y) {
            *pixel = Rgba(color);
        }
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> SnapshotResult<Vec<u8>> {
        encode_png(&self.image).map_err(|e| SnapshotError::Snapshot {
            kind: "screenshot",
            message: e.to_string(),
        })
    }
}

/// What a `MockPage` serves for one URL
#[derive(Debug, Clone)]
pub struct MockPageContent {
    pub screenshot: Vec<u8>,
    pub aria: String,
    pub dom: String,
}

impl MockPageContent {
    /// Build page content from a framebuffer rendering
    pub fn from_framebuffer(fb: &MockFramebuffer, aria: &str, dom: &str) -> SnapshotResult<Self> {
        Ok(Self {
            screenshot: fb.to_png()?,
            aria: aria.to_string(),
            dom: dom.to_string(),
        })
    }
}

/// Scripted in-memory render session
///
/// Serves registered URLs, records every call in `history()`, and can be
/// told to fail the next N navigations.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    slot: String,
    pages: HashMap<String, MockPageContent>,
    current_url: Option<String>,
    navigation_failures: usize,
    history: Vec<String>,
}

impl MockPage {
    pub fn new(slot: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            ..Default::default()
        }
    }

    /// Register the content served for a URL
    pub fn with_page(mut self, url: impl Into<String>, content: MockPageContent) -> Self {
        self.pages.insert(url.into(), content);
        self
    }

    /// Make the next `count` navigations fail
    pub fn fail_next_navigations(mut self, count: usize) -> Self {
        self.navigation_failures = count;
        self
    }

    /// Calls received so far, e.g. `navigate https://a.test/home`
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    fn current(&self, kind: &'static str) -> SnapshotResult<&MockPageContent> {
        self.current_url
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .ok_or_else(|| SnapshotError::Snapshot {
                kind,
                message: format!("{} has no page loaded", self.slot),
            })
    }
}

#[async_trait]
impl RenderPage for MockPage {
    fn slot(&self) -> &str {
        &self.slot
    }

    async fn navigate(&mut self, url: &str) -> SnapshotResult<()> {
        self.history.push(format!("navigate {}", url));
        if self.navigation_failures > 0 {
            self.navigation_failures -= 1;
            return Err(SnapshotError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        if !self.pages.contains_key(url) {
            return Err(SnapshotError::Navigation {
                url: url.to_string(),
                message: "404 Not Found".to_string(),
            });
        }
        self.current_url = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_network_idle(&mut self) -> SnapshotResult<()> {
        self.history.push("wait_for_network_idle".to_string());
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> SnapshotResult<serde_json::Value> {
        self.history.push(format!("evaluate {}", script));
        Ok(serde_json::Value::Null)
    }

    async fn click(&mut self, selector: &str) -> SnapshotResult<()> {
        self.history.push(format!("click {}", selector));
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> SnapshotResult<()> {
        self.history.push(format!("fill {} {}", selector, value));
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str) -> SnapshotResult<()> {
        self.history.push(format!("wait_for_selector {}", selector));
        Ok(())
    }

    async fn screenshot_full_page(&mut self) -> SnapshotResult<Vec<u8>> {
        self.history.push("screenshot".to_string());
        Ok(self.current("screenshot")?.screenshot.clone())
    }

    async fn accessibility_snapshot(&mut self, root_selector: &str) -> SnapshotResult<String> {
        self.history.push(format!("aria {}", root_selector));
        Ok(self.current("accessibility")?.aria.clone())
    }

    async fn serialized_content(&mut self) -> SnapshotResult<String> {
        self.history.push("content".to_string());
        Ok(self.current("dom")?.dom.clone())
    }

    async fn close(&mut self) -> SnapshotResult<()> {
        self.history.push("close".to_string());
        self.current_url = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "https://a.test/home";

    fn page() -> MockPage {
        let fb = MockFramebuffer::with_color(16, 8, [200, 10, 10, 255]);
        let content = MockPageContent::from_framebuffer(&fb, "- document", "<html></html>").unwrap();
        MockPage::new("desktop-before").with_page(URL, content)
    }

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl Hook for CountingHook {
        async fn run(&self, page: &mut dyn RenderPage) -> SnapshotResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            page.click("#accept-cookies").await
        }
    }

    struct FailingHook;

    #[async_trait]
    impl Hook for FailingHook {
        async fn run(&self, _page: &mut dyn RenderPage) -> SnapshotResult<()> {
            Err(SnapshotError::Action {
                action: "click #missing".to_string(),
                message: "timeout".to_string(),
            })
        }
    }

    #[test]
    fn test_mock_framebuffer_draw_rect() {
        let mut fb = MockFramebuffer::with_color(20, 20, [0, 0, 0, 255]);
        fb.draw_rect(5, 5, 10, 10, [255, 0, 0, 255]);

        assert_eq!(fb.get_pixel(4, 4), [0, 0, 0, 255]);
        assert_eq!(fb.get_pixel(5, 5), [255, 0, 0, 255]);
        assert_eq!(fb.get_pixel(14, 14), [255, 0, 0, 255]);
        assert_eq!(fb.get_pixel(15, 15), [0, 0, 0, 255]);
        // Clipped, not panicking
        fb.draw_rect(18, 18, 10, 10, [0, 255, 0, 255]);
        assert_eq!(fb.get_pixel(19, 19), [0, 255, 0, 255]);
        assert_eq!(fb.get_pixel(25, 25), [0, 0, 0, 0]);

        fb.fill([9, 9, 9, 255]);
        assert!(fb.as_image().pixels().all(|p| p.0 == [9, 9, 9, 255]));
    }

    #[test]
    fn test_mock_framebuffer_draw_text() {
        let mut fb = MockFramebuffer::new(80, 16);
        fb.draw_text(0, 0, "Hi", [0, 0, 0, 255], [255, 255, 255, 255]);

        let has_ink = (0..8).any(|y| (0..8).any(|x| fb.get_pixel(x, y) == [0, 0, 0, 255]));
        assert!(has_ink, "Character 'H' should have some foreground pixels");
    }

    #[test]
    fn test_mock_framebuffer_png_roundtrip() {
        let mut fb = MockFramebuffer::with_color(32, 32, [100, 150, 200, 255]);
        fb.draw_rect(8, 8, 16, 16, [255, 0, 0, 128]);

        let png = fb.to_png().unwrap();
        let fb2 = MockFramebuffer::from_png_bytes(&png).unwrap();
        assert_eq!(fb2.width(), 32);
        assert_eq!(fb2.get_pixel(0, 0), [100, 150, 200, 255]);
        assert_eq!(fb2.get_pixel(10, 10), [255, 0, 0, 128]);
    }

    #[tokio::test]
    async fn test_capture_without_hooks() {
        let mut page = page();
        let route = RouteDefinition::new("Home", "/home");

        let capture = capture_page(&mut page, "https://a.test", &route).await.unwrap();
        assert_eq!(page.current_url(), Some(URL));
        assert_eq!(capture.accessibility_snapshot, "- document");
        assert_eq!(capture.dom_snapshot, "<html></html>");
        assert_eq!(&capture.screenshot[0..4], &[0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(
            page.history(),
            &[
                "navigate https://a.test/home",
                "wait_for_network_idle",
                "screenshot",
                "aria html",
                "content",
            ]
        );
    }

    #[tokio::test]
    async fn test_capture_hook_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut page = page();
        let route = RouteDefinition::new("Home", "/home")
            .pre_load(Arc::new(CountingHook(calls.clone())))
            .after_load(Arc::new(CountingHook(calls.clone())))
            .cleanup(Arc::new(CountingHook(calls.clone())));

        capture_page(&mut page, "https://a.test", &route).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            page.history(),
            &[
                "navigate https://a.test/home",
                "wait_for_network_idle",
                "click #accept-cookies",
                "navigate https://a.test/home",
                "wait_for_network_idle",
                "click #accept-cookies",
                "screenshot",
                "aria html",
                "content",
                "click #accept-cookies",
            ]
        );
    }

    #[tokio::test]
    async fn test_capture_hook_failure_propagates() {
        let mut page = page();
        let route = RouteDefinition::new("Home", "/home").after_load(Arc::new(FailingHook));

        let err = capture_page(&mut page, "https://a.test", &route).await.unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Hook {
                stage: HookStage::AfterLoad,
                ..
            }
        ));
        assert!(!page.history().iter().any(|call| call == "screenshot"));
    }

    #[tokio::test]
    async fn test_capture_navigation_failure() {
        let mut page = page().fail_next_navigations(1);
        let route = RouteDefinition::new("Home", "/home");

        let err = capture_page(&mut page, "https://a.test", &route).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Navigation { .. }));

        // Same session, next attempt goes through
        assert!(capture_page(&mut page, "https://a.test", &route).await.is_ok());
    }
}
