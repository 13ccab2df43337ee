pub mod backend;
pub mod playwright;
pub mod types;

pub use types::{CaptureResult, HookStage, SnapshotError, SnapshotResult};
pub use backend::{Hook, MockFramebuffer, MockPage, MockPageContent, RenderPage, capture_page};
pub use playwright::{DriverOptions, PlaywrightSession, install_browsers};
