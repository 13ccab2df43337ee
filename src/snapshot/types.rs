// Core types for page capture

use std::fmt;
use thiserror::Error;

/// Selector whose accessibility tree is captured
pub const ARIA_ROOT_SELECTOR: &str = "html";

/// One rendering pass of a route against one origin and device
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Full-page screenshot, encoded as returned by the renderer (PNG)
    pub screenshot: Vec<u8>,
    /// Accessibility tree snapshot of the document root
    pub accessibility_snapshot: String,
    /// Serialized document markup
    pub dom_snapshot: String,
}

/// Which route lifecycle hook was running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreLoad,
    AfterLoad,
    Cleanup,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::PreLoad => write!(f, "preLoad"),
            HookStage::AfterLoad => write!(f, "afterLoad"),
            HookStage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Result type for capture operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Error types for capture operations
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("{stage} hook failed: {message}")]
    Hook { stage: HookStage, message: String },

    #[error("Page action '{action}' failed: {message}")]
    Action { action: String, message: String },

    #[error("{kind} capture failed: {message}")]
    Snapshot { kind: &'static str, message: String },

    #[error("Render driver error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_error_names_stage() {
        let err = SnapshotError::Hook {
            stage: HookStage::AfterLoad,
            message: "button not found".to_string(),
        };
        assert_eq!(err.to_string(), "afterLoad hook failed: button not found");
    }
}
