//! Route definitions and their lifecycle hooks.
//!
//! Routes are usually loaded from a JSON file:
//!
//! ```json
//! [
//!   { "name": "Home", "path": "/" },
//!   {
//!     "name": "Alerts",
//!     "path": "/components/alerts",
//!     "preLoad": [{ "action": "evaluate", "script": "localStorage.setItem('theme', 'dark')" }],
//!     "afterLoad": [{ "action": "click", "selector": "#accept-cookies" }]
//!   }
//! ]
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CompareError, CompareResult};
use crate::snapshot::{Hook, RenderPage, SnapshotResult};

/// A page to compare, identified by `name`
#[derive(Clone)]
pub struct RouteDefinition {
    /// Human-readable name, also the archive folder
    pub name: String,
    /// Suffix appended to each origin
    pub path: String,
    /// Runs after the first load; the page is then loaded again
    pub pre_load: Option<Arc<dyn Hook>>,
    /// Runs once the page is idle, before snapshots are taken
    pub after_load: Option<Arc<dyn Hook>>,
    /// Runs after snapshots are taken
    pub cleanup: Option<Arc<dyn Hook>>,
}

impl RouteDefinition {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            pre_load: None,
            after_load: None,
            cleanup: None,
        }
    }

    pub fn pre_load(mut self, hook: Arc<dyn Hook>) -> Self {
        self.pre_load = Some(hook);
        self
    }

    pub fn after_load(mut self, hook: Arc<dyn Hook>) -> Self {
        self.after_load = Some(hook);
        self
    }

    pub fn cleanup(mut self, hook: Arc<dyn Hook>) -> Self {
        self.cleanup = Some(hook);
        self
    }

    /// Full URL of this route on an origin
    pub fn url(&self, origin: &str) -> String {
        format!("{}{}", origin, self.path)
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("pre_load", &self.pre_load.is_some())
            .field("after_load", &self.after_load.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Declarative page action usable as a hook step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageAction {
    /// Evaluate a JavaScript expression
    Evaluate { script: String },

    /// Click an element
    Click { selector: String },

    /// Fill an input
    Fill { selector: String, value: String },

    /// Wait for an element to appear
    WaitForSelector { selector: String },

    /// Wait for the network to go idle
    WaitForNetworkIdle,

    /// Pause for a fixed time
    Sleep { ms: u64 },
}

/// Hook that runs a list of page actions in order
#[derive(Debug, Clone)]
pub struct ActionHook(pub Vec<PageAction>);

#[async_trait]
impl Hook for ActionHook {
    async fn run(&self, page: &mut dyn RenderPage) -> SnapshotResult<()> {
        for action in &self.0 {
            match action {
                PageAction::Evaluate { script } => {
                    page.evaluate(script).await?;
                }
                PageAction::Click { selector } => page.click(selector).await?,
                PageAction::Fill { selector, value } => page.fill(selector, value).await?,
                PageAction::WaitForSelector { selector } => page.wait_for_selector(selector).await?,
                PageAction::WaitForNetworkIdle => page.wait_for_network_idle().await?,
                PageAction::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            }
        }
        Ok(())
    }
}

/// Serialized form of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_load: Vec<PageAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_load: Vec<PageAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup: Vec<PageAction>,
}

fn action_hook(actions: Vec<PageAction>) -> Option<Arc<dyn Hook>> {
    if actions.is_empty() {
        None
    } else {
        Some(Arc::new(ActionHook(actions)))
    }
}

impl From<RouteSpec> for RouteDefinition {
    fn from(spec: RouteSpec) -> Self {
        Self {
            name: spec.name,
            path: spec.path,
            pre_load: action_hook(spec.pre_load),
            after_load: action_hook(spec.after_load),
            cleanup: action_hook(spec.cleanup),
        }
    }
}

/// Parse routes from JSON text
pub fn parse_routes(json: &str) -> CompareResult<Vec<RouteDefinition>> {
    let specs: Vec<RouteSpec> = serde_json::from_str(json)?;
    let routes: Vec<RouteDefinition> = specs.into_iter().map(RouteDefinition::from).collect();
    validate_routes(&routes)?;
    Ok(routes)
}

/// Load routes from a JSON file
pub fn load_routes(path: &Path) -> CompareResult<Vec<RouteDefinition>> {
    let json = std::fs::read_to_string(path)?;
    parse_routes(&json)
}

/// Reject empty lists, empty names and duplicate names
pub fn validate_routes(routes: &[RouteDefinition]) -> CompareResult<()> {
    if routes.is_empty() {
        return Err(CompareError::InvalidConfig("no routes to compare".to_string()));
    }
    let mut seen = HashSet::new();
    for route in routes {
        if route.name.trim().is_empty() {
            return Err(CompareError::InvalidConfig(format!(
                "route with path '{}' has an empty name",
                route.path
            )));
        }
        if !seen.insert(route.name.as_str()) {
            return Err(CompareError::InvalidConfig(format!(
                "duplicate route name '{}'",
                route.name
            )));
        }
    }
    Ok(())
}

/// Routes compared when no route file is given (Bootstrap documentation)
pub fn default_routes() -> Vec<RouteDefinition> {
    [
        ("Introduction", "/getting-started/introduction"),
        ("Download", "/getting-started/download"),
        ("Contents", "/getting-started/contents"),
        ("Browser support", "/getting-started/browsers-devices"),
        ("Typography", "/content/typography"),
        ("Forms", "/forms/overview"),
        ("Alerts", "/components/alerts"),
        ("Customize Components", "/customize/components"),
        ("About", "/about/overview"),
    ]
    .into_iter()
    .map(|(name, path)| RouteDefinition::new(name, path))
    .collect()
}
