//! Playwright render sessions.
//!
//! Each `PlaywrightSession` owns one Node.js process hosting one Chromium
//! browser, context and page. The Rust side talks to it over a
//! line-delimited JSON protocol on stdin/stdout:
//!
//! ```text
//! -> {"id":3,"op":"goto","url":"https://example.com/about"}
//! <- {"id":3,"ok":true,"value":null}
//! -> {"id":4,"op":"screenshot"}
//! <- {"id":4,"ok":true,"value":"iVBORw0KGgo..."}
//! ```
//!
//! The driver prints `{"id":0,"ok":true}` once the page is ready.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::backend::RenderPage;
use super::types::{SnapshotError, SnapshotResult};
use crate::device::DeviceProfile;

/// Environment variable carrying the session settings into the driver
const SESSION_ENV: &str = "PAGE_COMPARE_SESSION";

const DRIVER_SCRIPT: &str = r#"
const { chromium } = require('playwright');
const readline = require('readline');

const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const cfg = JSON.parse(process.env.PAGE_COMPARE_SESSION);
  const browser = await chromium.launch({ headless: cfg.headless });
  const context = await browser.newContext({
    viewport: { width: cfg.width, height: cfg.height },
    userAgent: cfg.userAgent,
  });
  const page = await context.newPage();
  send({ id: 0, ok: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let req = null;
    try {
      req = JSON.parse(line);
      let value = null;
      switch (req.op) {
        case 'goto': await page.goto(req.url); break;
        case 'waitForNetworkIdle': await page.waitForLoadState('networkidle'); break;
        case 'evaluate': value = await page.evaluate(req.script); break;
        case 'click': await page.click(req.selector); break;
        case 'fill': await page.fill(req.selector, req.value); break;
        case 'waitForSelector': await page.waitForSelector(req.selector); break;
        case 'screenshot': value = (await page.screenshot({ fullPage: true })).toString('base64'); break;
        case 'ariaSnapshot': value = await page.locator(req.selector).ariaSnapshot(); break;
        case 'content': value = await page.content(); break;
        case 'close':
          await context.close();
          await browser.close();
          send({ id: req.id, ok: true });
          process.exit(0);
        default: throw new Error('unknown op ' + req.op);
      }
      send({ id: req.id, ok: true, value: value === undefined ? null : value });
    } catch (err) {
      send({ id: req ? req.id : null, ok: false, error: String((err && err.message) || err) });
    }
  }
  await browser.close();
})().catch((err) => {
  process.stderr.write(String((err && err.stack) || err) + '\n');
  process.exit(1);
});
"#;

/// How to launch the driver process
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// JavaScript runtime used to host Playwright
    pub node: String,
    /// Run Chromium without a window
    pub headless: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        let cfg = crate::config::get();
        Self {
            node: cfg.run.node.clone(),
            headless: cfg.run.headless,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSettings<'a> {
    width: u32,
    height: u32,
    user_agent: &'a str,
    headless: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum DriverOp<'a> {
    Goto { url: &'a str },
    WaitForNetworkIdle,
    Evaluate { script: &'a str },
    Click { selector: &'a str },
    Fill { selector: &'a str, value: &'a str },
    WaitForSelector { selector: &'a str },
    Screenshot,
    AriaSnapshot { selector: &'a str },
    Content,
    Close,
}

impl DriverOp<'_> {
    fn describe(&self) -> String {
        match self {
            DriverOp::Goto { url } => format!("goto {}", url),
            DriverOp::WaitForNetworkIdle => "waitForNetworkIdle".to_string(),
            DriverOp::Evaluate { .. } => "evaluate".to_string(),
            DriverOp::Click { selector } => format!("click {}", selector),
            DriverOp::Fill { selector, .. } => format!("fill {}", selector),
            DriverOp::WaitForSelector { selector } => format!("waitForSelector {}", selector),
            DriverOp::Screenshot => "screenshot".to_string(),
            DriverOp::AriaSnapshot { selector } => format!("ariaSnapshot {}", selector),
            DriverOp::Content => "content".to_string(),
            DriverOp::Close => "close".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    #[serde(flatten)]
    op: DriverOp<'a>,
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    /// `None` when the driver could not parse the request line
    #[serde(default)]
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// Outcome of one request, before it is mapped to a typed error
enum Reply {
    Value(serde_json::Value),
    Failed(String),
}

/// One long-lived browser page driven through Playwright
pub struct PlaywrightSession {
    slot: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
}

impl PlaywrightSession {
    /// Spawn the driver and wait until its page is ready
    pub async fn launch(
        slot: impl Into<String>,
        profile: &DeviceProfile,
        options: &DriverOptions,
    ) -> SnapshotResult<Self> {
        let slot = slot.into();
        let settings = serde_json::to_string(&SessionSettings {
            width: profile.viewport_width,
            height: profile.viewport_height,
            user_agent: &profile.user_agent,
            headless: options.headless,
        })?;

        debug!(
            "Launching {} session ({}x{}) with {}",
            slot, profile.viewport_width, profile.viewport_height, options.node
        );

        // `-e` resolves `require` against the working directory, where
        // playwright is expected to be installed.
        let mut child = Command::new(&options.node)
            .arg("-e")
            .arg(DRIVER_SCRIPT)
            .env(SESSION_ENV, settings)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SnapshotError::Protocol(format!("Failed to spawn '{}': {}", options.node, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SnapshotError::Protocol("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SnapshotError::Protocol("driver stdout unavailable".to_string()))?;

        let mut session = Self {
            slot,
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            closed: false,
        };

        match session.read_response(0).await? {
            Reply::Value(_) => {}
            Reply::Failed(message) => return Err(SnapshotError::Protocol(message)),
        }
        info!("Session {} ready", session.slot);
        Ok(session)
    }

    async fn read_response(&mut self, id: u64) -> SnapshotResult<Reply> {
        loop {
            let line = self.stdout.next_line().await?.ok_or_else(|| {
                SnapshotError::Protocol(format!("{} driver exited unexpectedly", self.slot))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let response: DriverResponse = match serde_json::from_str(&line) {
                Ok(response) => response,
                Err(_) => {
                    debug!("{} driver output: {}", self.slot, line);
                    continue;
                }
            };
            let Some(response_id) = response.id else {
                return Err(SnapshotError::Protocol(format!(
                    "{} driver rejected request {}: {}",
                    self.slot,
                    id,
                    response.error.unwrap_or_else(|| "malformed request".to_string())
                )));
            };
            if response_id != id {
                warn!(
                    "{} driver answered request {} while waiting for {}",
                    self.slot, response_id, id
                );
                continue;
            }
            return Ok(if response.ok {
                Reply::Value(response.value)
            } else {
                Reply::Failed(response.error.unwrap_or_else(|| "unknown error".to_string()))
            });
        }
    }

    async fn request(&mut self, op: DriverOp<'_>) -> SnapshotResult<Reply> {
        if self.closed {
            return Err(SnapshotError::Protocol(format!("{} session is closed", self.slot)));
        }
        let id = self.next_id;
        self.next_id += 1;

        debug!("{} -> {}", self.slot, op.describe());
        let mut line = serde_json::to_string(&DriverRequest { id, op })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        self.read_response(id).await
    }

    /// Run an op whose failure is a page action failure
    async fn action(&mut self, op: DriverOp<'_>) -> SnapshotResult<serde_json::Value> {
        let action = op.describe();
        match self.request(op).await? {
            Reply::Value(value) => Ok(value),
            Reply::Failed(message) => Err(SnapshotError::Action { action, message }),
        }
    }

    /// Run an op that returns a string snapshot
    async fn snapshot(&mut self, kind: &'static str, op: DriverOp<'_>) -> SnapshotResult<String> {
        match self.request(op).await? {
            Reply::Value(serde_json::Value::String(text)) => Ok(text),
            Reply::Value(other) => Err(SnapshotError::Snapshot {
                kind,
                message: format!("expected a string, got {}", other),
            }),
            Reply::Failed(message) => Err(SnapshotError::Snapshot { kind, message }),
        }
    }
}

#[async_trait]
impl RenderPage for PlaywrightSession {
    fn slot(&self) -> &str {
        &self.slot
    }

    async fn navigate(&mut self, url: &str) -> SnapshotResult<()> {
        match self.request(DriverOp::Goto { url }).await? {
            Reply::Value(_) => Ok(()),
            Reply::Failed(message) => Err(SnapshotError::Navigation {
                url: url.to_string(),
                message,
            }),
        }
    }

    async fn wait_for_network_idle(&mut self) -> SnapshotResult<()> {
        self.action(DriverOp::WaitForNetworkIdle).await.map(|_| ())
    }

    async fn evaluate(&mut self, script: &str) -> SnapshotResult<serde_json::Value> {
        self.action(DriverOp::Evaluate { script }).await
    }

    async fn click(&mut self, selector: &str) -> SnapshotResult<()> {
        self.action(DriverOp::Click { selector }).await.map(|_| ())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> SnapshotResult<()> {
        self.action(DriverOp::Fill { selector, value }).await.map(|_| ())
    }

    async fn wait_for_selector(&mut self, selector: &str) -> SnapshotResult<()> {
        self.action(DriverOp::WaitForSelector { selector }).await.map(|_| ())
    }

    async fn screenshot_full_page(&mut self) -> SnapshotResult<Vec<u8>> {
        let encoded = self.snapshot("screenshot", DriverOp::Screenshot).await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| SnapshotError::Snapshot {
                kind: "screenshot",
                message: format!("invalid base64 payload: {}", e),
            })
    }

    async fn accessibility_snapshot(&mut self, root_selector: &str) -> SnapshotResult<String> {
        self.snapshot("accessibility", DriverOp::AriaSnapshot { selector: root_selector })
            .await
    }

    async fn serialized_content(&mut self) -> SnapshotResult<String> {
        self.snapshot("dom", DriverOp::Content).await
    }

    async fn close(&mut self) -> SnapshotResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.request(DriverOp::Close).await;
        self.closed = true;
        if let Err(e) = &result {
            warn!("{} did not close cleanly: {}", self.slot, e);
            let _ = self.child.start_kill();
        }
        let _ = self.child.wait().await;
        debug!("Session {} closed", self.slot);
        result.map(|_| ())
    }
}

/// Install the Chromium build Playwright drives (`npx playwright install chromium`)
pub async fn install_browsers(npx: &str) -> SnapshotResult<()> {
    info!("Installing Playwright Chromium");
    let status = Command::new(npx)
        .args(["playwright", "install", "chromium"])
        .status()
        .await?;
    if !status.success() {
        return Err(SnapshotError::Protocol(format!(
            "Playwright install exited with {}",
            status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "a signal".to_string())
        )));
    }
    Ok(())
}
