//! Browser fallback tier
//!
//! Only used when every echo service failed through the proxy. A browser
//! session is launched per probe, routed through the proxy, pointed at one
//! echo page and released before the probe returns. Release also runs from
//! `Drop`, so timeouts and cancellation (which drop the probe future) cannot
//! leak a browser process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use super::echo::extract_ip;
use super::tier::{elapsed_ms, ProbeTier, TierOutcome};
use crate::config::BrowserConfig;
use crate::error::{RankerError, Result};
use crate::models::{ProxyDescriptor, TierName};

/// Starts isolated browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a session routing all traffic through `descriptor`
    async fn launch(&self, descriptor: &ProxyDescriptor) -> Result<Box<dyn BrowserSession>>;
}

/// A launched browser session, exclusively owned by one probe
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Visible text of the loaded page body
    async fn body_text(&mut self) -> Result<String>;

    /// Tear the session down. Must be idempotent and must not block.
    fn release(&mut self);
}

/// Releases the session when dropped, whatever path the probe took
struct SessionGuard {
    session: Box<dyn BrowserSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.release();
    }
}

/// Fallback tier driving a [`BrowserLauncher`]
pub struct BrowserTier {
    launcher: Arc<dyn BrowserLauncher>,
    echo_url: String,
    markers: Vec<String>,
}

impl BrowserTier {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, echo_url: impl Into<String>) -> Self {
        Self {
            launcher,
            echo_url: echo_url.into(),
            markers: vec!["origin".to_string(), "\"ip\"".to_string()],
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self::new(
            Arc::new(ChromiumLauncher::new(config.binary.clone())),
            config.echo_url.clone(),
        )
    }

    async fn inspect(&self, descriptor: &ProxyDescriptor, budget: Duration) -> Result<String> {
        let session = self.launcher.launch(descriptor).await?;
        let mut guard = SessionGuard { session };

        guard.session.navigate(&self.echo_url, budget).await?;
        let text = guard.session.body_text().await?;

        drop(guard);
        Ok(text)
    }

    fn has_marker(&self, text: &str) -> bool {
        self.markers.iter().any(|marker| text.contains(marker.as_str()))
    }
}

#[async_trait]
impl ProbeTier for BrowserTier {
    fn name(&self) -> TierName {
        TierName::Browser
    }

    async fn probe(&self, descriptor: &ProxyDescriptor, budget: Duration) -> TierOutcome {
        let start = Instant::now();
        let inspected = self.inspect(descriptor, budget).await;
        let time_ms = elapsed_ms(start);

        match inspected {
            Ok(text) if self.has_marker(&text) => {
                debug!(proxy = %descriptor, time_ms, "browser fallback succeeded");
                TierOutcome::passed(time_ms, ip_from_text(&text))
            }
            Ok(_) => TierOutcome::from_error(
                time_ms,
                &RankerError::BrowserProbeFailure(format!(
                    "{} did not report an address",
                    self.echo_url
                )),
            ),
            Err(e) => TierOutcome::from_error(time_ms, &e),
        }
    }
}

/// Address from page text holding a single JSON document
fn ip_from_text(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text.trim())
        .ok()
        .and_then(|body| extract_ip(&body))
}

/// Launches headless Chromium processes with a throwaway profile
pub struct ChromiumLauncher {
    binary: String,
}

impl ChromiumLauncher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, descriptor: &ProxyDescriptor) -> Result<Box<dyn BrowserSession>> {
        let profile_dir = std::env::temp_dir().join(format!("proxyrank-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&profile_dir).await.map_err(|e| {
            RankerError::BrowserProbeFailure(format!("failed to create browser profile: {}", e))
        })?;

        Ok(Box::new(ChromiumSession {
            binary: self.binary.clone(),
            proxy_url: descriptor.url(),
            profile_dir,
            child: None,
            dom: None,
            released: false,
        }))
    }
}

struct ChromiumSession {
    binary: String,
    proxy_url: String,
    profile_dir: PathBuf,
    child: Option<Child>,
    dom: Option<String>,
    released: bool,
}

impl ChromiumSession {
    fn command(&self, url: &str, budget: Duration) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--headless=new",
            "--disable-gpu",
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-extensions",
            "--disable-remote-fonts",
            "--blink-settings=imagesEnabled=false",
        ])
        .arg(format!("--user-data-dir={}", self.profile_dir.display()))
        .arg(format!("--proxy-server={}", self.proxy_url))
        .arg(format!("--timeout={}", budget.as_millis()))
        .arg("--dump-dom")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, budget: Duration) -> Result<()> {
        let mut child = self.command(url, budget).spawn().map_err(|e| {
            RankerError::BrowserProbeFailure(format!("failed to launch {}: {}", self.binary, e))
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            RankerError::BrowserProbeFailure("browser stdout unavailable".to_string())
        })?;
        self.child = Some(child);

        let mut dom = String::new();
        match timeout(budget, stdout.read_to_string(&mut dom)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(RankerError::BrowserProbeFailure(format!(
                    "failed to read page: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(RankerError::Timeout(format!(
                    "browser navigation exceeded {}ms",
                    budget.as_millis()
                )))
            }
        }

        if dom.trim().is_empty() {
            return Err(RankerError::BrowserProbeFailure(format!(
                "empty page from {}",
                url
            )));
        }
        self.dom = Some(dom);
        Ok(())
    }

    async fn body_text(&mut self) -> Result<String> {
        self.dom
            .as_deref()
            .map(visible_text)
            .ok_or_else(|| RankerError::BrowserProbeFailure("no page loaded".to_string()))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let child = self.child.take();
        let profile_dir = self.profile_dir.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(teardown(child, profile_dir));
            }
            Err(_) => {
                // No runtime left to wait on the process
                if let Some(mut child) = child {
                    if let Err(e) = child.start_kill() {
                        debug!("browser process kill: {}", e);
                    }
                }
                if let Err(e) = std::fs::remove_dir_all(&profile_dir) {
                    warn!(
                        "Failed to remove browser profile {}: {}",
                        profile_dir.display(),
                        e
                    );
                }
            }
        }
    }
}

/// Kill the browser, wait for it to exit, then delete its profile
async fn teardown(child: Option<Child>, profile_dir: PathBuf) {
    if let Some(mut child) = child {
        if let Err(e) = child.kill().await {
            // Already exited is the common case after --dump-dom
            debug!("browser process kill: {}", e);
        }
    }
    if let Err(e) = tokio::fs::remove_dir_all(&profile_dir).await {
        warn!(
            "Failed to remove browser profile {}: {}",
            profile_dir.display(),
            e
        );
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Elements whose text never reaches the screen
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Text a user would see on a serialized DOM
///
/// Chromium renders JSON and plain-text documents inside a `<pre>`, so that
/// element wins when present. Otherwise the body's text nodes are joined,
/// leaving out script and style content. Entities are decoded by the parser.
fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);

    if let Some(pre) = first_match(&document, "pre") {
        return pre.text().collect::<String>().trim().to_string();
    }

    let Some(body) = first_match(&document, "body") else {
        return String::new();
    };
    let mut text = String::new();
    for node in body.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if !hidden {
            text.push_str(fragment);
        }
    }
    text.trim().to_string()
}

fn first_match<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}
