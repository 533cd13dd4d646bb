//! Headless Chrome session scoped to a single extraction.
//!
//! The session launches Chrome, opens one tab, installs a request
//! interceptor that aborts layout-irrelevant traffic, and drives navigation
//! until the network goes quiet. Teardown runs on every exit path: through
//! [`BrowserSession::scoped`] for normal use and through `Drop` otherwise.

use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::{Error, ExtractConfig, Result, Viewport};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const PAGE_MARKUP_SCRIPT: &str = r#"JSON.stringify({
    head: document.head ? document.head.outerHTML : "",
    body: document.body ? document.body.outerHTML : null,
    htmlLength: document.documentElement ? document.documentElement.outerHTML.length : 0
})"#;

/// Launch and navigation settings for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    pub viewport: Viewport,
    pub chrome_path: Option<std::path::PathBuf>,
    pub idle_window: Duration,
    pub settle_delay: Duration,
    pub blocked_domains: Vec<String>,
}

impl From<&ExtractConfig> for SessionConfig {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            viewport: config.viewport,
            chrome_path: config.chrome_path.clone(),
            idle_window: Duration::from_millis(config.idle_window_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            blocked_domains: config.blocked_domains.clone(),
        }
    }
}

/// Serialized page markup taken after settle
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMarkup {
    pub head: String,
    /// `None` when the document has no `<body>`
    pub body: Option<String>,
    pub html_length: u64,
}

/// Request bookkeeping shared with the interceptor
#[derive(Debug)]
struct NetworkActivity {
    last_request: Mutex<Instant>,
    seen: AtomicU64,
    blocked: AtomicU64,
}

impl NetworkActivity {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(Instant::now()),
            seen: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
        }
    }

    fn record(&self, blocked: bool) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        if blocked {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut last) = self.last_request.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_request
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

/// Whether a request should be aborted before it leaves the browser.
pub fn should_block(resource_type: &ResourceType, url: &str, blocked_domains: &[String]) -> bool {
    if matches!(
        resource_type,
        ResourceType::Image | ResourceType::Font | ResourceType::Media
    ) {
        return true;
    }
    blocked_domains.iter().any(|d| url.contains(d.as_str()))
}

/// One headless Chrome process with a single tab.
///
/// The tab is dropped before the process; both are released by [`close`]
/// (idempotent) and again by `Drop` as a backstop.
///
/// [`close`]: BrowserSession::close
pub struct BrowserSession {
    tab: Option<Arc<Tab>>,
    browser: Option<Browser>,
    config: SessionConfig,
    activity: Arc<NetworkActivity>,
}

impl BrowserSession {
    /// Launch Chrome, open a tab and install the interception policy.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let args = [
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-features=VizDisplayCompositor"),
        ];
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.chrome_path.clone())
            .args(args.to_vec())
            .build()
            .map_err(|e| Error::Initialization(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::Initialization(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::Initialization(format!("Failed to create tab: {}", e)))?;

        let mut session = Self {
            tab: Some(tab),
            browser: Some(browser),
            config,
            activity: Arc::new(NetworkActivity::new()),
        };

        // From here on a failure still tears the browser down via Drop
        session.configure_tab()?;
        info!(
            "Browser session open ({}x{})",
            session.config.viewport.width, session.config.viewport.height
        );
        Ok(session)
    }

    /// Open a session, run `f`, and close the session whatever `f` returned.
    pub fn scoped<T, F>(config: SessionConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut BrowserSession) -> Result<T>,
    {
        let mut session = Self::open(config)?;
        let result = f(&mut session);
        session.close();
        result
    }

    fn configure_tab(&mut self) -> Result<()> {
        let tab = self.tab()?.clone();

        tab.set_user_agent(&self.config.user_agent, None, None)
            .map_err(|e| Error::Initialization(format!("Failed to set user agent: {}", e)))?;

        tab.enable_fetch(None, Some(false))
            .map_err(|e| Error::Initialization(format!("Failed to enable fetch domain: {}", e)))?;

        let activity = self.activity.clone();
        let blocked_domains = self.config.blocked_domains.clone();
        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport, _session_id, event: RequestPausedEvent| {
                let params = &event.params;
                let block = should_block(&params.resource_Type, &params.request.url, &blocked_domains);
                activity.record(block);

                if block {
                    debug!("Blocking {:?} request {}", params.resource_Type, params.request.url);
                    RequestPausedDecision::Fail(FailRequest {
                        request_id: params.request_id.clone(),
                        error_reason: ErrorReason::BlockedByClient,
                    })
                } else {
                    RequestPausedDecision::Continue(None)
                }
            },
        );

        tab.enable_request_interception(interceptor)
            .map_err(|e| Error::Initialization(format!("Failed to enable request interception: {}", e)))?;

        Ok(())
    }

    pub(crate) fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| Error::Other("Browser session is already closed".into()))
    }

    /// Navigate to `url` and wait for network quiescence, then the settle
    /// delay.
    pub fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab()?;
        let deadline = Instant::now() + timeout;
        tab.set_default_timeout(timeout);

        info!("Navigating to {}", url);
        tab.navigate_to(url)
            .map_err(|e| Error::Navigation(format!("Navigation to {} failed: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::Navigation(format!("Wait for navigation failed: {}", e)))?;

        self.wait_for_quiescence(tab, deadline, timeout)?;

        debug!("Network quiet; settling for {:?}", self.config.settle_delay);
        std::thread::sleep(self.config.settle_delay);
        Ok(())
    }

    fn wait_for_quiescence(&self, tab: &Tab, deadline: Instant, timeout: Duration) -> Result<()> {
        loop {
            let ready = tab
                .evaluate("document.readyState", false)
                .map_err(|e| Error::Navigation(format!("Failed to read readyState: {}", e)))?
                .value
                .map(|v| v.as_str() == Some("complete"))
                .unwrap_or(false);

            if ready && self.activity.idle_for() >= self.config.idle_window {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Navigation(format!(
                    "page did not reach network quiescence within {}ms",
                    timeout.as_millis()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Evaluate `script` in the page and return its value, awaiting promises
    /// when `await_promise` is set.
    pub fn evaluate(&self, script: &str, await_promise: bool) -> Result<Option<serde_json::Value>> {
        let tab = self.tab()?;
        let remote = tab
            .evaluate(script, await_promise)
            .map_err(|e| Error::Other(format!("Evaluation failed: {}", e)))?;
        Ok(remote.value)
    }

    /// Serialize `document.head` and `document.body`.
    pub fn page_markup(&self) -> Result<PageMarkup> {
        let value = self
            .evaluate(PAGE_MARKUP_SCRIPT, false)?
            .ok_or_else(|| Error::Other("No value returned from markup serialization".into()))?;
        let raw = value
            .as_str()
            .ok_or_else(|| Error::Other(format!("Unexpected markup payload: {}", value)))?;
        serde_json::from_str(raw).map_err(|e| Error::Other(format!("Malformed markup payload: {}", e)))
    }

    pub fn requests_seen(&self) -> u64 {
        self.activity.seen.load(Ordering::Relaxed)
    }

    pub fn requests_blocked(&self) -> u64 {
        self.activity.blocked.load(Ordering::Relaxed)
    }

    /// Close the tab, then terminate the browser process.
    pub fn close(&mut self) {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                warn!("Failed to close tab: {}", e);
            }
        }
        if let Some(browser) = self.browser.take() {
            // Dropping the handle kills the Chrome process
            drop(browser);
            debug!("Browser session closed");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        ExtractConfig::default().blocked_domains
    }

    #[test]
    fn blocks_heavy_resource_types() {
        for rt in [ResourceType::Image, ResourceType::Font, ResourceType::Media] {
            assert!(should_block(&rt, "https://example.com/x", &domains()));
        }
    }

    #[test]
    fn blocks_denylisted_domains_only() {
        assert!(should_block(
            &ResourceType::Script,
            "https://www.google-analytics.com/analytics.js",
            &domains()
        ));
        assert!(should_block(
            &ResourceType::Stylesheet,
            "https://github.githubassets.com/assets/light.css",
            &domains()
        ));
        assert!(!should_block(&ResourceType::Stylesheet, "https://example.com/site.css", &domains()));
        assert!(!should_block(&ResourceType::Document, "https://example.com/", &domains()));
    }

    #[test]
    fn session_config_from_extract_config() {
        let cfg = ExtractConfig {
            settle_delay_ms: 250,
            ..Default::default()
        };
        let session = SessionConfig::from(&cfg);
        assert_eq!(session.settle_delay, Duration::from_millis(250));
        assert_eq!(session.viewport.width, 1920);
    }

    fn quick_config() -> SessionConfig {
        SessionConfig::from(&ExtractConfig {
            settle_delay_ms: 0,
            idle_window_ms: 100,
            ..Default::default()
        })
    }

    /// Gone, or a zombie waiting to be reaped
    #[cfg(target_os = "linux")]
    fn process_exited(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
        }
    }

    #[test]
    #[ignore] // requires Chrome
    fn scoped_session_navigates() {
        let markup = BrowserSession::scoped(quick_config(), |session| {
            session.navigate("data:text/html,<html><body><p>hi</p></body></html>", Duration::from_secs(10))?;
            session.page_markup()
        })
        .unwrap();
        assert!(markup.body.unwrap_or_default().contains("hi"));
    }

    #[test]
    #[ignore] // requires Chrome
    fn scoped_session_closes_after_failed_navigation() {
        let mut pid = None;
        let result = BrowserSession::scoped(quick_config(), |session| {
            pid = session.browser.as_ref().and_then(|b| b.get_process_id());
            assert!(session.tab().is_ok());
            // Port 9 (discard) is almost never listening locally
            session.navigate("http://127.0.0.1:9/", Duration::from_secs(5))
        });
        assert!(matches!(result, Err(Error::Navigation(_))), "{:?}", result.err());

        let pid = pid.unwrap();
        #[cfg(target_os = "linux")]
        {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !process_exited(pid) && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(50));
            }
            assert!(process_exited(pid), "Chrome process {} still running", pid);
        }
    }

    #[test]
    #[ignore] // requires Chrome
    fn close_is_idempotent() {
        let mut session = BrowserSession::open(quick_config()).unwrap();
        session.close();
        session.close();
        assert!(session.tab().is_err());
        assert!(session.browser.is_none());
    }
}
