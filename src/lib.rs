//! Design context extraction
//!
//! Renders a live web page in headless Chrome and distills it into a bounded,
//! self-contained [`DesignContext`]: the serialized `<head>` and `<body>`, the
//! CSS that was actually in effect, and images inlined as `data:` URIs.
//!
//! # Pipeline
//!
//! - **Browser Session** (`session`): launch, intercept, navigate to network
//!   quiescence, guaranteed teardown
//! - **CSS Capture** (`capture`): rule-usage coverage or full stylesheet text
//! - **Asset Inliner** (`inliner`): concurrent, fail-isolated image embedding
//! - **CSS Prioritizer** / **Metadata Reducer**: squeeze the result into a
//!   character budget
//!
//! # Example
//!
//! ```no_run
//! use design_context::{CaptureStrategy, ExtractOptions};
//!
//! # #[cfg(feature = "cdp")]
//! # async fn run() -> design_context::Result<()> {
//! let options = ExtractOptions {
//!     capture_strategy: CaptureStrategy::Full,
//!     css_char_budget: Some(15_000),
//!     ..Default::default()
//! };
//!
//! let context = design_context::extract_design_context("https://example.com", &options).await?;
//! println!("{} bytes of CSS", context.css().len());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod artifact;
pub mod assembler;
pub mod capture;
pub mod context;
pub mod fetcher;
pub mod generator;
pub mod inliner;
pub mod metadata;
pub mod prioritizer;

#[cfg(feature = "cdp")]
pub mod session;

pub use assembler::{assemble, validate_url, Extractor};
pub use capture::{CaptureStrategy, CssCapture, RawCapture};
pub use context::{DesignContext, Diagnostics};
pub use fetcher::{FetchedResource, Fetcher};
pub use inliner::{AssetInliner, AssetOutcome, AssetReference, InlineReport};

#[cfg(feature = "cdp")]
pub use assembler::extract_design_context;

/// Desktop Chrome user agent; discourages mobile layout variants.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.5790.170 Safari/537.36";

/// Pipeline configuration
///
/// Everything here is a tuning knob with a conservative default. Values can
/// be loaded from a JSON file with [`ExtractConfig::from_json_file`]; keys that
/// are absent keep their defaults.
///
/// # Examples
///
/// ```
/// let cfg = design_context::ExtractConfig::default();
/// assert_eq!(cfg.viewport.width, 1920);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// User agent sent by the browser and by asset fetches
    pub user_agent: String,
    /// Browser window size
    pub viewport: Viewport,
    /// Explicit Chrome/Chromium binary; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
    /// Budget for reaching network quiescence, in milliseconds
    pub navigation_timeout_ms: u64,
    /// How long the network must stay silent to count as quiescent
    pub idle_window_ms: u64,
    /// Extra wait after quiescence for client-side hydration
    pub settle_delay_ms: u64,
    /// Request URLs containing any of these substrings are aborted
    pub blocked_domains: Vec<String>,
    /// Per-asset fetch timeout, in milliseconds
    pub asset_timeout_ms: u64,
    /// Maximum number of asset fetches in flight per request
    pub asset_concurrency: usize,
    /// Assets larger than this are left as links
    pub asset_max_bytes: usize,
    /// Deadline for the whole extraction request
    pub request_deadline_ms: Option<u64>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport::default(),
            chrome_path: None,
            navigation_timeout_ms: 30_000,
            idle_window_ms: 500,
            settle_delay_ms: 2_000,
            blocked_domains: [
                "githubassets.com",
                "analytics",
                "tracking",
                "doubleclick.net",
                "googletagmanager.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            asset_timeout_ms: 10_000,
            asset_concurrency: 8,
            asset_max_bytes: 10 * 1024 * 1024,
            request_deadline_ms: None,
        }
    }
}

impl ExtractConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline hang or do nothing
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::Config("viewport dimensions must be non-zero".into()));
        }
        if self.navigation_timeout_ms == 0 {
            return Err(Error::Config("navigation_timeout_ms must be non-zero".into()));
        }
        if self.asset_timeout_ms == 0 {
            return Err(Error::Config("asset_timeout_ms must be non-zero".into()));
        }
        if self.asset_concurrency == 0 {
            return Err(Error::Config("asset_concurrency must be at least 1".into()));
        }
        if self.request_deadline_ms == Some(0) {
            return Err(Error::Config("request_deadline_ms must be non-zero when set".into()));
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Per-request options chosen by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractOptions {
    /// Which CSS capture algorithm to run
    pub capture_strategy: CaptureStrategy,
    /// When set, the head is reduced to its metadata and the CSS truncated
    /// to this many characters
    pub css_char_budget: Option<usize>,
    /// Embed `<img>` sources as `data:` URIs
    pub inline_images: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            capture_strategy: CaptureStrategy::default(),
            css_char_budget: None,
            inline_images: true,
        }
    }
}
