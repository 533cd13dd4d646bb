//! Top-level orchestration: render, capture, post-process, assemble.

#[cfg(feature = "cdp")]
use std::time::Duration;
use std::time::Instant;

use log::{info, warn};
use url::Url;

use crate::capture::RawCapture;
use crate::context::{body_has_content, DesignContext, Diagnostics};
use crate::fetcher::Fetcher;
use crate::inliner::{AssetInliner, AssetOutcome};
use crate::{metadata, prioritizer};
use crate::{Error, ExtractConfig, ExtractOptions, Result};

#[cfg(feature = "cdp")]
use crate::capture::CaptureStrategy;
#[cfg(feature = "cdp")]
use crate::session::{BrowserSession, SessionConfig};

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!("{}: scheme must be http or https", url)));
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(Error::InvalidUrl(format!("{}: missing host", url)));
    }
    Ok(parsed)
}

/// Runs extractions with one configuration.
///
/// Holds only the asset client; each call gets its own browser session.
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractConfig,
    inliner: AssetInliner,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = Fetcher::from_config(&config)?;
        let inliner = AssetInliner::new(fetcher, config.asset_concurrency);
        Ok(Self { config, inliner })
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Extract a design context from `url`.
    ///
    /// Fails with `InvalidUrl` before any browser work, `Navigation` when the
    /// page cannot be rendered, `EmptyBody` when it renders to nothing, and
    /// `Timeout` when `request_deadline_ms` elapses.
    #[cfg(feature = "cdp")]
    pub async fn extract(&self, url: &str, options: &ExtractOptions) -> Result<DesignContext> {
        let page_url = validate_url(url)?;
        match self.config.request_deadline_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), self.run(page_url, options))
                .await
                .map_err(|_| Error::Timeout(ms))?,
            None => self.run(page_url, options).await,
        }
    }

    #[cfg(feature = "cdp")]
    async fn run(&self, page_url: Url, options: &ExtractOptions) -> Result<DesignContext> {
        let started = Instant::now();
        let session_config = SessionConfig::from(&self.config);
        let timeout = self.config.navigation_timeout();
        let strategy = options.capture_strategy;
        let target = page_url.to_string();

        // The session lives and dies on the blocking thread, so it is torn
        // down even if this future is dropped by a deadline.
        let raw = tokio::task::spawn_blocking(move || render(session_config, &target, timeout, strategy))
            .await
            .map_err(|e| Error::Other(format!("Render task failed: {}", e)))??;

        let context = self.assemble(raw, page_url.as_str(), options).await?;
        info!("Extracted {} in {}ms", page_url, started.elapsed().as_millis());
        Ok(context)
    }

    /// Post-process an already captured page into a [`DesignContext`].
    pub async fn assemble(&self, raw: RawCapture, source_url: &str, options: &ExtractOptions) -> Result<DesignContext> {
        assemble(&self.inliner, raw, source_url, options).await
    }
}

/// Render `url` in a fresh session and take head, body and CSS.
#[cfg(feature = "cdp")]
fn render(config: SessionConfig, url: &str, timeout: Duration, strategy: CaptureStrategy) -> Result<RawCapture> {
    let started = Instant::now();
    BrowserSession::scoped(config, |session| {
        let state = strategy.prepare(session);
        session.navigate(url, timeout)?;
        let markup = session.page_markup()?;
        let css = strategy.collect(session, state);

        Ok(RawCapture {
            head: markup.head,
            body: markup.body,
            css,
            full_html_length: markup.html_length,
            requests_seen: session.requests_seen(),
            requests_blocked: session.requests_blocked(),
            render_ms: started.elapsed().as_millis() as u64,
        })
    })
}

/// Inline images, apply the size budget and build the context.
pub async fn assemble(
    inliner: &AssetInliner,
    raw: RawCapture,
    source_url: &str,
    options: &ExtractOptions,
) -> Result<DesignContext> {
    let started = Instant::now();
    let Some(body) = raw.body.filter(|b| !b.trim().is_empty()) else {
        return Err(Error::EmptyBody(format!("{} has no <body> element", source_url)));
    };
    if !body_has_content(&body) {
        return Err(Error::EmptyBody(format!("{} rendered an empty <body>", source_url)));
    }

    let mut diagnostics = Diagnostics {
        full_html_length: raw.full_html_length,
        raw_css_length: raw.css.css.len() as u64,
        stylesheets_captured: raw.css.stylesheets,
        css_capture_errors: raw.css.errors,
        requests_seen: raw.requests_seen,
        requests_blocked: raw.requests_blocked,
        render_ms: raw.render_ms,
        ..Default::default()
    };
    diagnostics.count_elements(&body);
    if diagnostics.likely_under_rendered() {
        warn!("{} looks under-rendered (no <main>/<section>, {} divs)", source_url, diagnostics.div_count);
    }

    let body = if options.inline_images {
        let started = Instant::now();
        let (inlined, report) = inliner.inline_with_report(&body, source_url).await;
        diagnostics.inline_ms = started.elapsed().as_millis() as u64;
        diagnostics.images_inlined = report.count(AssetOutcome::Inlined) as u64;
        diagnostics.images_skipped_invalid_url = report.count(AssetOutcome::SkippedInvalidUrl) as u64;
        diagnostics.images_skipped_fetch_error = report.count(AssetOutcome::SkippedFetchError) as u64;
        inlined
    } else {
        body
    };

    let (head, css) = match options.css_char_budget {
        Some(budget) => (metadata::reduce(&raw.head), prioritizer::truncate(&raw.css.css, budget)),
        None => (raw.head, raw.css.css),
    };

    diagnostics.head_length = head.len() as u64;
    diagnostics.body_length = body.len() as u64;
    diagnostics.css_length = css.len() as u64;
    diagnostics.total_ms = raw.render_ms + started.elapsed().as_millis() as u64;

    info!(
        "Assembled context for {}: head {}B, body {}B, css {}B (raw {}B)",
        source_url, diagnostics.head_length, diagnostics.body_length, diagnostics.css_length, diagnostics.raw_css_length
    );

    DesignContext::new(head, body, css, source_url.to_string(), diagnostics)
}

/// Extract with the default configuration.
#[cfg(feature = "cdp")]
pub async fn extract_design_context(url: &str, options: &ExtractOptions) -> Result<DesignContext> {
    Extractor::new(ExtractConfig::default())?.extract(url, options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("https://example.com/about").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/").is_ok());
    }

    #[test]
    fn rejects_bad_urls_before_any_browser_work() {
        for bad in ["example.com", "ftp://example.com/file", "file:///tmp/x.html", "https://", "not a url"] {
            assert!(matches!(validate_url(bad), Err(Error::InvalidUrl(_))), "{} accepted", bad);
        }
    }
}
