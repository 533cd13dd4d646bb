//! Embeds `<img>` sources into markup as `data:` URIs.
//!
//! The markup tree (`kuchikiki`, reference counted and not `Send`) is only
//! touched in two synchronous passes: one to collect sources, one to rewrite
//! them. The fetches in between are issued concurrently.

use futures::stream::{self, StreamExt};
use kuchikiki::traits::TendrilSink;
use kuchikiki::NodeRef;
use log::{debug, info, warn};
use url::Url;

use crate::fetcher::Fetcher;

const IMAGE_SELECTOR: &str = "img[src]";

/// Outcome of one image reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOutcome {
    Inlined,
    SkippedInvalidUrl,
    SkippedFetchError,
}

/// An image reference discovered in the markup
#[derive(Debug, Clone)]
pub struct AssetReference {
    /// `src` exactly as written
    pub original: String,
    /// `src` resolved against the base URL, when resolution succeeded
    pub resolved: Option<Url>,
    pub outcome: AssetOutcome,
}

/// Summary of an inlining pass
#[derive(Debug, Clone, Default)]
pub struct InlineReport {
    pub assets: Vec<AssetReference>,
}

impl InlineReport {
    pub fn found(&self) -> usize {
        self.assets.len()
    }

    pub fn count(&self, outcome: AssetOutcome) -> usize {
        self.assets.iter().filter(|a| a.outcome == outcome).count()
    }
}

/// Resolves, fetches and embeds images found in markup.
#[derive(Debug, Clone)]
pub struct AssetInliner {
    fetcher: Fetcher,
    concurrency: usize,
}

impl AssetInliner {
    pub fn new(fetcher: Fetcher, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Rewrite every image `src` in `markup` to a `data:` URI where possible.
    pub async fn inline(&self, markup: &str, base_url: &str) -> String {
        self.inline_with_report(markup, base_url).await.0
    }

    /// Like [`inline`](Self::inline), also reporting what happened to each
    /// image. Never fails: a bad asset leaves its `src` untouched.
    pub async fn inline_with_report(&self, markup: &str, base_url: &str) -> (String, InlineReport) {
        let sources = collect_image_sources(markup);
        if sources.is_empty() {
            return (markup.to_string(), InlineReport::default());
        }
        info!("Inlining {} images against {}", sources.len(), base_url);

        let base = Url::parse(base_url).ok();
        if base.is_none() {
            warn!("Base URL {} is not parseable; leaving images as-is", base_url);
        }

        let results: Vec<(usize, AssetReference, Option<String>)> = stream::iter(sources.into_iter().enumerate())
            .map(|(idx, original)| {
                let resolved = base.as_ref().and_then(|b| resolve_asset_url(b, &original));
                async move {
                    let Some(url) = resolved else {
                        debug!("Skipping invalid image URL: {}", original);
                        let reference = AssetReference {
                            original,
                            resolved: None,
                            outcome: AssetOutcome::SkippedInvalidUrl,
                        };
                        return (idx, reference, None);
                    };

                    match self.fetcher.fetch(&url).await {
                        Ok(resource) => {
                            let reference = AssetReference {
                                original,
                                resolved: Some(url),
                                outcome: AssetOutcome::Inlined,
                            };
                            (idx, reference, Some(resource.to_data_uri()))
                        }
                        Err(e) => {
                            warn!("Skipping image {}: {}", url, e);
                            let reference = AssetReference {
                                original,
                                resolved: Some(url),
                                outcome: AssetOutcome::SkippedFetchError,
                            };
                            (idx, reference, None)
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut rewrites = vec![None; results.len()];
        let mut assets = vec![None; results.len()];
        for (idx, reference, data_uri) in results {
            rewrites[idx] = data_uri;
            assets[idx] = Some(reference);
        }

        let report = InlineReport {
            assets: assets.into_iter().flatten().collect(),
        };
        info!(
            "Inlined {}/{} images ({} invalid, {} failed)",
            report.count(AssetOutcome::Inlined),
            report.found(),
            report.count(AssetOutcome::SkippedInvalidUrl),
            report.count(AssetOutcome::SkippedFetchError)
        );

        (apply_rewrites(markup, &rewrites), report)
    }
}

/// Resolve `src` against `base`, accepting only http(s) URLs with a host.
pub fn resolve_asset_url(base: &Url, src: &str) -> Option<Url> {
    let url = base.join(src.trim()).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().map(|h| !h.is_empty()).unwrap_or(false);
    (web && has_host).then_some(url)
}

fn parse(markup: &str) -> NodeRef {
    kuchikiki::parse_html().one(markup)
}

/// Image `src` values in document order.
fn collect_image_sources(markup: &str) -> Vec<String> {
    let document = parse(markup);
    let Ok(images) = document.select(IMAGE_SELECTOR) else {
        return Vec::new();
    };
    images
        .filter_map(|img| img.attributes.borrow().get("src").map(|s| s.to_string()))
        .collect()
}

/// Re-parse `markup` and replace the n-th image `src` with `rewrites[n]`.
///
/// Parsing is deterministic, so the n-th match here is the n-th source
/// returned by [`collect_image_sources`].
fn apply_rewrites(markup: &str, rewrites: &[Option<String>]) -> String {
    let document = parse(markup);
    if let Ok(images) = document.select(IMAGE_SELECTOR) {
        for (img, rewrite) in images.zip(rewrites) {
            if let Some(data_uri) = rewrite {
                img.attributes.borrow_mut().insert("src", data_uri.clone());
            }
        }
    }
    serialize_like_input(markup, &document)
}

/// Shape of the markup handed to the inliner, judged by its leading tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputShape {
    Document,
    Body,
    Fragment,
}

fn input_shape(markup: &str) -> InputShape {
    let lead: String = markup
        .trim_start()
        .chars()
        .take(9)
        .collect::<String>()
        .to_ascii_lowercase();
    if lead.starts_with("<!doctype") || lead.starts_with("<html") {
        InputShape::Document
    } else if lead.starts_with("<body") {
        InputShape::Body
    } else {
        InputShape::Fragment
    }
}

/// Serialize `document` in the same shape as the input: a full document,
/// a `<body>` element, or bare body content.
fn serialize_like_input(markup: &str, document: &NodeRef) -> String {
    let shape = input_shape(markup);
    if shape == InputShape::Document {
        return document.to_string();
    }
    let Ok(body) = document.select_first("body") else {
        return document.to_string();
    };
    match shape {
        InputShape::Body => body.as_node().to_string(),
        _ => body.as_node().children().map(|child| child.to_string()).collect(),
    }
}
