//! The pipeline's output value.

use scraper::{Html, Node, Selector};
use serde::Serialize;

use crate::{Error, Result};

/// Counters describing how an extraction went.
///
/// Lengths are in bytes, timings in milliseconds. The element counts are a
/// cheap signal for pages that did not finish rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub full_html_length: u64,
    pub head_length: u64,
    pub body_length: u64,
    pub css_length: u64,
    /// CSS length before any truncation
    pub raw_css_length: u64,
    pub stylesheets_captured: u64,
    pub css_capture_errors: u64,
    pub requests_seen: u64,
    pub requests_blocked: u64,
    pub main_count: u64,
    pub section_count: u64,
    pub div_count: u64,
    pub img_count: u64,
    pub images_inlined: u64,
    pub images_skipped_invalid_url: u64,
    pub images_skipped_fetch_error: u64,
    pub render_ms: u64,
    pub inline_ms: u64,
    pub total_ms: u64,
}

impl Diagnostics {
    /// Count structural elements in `body_markup`.
    pub fn count_elements(&mut self, body_markup: &str) {
        let document = Html::parse_document(body_markup);
        let count = |tag: &str| {
            Selector::parse(tag)
                .map(|sel| document.select(&sel).count() as u64)
                .unwrap_or(0)
        };
        self.main_count = count("main");
        self.section_count = count("section");
        self.div_count = count("div");
        self.img_count = count("img");
    }

    /// No landmark elements and almost no divs usually means a JS shell or
    /// a bot wall rather than the real page.
    pub fn likely_under_rendered(&self) -> bool {
        self.main_count == 0 && self.section_count == 0 && self.div_count < 5
    }
}

/// Head markup, body markup and effective CSS of a rendered page.
///
/// Built once per extraction and never mutated. The serialized keys (`head`,
/// `body`, `css`, `sourceUrl`) are what downstream generators read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignContext {
    head: String,
    body: String,
    css: String,
    source_url: String,
    diagnostics: Diagnostics,
}

impl DesignContext {
    /// Fails with [`Error::EmptyBody`] unless `body` has real content.
    pub fn new(
        head: String,
        body: String,
        css: String,
        source_url: String,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        if !body_has_content(&body) {
            return Err(Error::EmptyBody(format!(
                "{} rendered an empty <body>; likely blocked or a script-only shell",
                source_url
            )));
        }
        Ok(Self {
            head,
            body,
            css,
            source_url,
            diagnostics,
        })
    }

    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

/// Whether the `<body>` in `markup` holds any element or non-blank text.
pub fn body_has_content(markup: &str) -> bool {
    if markup.trim().is_empty() {
        return false;
    }
    let document = Html::parse_document(markup);
    let Ok(sel) = Selector::parse("body") else {
        return false;
    };
    let Some(body) = document.select(&sel).next() else {
        return false;
    };
    body.children().any(|child| match child.value() {
        Node::Element(_) => true,
        Node::Text(text) => !text.trim().is_empty(),
        _ => false,
    })
}
