//! CSS capture strategies.
//!
//! `Coverage` records which rules of each loaded stylesheet were used while
//! the page rendered and keeps only those. `Full` collects the complete text
//! of every `<style>` and linked stylesheet in DOM order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "cdp")]
use crate::session::BrowserSession;
#[cfg(feature = "cdp")]
use crate::Error;
#[cfg(feature = "cdp")]
use log::{debug, warn};

/// Which CSS to capture from the rendered page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStrategy {
    /// Only rules exercised during the passive render ("critical CSS")
    #[default]
    Coverage,
    /// Every inline and linked stylesheet, verbatim
    Full,
}

impl fmt::Display for CaptureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStrategy::Coverage => f.write_str("coverage"),
            CaptureStrategy::Full => f.write_str("full"),
        }
    }
}

impl FromStr for CaptureStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coverage" => Ok(CaptureStrategy::Coverage),
            "full" => Ok(CaptureStrategy::Full),
            other => Err(format!("unknown capture strategy '{}' (expected coverage or full)", other)),
        }
    }
}

/// CSS gathered by a strategy, with failure bookkeeping
#[derive(Debug, Clone, Default)]
pub struct CssCapture {
    pub css: String,
    pub stylesheets: u64,
    pub errors: u64,
}

/// Everything taken from the browser before the session is torn down
#[derive(Debug, Clone, Default)]
pub struct RawCapture {
    pub head: String,
    /// `None` when the rendered document had no `<body>`
    pub body: Option<String>,
    pub css: CssCapture,
    pub full_html_length: u64,
    pub requests_seen: u64,
    pub requests_blocked: u64,
    pub render_ms: u64,
}

/// One stylesheet's text and the used ranges reported for it
#[derive(Debug, Clone, Default)]
pub struct CoverageEntry {
    pub text: String,
    /// `(start, end)` offsets in UTF-16 code units, end exclusive
    pub ranges: Vec<(usize, usize)>,
}

/// Sort and coalesce overlapping or touching ranges; empty ranges vanish.
pub fn merge_ranges(mut ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    ranges.retain(|(s, e)| s < e);
    ranges.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Slice `text` by UTF-16 offsets, clamping out-of-range ends.
pub fn slice_utf16(text: &str, start: usize, end: usize) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = end.min(units.len());
    if start >= end {
        return String::new();
    }
    String::from_utf16_lossy(&units[start..end])
}

/// Concatenate the used slices of every entry, newline separated, in report
/// order.
pub fn concat_coverage(entries: &[CoverageEntry]) -> String {
    entries
        .iter()
        .flat_map(|entry| {
            merge_ranges(entry.ranges.clone())
                .into_iter()
                .map(move |(s, e)| slice_utf16(&entry.text, s, e))
        })
        .filter(|chunk| !chunk.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(feature = "cdp")]
mod cdp {
    use super::*;
    use headless_chrome::protocol::cdp::{CSS, DOM};
    use serde::Deserialize;

    const FULL_CAPTURE_SCRIPT: &str = r#"(async () => {
        const texts = [];
        let failed = 0;
        for (const el of document.querySelectorAll("style, link[rel='stylesheet']")) {
            if (el.tagName === "STYLE") {
                texts.push(el.textContent || "");
            } else if (el.href) {
                try {
                    const res = await fetch(el.href);
                    if (res.ok) {
                        texts.push(await res.text());
                    } else {
                        failed++;
                    }
                } catch (_) {
                    failed++;
                }
            }
        }
        return JSON.stringify({ texts, failed });
    })()"#;

    #[derive(Deserialize)]
    struct FullCapturePayload {
        texts: Vec<String>,
        failed: u64,
    }

    /// Instrumentation state carried from `prepare` to `collect`
    #[derive(Debug, Default)]
    pub struct CaptureState {
        tracking: bool,
        errors: u64,
    }

    impl CaptureStrategy {
        /// Runs before navigation. Coverage instrumentation must be live
        /// before the first stylesheet loads.
        pub fn prepare(&self, session: &BrowserSession) -> CaptureState {
            match self {
                CaptureStrategy::Full => CaptureState::default(),
                CaptureStrategy::Coverage => match start_coverage(session) {
                    Ok(()) => CaptureState { tracking: true, errors: 0 },
                    Err(e) => {
                        warn!("{}; coverage capture will be empty", e);
                        CaptureState { tracking: false, errors: 1 }
                    }
                },
            }
        }

        /// Runs after the page settled. Never fails: whatever CSS was
        /// gathered is returned and failures are counted.
        pub fn collect(&self, session: &BrowserSession, state: CaptureState) -> CssCapture {
            let mut capture = match self {
                CaptureStrategy::Coverage if state.tracking => collect_coverage(session),
                CaptureStrategy::Coverage => CssCapture::default(),
                CaptureStrategy::Full => collect_full(session),
            };
            capture.errors += state.errors;
            debug!(
                "{} capture: {} stylesheets, {} chars, {} errors",
                self,
                capture.stylesheets,
                capture.css.len(),
                capture.errors
            );
            capture
        }
    }

    fn start_coverage(session: &BrowserSession) -> crate::Result<()> {
        let tab = session.tab()?;
        let step = |what: &str, e: anyhow::Error| Error::CssCapture(format!("{}: {}", what, e));

        tab.call_method(DOM::Enable { include_whitespace: None })
            .map_err(|e| step("DOM.enable", e))?;
        tab.call_method(CSS::Enable(None))
            .map_err(|e| step("CSS.enable", e))?;
        tab.call_method(CSS::StartRuleUsageTracking(None))
            .map_err(|e| step("CSS.startRuleUsageTracking", e))?;
        Ok(())
    }

    fn collect_coverage(session: &BrowserSession) -> CssCapture {
        let tab = match session.tab() {
            Ok(tab) => tab,
            Err(e) => {
                warn!("Coverage capture skipped: {}", e);
                return CssCapture { errors: 1, ..Default::default() };
            }
        };

        let usage = match tab.call_method(CSS::StopRuleUsageTracking(None)) {
            Ok(ret) => ret.rule_usage,
            Err(e) => {
                warn!("CSS.stopRuleUsageTracking failed: {}", e);
                return CssCapture { errors: 1, ..Default::default() };
            }
        };

        // Group used ranges by stylesheet, keeping first-reported order
        let mut sheets: Vec<(String, Vec<(usize, usize)>)> = Vec::new();
        for rule in usage.into_iter().filter(|r| r.used) {
            let range = (rule.start_offset as usize, rule.end_offset as usize);
            match sheets.iter_mut().find(|(id, _)| *id == rule.style_sheet_id) {
                Some((_, ranges)) => ranges.push(range),
                None => sheets.push((rule.style_sheet_id, vec![range])),
            }
        }

        let mut errors = 0;
        let mut entries = Vec::with_capacity(sheets.len());
        for (style_sheet_id, ranges) in sheets {
            match tab.call_method(CSS::GetStyleSheetText {
                style_sheet_id: style_sheet_id.clone(),
            }) {
                Ok(ret) => entries.push(CoverageEntry { text: ret.text, ranges }),
                Err(e) => {
                    warn!("Failed to read stylesheet {}: {}", style_sheet_id, e);
                    errors += 1;
                }
            }
        }

        CssCapture {
            css: concat_coverage(&entries),
            stylesheets: entries.len() as u64,
            errors,
        }
    }

    fn collect_full(session: &BrowserSession) -> CssCapture {
        let value = match session.evaluate(FULL_CAPTURE_SCRIPT, true) {
            Ok(Some(v)) => v,
            Ok(None) => {
                warn!("Full capture returned no value");
                return CssCapture { errors: 1, ..Default::default() };
            }
            Err(e) => {
                warn!("Full capture failed: {}", e);
                return CssCapture { errors: 1, ..Default::default() };
            }
        };

        let payload = value
            .as_str()
            .and_then(|raw| serde_json::from_str::<FullCapturePayload>(raw).ok());
        match payload {
            Some(payload) => {
                if payload.failed > 0 {
                    warn!("{} linked stylesheets could not be fetched", payload.failed);
                }
                CssCapture {
                    stylesheets: payload.texts.len() as u64,
                    css: payload.texts.join("\n"),
                    errors: payload.failed,
                }
            }
            None => {
                warn!("Full capture returned malformed payload: {}", value);
                CssCapture { errors: 1, ..Default::default() }
            }
        }
    }
}

#[cfg(feature = "cdp")]
pub use cdp::CaptureState;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_names() {
        assert_eq!("coverage".parse::<CaptureStrategy>().unwrap(), CaptureStrategy::Coverage);
        assert_eq!(" FULL ".parse::<CaptureStrategy>().unwrap(), CaptureStrategy::Full);
        assert!("critical".parse::<CaptureStrategy>().is_err());
        assert_eq!(CaptureStrategy::Full.to_string(), "full");
    }

    #[test]
    fn merges_overlapping_and_adjacent_ranges() {
        let merged = merge_ranges(vec![(10, 20), (0, 5), (15, 30), (30, 32), (40, 40)]);
        assert_eq!(merged, vec![(0, 5), (10, 32)]);
    }

    #[test]
    fn slices_by_utf16_units() {
        // "é" is one UTF-16 unit, "😀" is two
        let text = "a{content:'é😀'}b{}";
        let s = slice_utf16(text, 0, 16);
        assert_eq!(s, "a{content:'é😀'}");
        assert_eq!(slice_utf16(text, 16, 100), "b{}");
        assert_eq!(slice_utf16(text, 50, 60), "");
    }

    #[test]
    fn concatenates_used_ranges_in_report_order() {
        let entries = vec![
            CoverageEntry {
                text: ".a{color:red}.b{color:blue}.c{x:1}".into(),
                ranges: vec![(27, 34), (0, 13)],
            },
            CoverageEntry {
                text: "body{margin:0}".into(),
                ranges: vec![(0, 14)],
            },
        ];
        assert_eq!(concat_coverage(&entries), ".a{color:red}\n.c{x:1}\nbody{margin:0}");
    }
}
