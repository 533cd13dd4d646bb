//! Budgeted CSS truncation.
//!
//! Rules are recovered by brace depth, bucketed by whether they look
//! layout-critical, and greedily repacked high bucket first.

/// Lowercase substrings that mark a rule as layout-critical.
pub const PRIORITY_KEYWORDS: &[&str] = &[
    "body", "html", ":root", "main", "header", "footer", "nav", "section", "article", "@media",
    "container", "grid", "flex", "layout", "width", "height", "margin", "padding",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Priority {
    High,
    Normal,
}

#[derive(Debug)]
struct CssRule<'a> {
    text: &'a str,
    chars: usize,
    priority: Priority,
}

impl<'a> CssRule<'a> {
    fn new(text: &'a str) -> Self {
        let lower = text.to_lowercase();
        let priority = if PRIORITY_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Priority::High
        } else {
            Priority::Normal
        };
        Self {
            text,
            chars: text.chars().count(),
            priority,
        }
    }
}

/// Split `css` into top-level rules.
///
/// A rule ends whenever brace depth returns to zero, so an `@media` block is
/// one rule. Stray closing braces are ignored and an unterminated tail is
/// dropped.
pub fn split_rules(css: &str) -> Vec<&str> {
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in css.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    let rule = css[start..=i].trim();
                    if !rule.is_empty() {
                        rules.push(rule);
                    }
                    start = i + 1;
                }
            }
            '}' => start = i + 1,
            _ => {}
        }
    }
    rules
}

/// Fit `css` into `max_chars` characters, preferring layout-critical rules.
///
/// Input that already fits is returned unchanged. Otherwise high-priority
/// rules are packed first, then normal ones, newline separated, each bucket
/// in original order and each stopping at its first rule that would overflow.
pub fn truncate(css: &str, max_chars: usize) -> String {
    if css.chars().count() <= max_chars {
        return css.to_string();
    }

    let rules: Vec<CssRule<'_>> = split_rules(css).into_iter().map(CssRule::new).collect();

    let mut out = String::new();
    let mut used = 0usize;
    for bucket in [Priority::High, Priority::Normal] {
        for rule in rules.iter().filter(|r| r.priority == bucket) {
            let sep = usize::from(!out.is_empty());
            if used + sep + rule.chars > max_chars {
                break;
            }
            if sep == 1 {
                out.push('\n');
            }
            out.push_str(rule.text);
            used += sep + rule.chars;
        }
    }
    out
}
