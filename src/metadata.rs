//! Reduces a `<head>` to the few elements worth spending tokens on.

use kuchikiki::traits::TendrilSink;
use kuchikiki::{ElementData, NodeDataRef};

/// Replacement for every anchor `href`.
pub const HREF_PLACEHOLDER: &str = "#";

const META_NAMES: &[&str] = &["viewport", "description"];
const META_PROPERTIES: &[&str] = &["og:title", "og:description"];

/// Keep `<title>` and the charset/viewport/description/OpenGraph `<meta>`
/// elements of `head_markup`, serialized one per line in document order.
pub fn reduce(head_markup: &str) -> String {
    let document = kuchikiki::parse_html().one(head_markup);

    if let Ok(anchors) = document.select("a[href]") {
        for anchor in anchors {
            anchor
                .attributes
                .borrow_mut()
                .insert("href", HREF_PLACEHOLDER.to_string());
        }
    }

    let Ok(candidates) = document.select("title, meta") else {
        return String::new();
    };

    candidates
        .filter(is_retained)
        .map(|el| el.as_node().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_retained(el: &NodeDataRef<ElementData>) -> bool {
    if &*el.name.local == "title" {
        return true;
    }

    let attrs = el.attributes.borrow();
    if attrs.contains("charset") {
        return true;
    }
    let matches = |attr: &str, allowed: &[&str]| {
        attrs
            .get(attr)
            .map(|v| allowed.iter().any(|a| v.trim().eq_ignore_ascii_case(a)))
            .unwrap_or(false)
    };
    matches("name", META_NAMES) || matches("property", META_PROPERTIES)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = r#"<head>
        <meta charset="utf-8">
        <title>Acme Widgets</title>
        <meta name="viewport" content="width=device-width, initial-scale=1">
        <meta name="description" content="We make widgets">
        <meta name="generator" content="Hugo">
        <meta property="og:title" content="Acme">
        <meta property="og:image" content="https://acme.test/og.png">
        <meta property="og:description" content="Widgets, made">
        <link rel="stylesheet" href="/site.css">
        <script src="/app.js"></script>
        <style>body { margin: 0 }</style>
    </head>"#;

    #[test]
    fn keeps_only_layout_metadata_in_order() {
        let reduced = reduce(HEAD);
        let lines: Vec<&str> = reduced.lines().collect();
        assert_eq!(lines.len(), 6, "{}", reduced);
        assert_eq!(lines[0], r#"<meta charset="utf-8">"#);
        assert_eq!(lines[1], "<title>Acme Widgets</title>");

        // Attribute order inside a tag is up to the serializer
        let expect = [
            (r#"name="viewport""#, r#"content="width=device-width, initial-scale=1""#),
            (r#"name="description""#, r#"content="We make widgets""#),
            (r#"property="og:title""#, r#"content="Acme""#),
            (r#"property="og:description""#, r#"content="Widgets, made""#),
        ];
        for (line, (key, content)) in lines[2..].iter().zip(expect) {
            assert!(line.starts_with("<meta "), "{}", line);
            assert!(line.contains(key), "{} missing {}", line, key);
            assert!(line.contains(content), "{} missing {}", line, content);
        }
    }

    #[test]
    fn drops_unlisted_meta_and_other_children() {
        let reduced = reduce(HEAD);
        assert!(!reduced.contains("generator"));
        assert!(!reduced.contains("og:image"));
        assert!(!reduced.contains("stylesheet"));
        assert!(!reduced.contains("app.js"));
        assert!(!reduced.contains("margin"));
    }

    #[test]
    fn anchor_hrefs_never_survive() {
        let head = r#"<head><title>T</title><a href="https://tracker.example/secret-path">x</a></head>"#;
        let reduced = reduce(head);
        assert!(!reduced.contains("secret-path"));
        assert_eq!(reduced, "<title>T</title>");
    }

    #[test]
    fn no_title_and_no_meta_yields_empty() {
        assert_eq!(reduce("<head><link rel=icon href=/f.ico></head>"), "");
        assert_eq!(reduce(""), "");
    }
}
