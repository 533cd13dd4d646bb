//! Post-processing of captured pages, no browser required

use std::time::Duration;

use design_context::{CssCapture, Error, ExtractConfig, ExtractOptions, Extractor, RawCapture};
use tiny_http::{Header, Response, Server};

fn start_image_server() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();

    std::thread::spawn(move || {
        while let Ok(req) = server.recv() {
            std::thread::spawn(move || {
                let _ = if req.url() == "/logo.png" {
                    let ct = "Content-Type: image/png".parse::<Header>().unwrap();
                    req.respond(Response::from_data(&b"png"[..]).with_header(ct))
                } else {
                    req.respond(Response::from_string("Not Found").with_status_code(404))
                };
            });
        }
    });

    format!("http://{}", addr)
}

fn extractor() -> Extractor {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = ExtractConfig {
        asset_timeout_ms: 2_000,
        ..Default::default()
    };
    Extractor::new(config).unwrap()
}

fn capture(head: &str, body: Option<&str>, css: &str) -> RawCapture {
    RawCapture {
        head: head.to_string(),
        body: body.map(str::to_string),
        css: CssCapture {
            css: css.to_string(),
            stylesheets: 2,
            errors: 1,
        },
        full_html_length: 4_096,
        requests_seen: 12,
        requests_blocked: 3,
        render_ms: 250,
    }
}

const HEAD: &str = r#"<head>
    <title>Pricing</title>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width">
    <meta name="robots" content="noindex">
    <link rel="stylesheet" href="/site.css">
    <script src="/app.js"></script>
</head>"#;

#[tokio::test]
async fn missing_or_blank_body_is_rejected() {
    let extractor = extractor();
    let options = ExtractOptions::default();

    for body in [None, Some(""), Some("<body>  \n </body>")] {
        let result = extractor
            .assemble(capture(HEAD, body, "p{}"), "https://example.com/", &options)
            .await;
        assert!(matches!(result, Err(Error::EmptyBody(_))), "{:?} accepted", body);
    }
}

#[tokio::test]
async fn without_budget_head_and_css_pass_through() {
    let extractor = extractor();
    let options = ExtractOptions {
        inline_images: false,
        ..Default::default()
    };
    let css = ".a{color:red}\n.b{color:blue}";

    let ctx = extractor
        .assemble(capture(HEAD, Some("<body><p>Hello</p></body>"), css), "https://example.com/", &options)
        .await
        .unwrap();

    assert_eq!(ctx.head(), HEAD);
    assert_eq!(ctx.css(), css);
    assert_eq!(ctx.body(), "<body><p>Hello</p></body>");
    assert_eq!(ctx.source_url(), "https://example.com/");
}

#[tokio::test]
async fn budget_reduces_head_and_truncates_css() {
    let extractor = extractor();
    let options = ExtractOptions {
        css_char_budget: Some(40),
        inline_images: false,
        ..Default::default()
    };
    let css = ".card{color:red}\nbody{margin:0}\n.badge{font-weight:bold}";

    let ctx = extractor
        .assemble(capture(HEAD, Some("<body><main>Hi</main></body>"), css), "https://example.com/", &options)
        .await
        .unwrap();

    assert!(ctx.head().contains("<title>Pricing</title>"));
    assert!(ctx.head().contains("viewport"));
    assert!(!ctx.head().contains("robots"));
    assert!(!ctx.head().contains("stylesheet"));
    assert!(!ctx.head().contains("app.js"));

    assert!(ctx.css().chars().count() <= 40);
    assert!(ctx.css().starts_with("body{margin:0}"));

    let diag = ctx.diagnostics();
    assert_eq!(diag.raw_css_length, css.len() as u64);
    assert_eq!(diag.css_length, ctx.css().len() as u64);
    assert_eq!(diag.head_length, ctx.head().len() as u64);
}

#[tokio::test]
async fn images_stay_links_when_inlining_is_off() {
    let base = start_image_server();
    let extractor = extractor();
    let options = ExtractOptions {
        inline_images: false,
        ..Default::default()
    };

    let ctx = extractor
        .assemble(
            capture(HEAD, Some(r#"<body><img src="/logo.png"></body>"#), ""),
            &format!("{}/about", base),
            &options,
        )
        .await
        .unwrap();

    assert!(ctx.body().contains(r#"src="/logo.png""#));
    assert_eq!(ctx.diagnostics().images_inlined, 0);
}

#[tokio::test]
async fn diagnostics_describe_the_page() {
    let base = start_image_server();
    let extractor = extractor();
    let options = ExtractOptions::default();

    let body = r#"<body>
        <main><section><div><img src="/logo.png"></div></section></main>
        <div><img src="/gone.png"><img src="javascript:void(0)"></div>
    </body>"#;

    let ctx = tokio::time::timeout(
        Duration::from_secs(10),
        extractor.assemble(capture(HEAD, Some(body), "p{}"), &format!("{}/about", base), &options),
    )
    .await
    .unwrap()
    .unwrap();

    let diag = ctx.diagnostics();
    assert_eq!(diag.main_count, 1);
    assert_eq!(diag.section_count, 1);
    assert_eq!(diag.div_count, 2);
    assert_eq!(diag.img_count, 3);
    assert!(!diag.likely_under_rendered());

    assert_eq!(diag.images_inlined, 1);
    assert_eq!(diag.images_skipped_fetch_error, 1);
    assert_eq!(diag.images_skipped_invalid_url, 1);

    assert_eq!(diag.stylesheets_captured, 2);
    assert_eq!(diag.css_capture_errors, 1);
    assert_eq!(diag.requests_seen, 12);
    assert_eq!(diag.requests_blocked, 3);
    assert_eq!(diag.full_html_length, 4_096);
    assert!(diag.total_ms >= diag.render_ms);

    assert!(ctx.body().contains("data:image/png;base64,cG5n"));
}

#[tokio::test]
async fn context_serializes_camel_case() {
    let extractor = extractor();
    let options = ExtractOptions {
        inline_images: false,
        ..Default::default()
    };

    let ctx = extractor
        .assemble(capture(HEAD, Some("<body><p>x</p></body>"), "p{}"), "https://example.com/", &options)
        .await
        .unwrap();

    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(json["sourceUrl"], "https://example.com/");
    assert_eq!(json["css"], "p{}");
    assert!(json["diagnostics"]["requestsBlocked"].is_number());
}

#[test]
fn extractor_rejects_invalid_config() {
    let config = ExtractConfig {
        asset_concurrency: 0,
        ..Default::default()
    };
    assert!(matches!(Extractor::new(config), Err(Error::Config(_))));
}
