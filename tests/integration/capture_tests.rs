//! Integration tests for capture sessions
//!
//! These tests drive `capture_page` against the scripted browser in
//! `support` and check the readiness fallback, chunk reassembly and
//! failure handling end-to-end.

use crate::support::{FakeBrowser, FakePage, RENAVIGATE};
use serde_json::json;
use std::sync::Arc;
use sumi_archive::capture::{capture_page, CaptureOptions, PageContent, ServiceContext};

const PAGE: &str = "https://example.test/article";

fn options(url: &str) -> CaptureOptions {
    CaptureOptions {
        url: url.to_string(),
        load_max_time: 300,
        capture_max_time: 2_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_capture_single_page() {
    let browser = Arc::new(FakeBrowser::new().with_page(
        PAGE,
        FakePage::linking(PAGE, &["https://example.test/next"]),
    ));

    let data = capture_page(browser.clone(), &options(PAGE), &ServiceContext::default())
        .await
        .expect("capture should succeed");

    assert_eq!(
        data.content,
        Some(PageContent::Text(format!("<html><body>{}</body></html>", PAGE)))
    );
    assert_eq!(data.filename.as_deref(), Some("article.html"));
    assert_eq!(data.links, vec!["https://example.test/next"]);

    assert_eq!(browser.targets_created(), 1);
    assert_eq!(browser.targets_closed(), 1);
    assert_eq!(browser.navigations(), vec![PAGE]);
}

#[tokio::test]
async fn test_fallback_to_next_readiness_condition() {
    // networkIdle never fires, networkAlmostIdle does
    let page = FakePage::linking(PAGE, &[]).with_lifecycle(&[
        "DOMContentLoaded",
        "load",
        "networkAlmostIdle",
    ]);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));

    let data = capture_page(browser.clone(), &options(PAGE), &ServiceContext::default())
        .await
        .expect("fallback capture should succeed");

    assert_eq!(data.filename.as_deref(), Some("article.html"));
    assert_eq!(browser.targets_created(), 2);
    assert_eq!(browser.targets_closed(), 2);
    assert_eq!(browser.navigations().len(), 2);
}

#[tokio::test]
async fn test_load_timeout_without_fallback() {
    let page = FakePage::linking(PAGE, &[]).with_lifecycle(&["DOMContentLoaded", "load"]);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));
    let options = CaptureOptions {
        wait_until_fallback: false,
        ..options(PAGE)
    };

    let failure = capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect_err("capture should time out");

    assert_eq!(failure.error.code(), "ERR_LOAD_TIMEOUT");
    assert_eq!(browser.targets_created(), 1);
    assert_eq!(browser.targets_closed(), 1);
}

#[tokio::test]
async fn test_ladder_exhaustion_reports_last_timeout() {
    let page = FakePage::linking(PAGE, &[]).with_lifecycle(&[]);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));
    let options = CaptureOptions {
        wait_until: "load".to_string(),
        load_max_time: 100,
        ..options(PAGE)
    };

    let failure = capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect_err("no condition is ever reached");

    assert!(failure.error.is_load_timeout());
    // load, then DOMContentLoaded
    assert_eq!(browser.targets_created(), 2);
    assert!(failure.error.to_string().contains("DOMContentLoaded"));
}

#[tokio::test]
async fn test_chunked_result_is_reassembled() {
    let content = "é".repeat(500) + &"x".repeat(777);
    let page = FakePage::new(json!({
        "content": content,
        "filename": "big.html",
        "links": [],
    }))
    .with_chunk_size(7);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));

    let data = capture_page(browser, &options(PAGE), &ServiceContext::default())
        .await
        .expect("capture should succeed");

    assert_eq!(data.content, Some(PageContent::Text(content)));
}

#[tokio::test]
async fn test_unreachable_url_is_not_retried() {
    let browser = Arc::new(
        FakeBrowser::new().with_page(PAGE, FakePage::unreachable("net::ERR_NAME_NOT_RESOLVED")),
    );

    let failure = capture_page(browser.clone(), &options(PAGE), &ServiceContext::default())
        .await
        .expect_err("capture should fail");

    assert_eq!(failure.error.code(), "ERR_UNREACHABLE");
    assert_eq!(browser.targets_created(), 1);
    assert_eq!(browser.targets_closed(), 1);
}

#[tokio::test]
async fn test_extractor_exception_carries_stack() {
    let page = FakePage::linking(PAGE, &[])
        .throwing("Error: document has no body\n    at getPageData (single-file.js:10:5)");
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));

    let failure = capture_page(browser.clone(), &options(PAGE), &ServiceContext::default())
        .await
        .expect_err("extraction should fail");

    assert_eq!(failure.error.code(), "ERR_EXTRACTION");
    assert_eq!(failure.error.to_string(), "Error: document has no body");
    assert!(failure.error.stack().unwrap().contains("single-file.js"));
    assert_eq!(browser.targets_created(), 1);
}

#[tokio::test]
async fn test_setup_applies_requested_settings() {
    let browser = Arc::new(FakeBrowser::new());
    let options = CaptureOptions {
        mobile_emulation: true,
        http_headers: [("X-Archive".to_string(), "1".to_string())].into(),
        emulate_media_features: vec!["prefers-color-scheme:dark".to_string()],
        ..options(PAGE)
    };

    capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect("capture should succeed");

    let commands = browser.commands();
    for expected in [
        "Page.enable",
        "Page.setBypassCSP",
        "Emulation.setDeviceMetricsOverride",
        "Emulation.setUserAgentOverride",
        "Network.setExtraHTTPHeaders",
        "Emulation.setEmulatedMedia",
        "Browser.setDownloadBehavior",
        "Page.addScriptToEvaluateOnNewDocument",
    ] {
        assert!(commands.iter().any(|c| c == expected), "missing {}", expected);
    }
    let enable = commands.iter().position(|c| c == "Page.enable").unwrap();
    let navigate = commands.iter().position(|c| c == "Page.navigate").unwrap();
    assert!(enable < navigate);
    assert!(!commands.iter().any(|c| c == "Fetch.enable"));
}

#[tokio::test]
async fn test_debug_keeps_tab_open() {
    let browser = Arc::new(FakeBrowser::new());
    let options = CaptureOptions {
        debug: true,
        ..options(PAGE)
    };

    capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect("capture should succeed");

    assert_eq!(browser.targets_created(), 1);
    assert_eq!(browser.targets_closed(), 0);
}

#[tokio::test]
async fn test_capture_timeout_closes_tab_without_retry() {
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, FakePage::linking(PAGE, &[]).stalling()));
    let options = CaptureOptions {
        capture_max_time: 200,
        ..options(PAGE)
    };

    let failure = capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect_err("extraction never finishes");

    assert_eq!(failure.error.code(), "ERR_CAPTURE_TIMEOUT");
    assert_eq!(browser.targets_created(), 1);
    assert_eq!(browser.targets_closed(), 1);
}

#[tokio::test]
async fn test_missing_extractor_is_context_not_found() {
    let browser = Arc::new(
        FakeBrowser::new().with_page(PAGE, FakePage::linking(PAGE, &[]).without_extractor()),
    );

    let failure = capture_page(browser.clone(), &options(PAGE), &ServiceContext::default())
        .await
        .expect_err("no context has the extractor");

    assert_eq!(failure.error.code(), "ERR_CONTEXT_NOT_FOUND");
    assert_eq!(browser.targets_created(), 1);
    assert_eq!(browser.targets_closed(), 1);
}

#[tokio::test]
async fn test_slow_context_probe_counts_against_load_timeout() {
    let page = FakePage::linking(PAGE, &[]).with_slow_probe(5_000);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));
    let options = CaptureOptions {
        wait_until_fallback: false,
        ..options(PAGE)
    };

    let started = std::time::Instant::now();
    let failure = capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect_err("the probe outlives the load timeout");

    assert_eq!(failure.error.code(), "ERR_LOAD_TIMEOUT");
    assert!(started.elapsed() < std::time::Duration::from_secs(3));
    assert_eq!(browser.targets_created(), 1);
}

#[tokio::test]
async fn test_early_lifecycle_event_settles() {
    // InteractiveTime comes before networkIdle on the ladder; networkIdle never fires
    let page = FakePage::linking(PAGE, &[]).with_lifecycle(&["DOMContentLoaded", "InteractiveTime"]);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));
    let options = CaptureOptions {
        lifecycle_settle_delay: 50,
        load_max_time: 2_000,
        wait_until_fallback: false,
        ..options(PAGE)
    };

    let data = capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect("settled capture should succeed");

    assert_eq!(data.filename.as_deref(), Some("article.html"));
    assert_eq!(browser.targets_created(), 1);
}

#[tokio::test]
async fn test_new_navigation_cancels_settle_delay() {
    let page = FakePage::linking(PAGE, &[]).with_lifecycle(&["InteractiveTime", RENAVIGATE]);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));
    let options = CaptureOptions {
        lifecycle_settle_delay: 50,
        load_max_time: 400,
        wait_until_fallback: false,
        ..options(PAGE)
    };

    let failure = capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect_err("the settle delay was voided by the new navigation");

    assert_eq!(failure.error.code(), "ERR_LOAD_TIMEOUT");
}

#[tokio::test]
async fn test_screenshot_and_pdf_requests_are_answered() {
    let page = FakePage::linking(PAGE, &[]).calling(&["__sumiScreenshot", "__sumiPdf"]);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));
    let options = CaptureOptions {
        screenshot_options: json!({ "format": "png" }),
        ..options(PAGE)
    };

    capture_page(browser.clone(), &options, &ServiceContext::default())
        .await
        .expect("capture should succeed");

    let commands = browser.commands();
    assert!(commands.iter().any(|c| c == "Page.captureScreenshot"));
    assert!(commands.iter().any(|c| c == "Page.printToPDF"));

    let expressions = browser.expressions();
    assert!(expressions
        .iter()
        .any(|e| e == "globalThis[\"__sumiResolveScreenshot\"](\"U0NSRUVO\")"));
    assert!(expressions
        .iter()
        .any(|e| e == "globalThis[\"__sumiResolvePdf\"](\"JVBERi0=\")"));
}

#[tokio::test]
async fn test_console_output_is_collected() {
    let page = FakePage::linking(PAGE, &[]).logging(&["hydrating", "ready"]);
    let browser = Arc::new(FakeBrowser::new().with_page(PAGE, page));

    let data = capture_page(browser, &options(PAGE), &ServiceContext::default())
        .await
        .expect("capture should succeed");

    let lines: Vec<&str> = data
        .console_messages
        .iter()
        .map(|message| message.text.as_str())
        .collect();
    assert_eq!(lines, vec!["hydrating", "ready"]);
}
