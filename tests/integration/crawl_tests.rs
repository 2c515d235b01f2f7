//! Integration tests for the crawler
//!
//! These tests run the scheduler end-to-end, against the scripted browser
//! for full captures and against a scripted capturer for crawl policy and
//! session persistence.

use crate::support::{FakeBrowser, FakePage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sumi_archive::browser::Browser;
use sumi_archive::capture::{
    BrowserCapturer, CaptureError, CaptureFailure, CaptureOptions, PageData,
};
use sumi_archive::config::SchedulerConfig;
use sumi_archive::crawler::{CrawlInput, PageCapturer, Scheduler, Task};
use sumi_archive::output::FileOutput;
use sumi_archive::state::TaskStatus;
use sumi_archive::storage::{JsonSessionFile, NoSession, SessionMode, SessionStore};
use tempfile::TempDir;

/// Serves links from a fixed graph and records every capture
struct ScriptedCapturer {
    links: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    captured: Mutex<Vec<String>>,
}

impl ScriptedCapturer {
    fn new(graph: &[(&str, &[&str])]) -> Self {
        Self {
            links: graph
                .iter()
                .map(|(url, links)| {
                    (
                        url.to_string(),
                        links.iter().map(|link| link.to_string()).collect(),
                    )
                })
                .collect(),
            failing: Vec::new(),
            captured: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    fn captured(&self) -> Vec<String> {
        self.captured.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageCapturer for ScriptedCapturer {
    async fn capture(&self, options: &CaptureOptions) -> Result<PageData, CaptureFailure> {
        self.captured.lock().unwrap().push(options.url.clone());
        if self.failing.contains(&options.url) {
            return Err(CaptureError::Unreachable {
                url: options.url.clone(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            }
            .into());
        }
        let name = options.url.rsplit('/').next().unwrap_or("index");
        Ok(PageData {
            content: Some(sumi_archive::capture::PageContent::Text(format!(
                "<a href=\"{}\">",
                options.url
            ))),
            filename: Some(format!("{}.html", name)),
            links: self.links.get(&options.url).cloned().unwrap_or_default(),
            ..Default::default()
        })
    }
}

fn crawl_options(output_directory: &TempDir) -> CaptureOptions {
    CaptureOptions {
        crawl_links: true,
        output_directory: Some(output_directory.path().to_path_buf()),
        load_max_time: 300,
        ..Default::default()
    }
}

fn scheduler(
    defaults: CaptureOptions,
    capturer: Arc<dyn PageCapturer>,
    store: Box<dyn SessionStore>,
) -> Scheduler {
    Scheduler::new(
        defaults,
        &SchedulerConfig {
            max_parallel_workers: 3,
        },
        capturer,
        Arc::new(FileOutput::new()),
        store,
    )
    .expect("Failed to create scheduler")
}

fn urls(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|task| task.url.as_str()).collect()
}

#[tokio::test]
async fn test_full_crawl_through_browser() {
    let output = TempDir::new().unwrap();
    let fake = Arc::new(
        FakeBrowser::new()
            .with_page(
                "https://example.test/a",
                FakePage::linking(
                    "https://example.test/a",
                    &["/a", "/b", "https://other.test/c"],
                ),
            )
            .with_page(
                "https://example.test/b",
                FakePage::linking("https://example.test/b", &["https://example.test/a"]),
            ),
    );
    let capturer = Arc::new(BrowserCapturer::new(
        Browser::from_transport(fake.clone()),
        false,
    ));

    let options = CaptureOptions {
        crawl_max_depth: 1,
        ..crawl_options(&output)
    };
    let mut scheduler = scheduler(options, capturer, Box::new(NoSession));
    scheduler
        .capture(vec![CrawlInput::new("https://example.test/a")])
        .await
        .expect("Crawl failed");
    scheduler.finish().await;

    let tasks = scheduler.tasks();
    assert_eq!(
        urls(tasks),
        vec![
            "https://example.test/a",
            "https://example.test/b",
            "https://other.test/c"
        ]
    );
    assert!(tasks.iter().all(|task| task.status == TaskStatus::Processed));
    assert!(tasks.iter().all(|task| task.error.is_none()));

    // The self link is a duplicate of the seed
    let b = &tasks[1];
    assert_eq!(b.depth, 1);
    assert!(b.is_inner_link);
    assert_eq!(b.external_link_depth, -1);

    let external = &tasks[2];
    assert_eq!(external.depth, 1);
    assert!(!external.is_inner_link);
    assert_eq!(external.external_link_depth, 0);
    assert_eq!(external.root_url.as_deref(), Some("https://example.test/a"));

    for name in ["a.html", "b.html", "c.html"] {
        assert!(output.path().join(name).exists(), "{} not written", name);
    }
    assert_eq!(fake.targets_created(), 3);
    assert_eq!(fake.targets_closed(), 3);
}

#[tokio::test]
async fn test_depth_bound_stops_expansion() {
    let output = TempDir::new().unwrap();
    let capturer = Arc::new(ScriptedCapturer::new(&[
        ("https://example.test/a", &["https://example.test/b"]),
        ("https://example.test/b", &["https://example.test/c"]),
        ("https://example.test/c", &["https://example.test/d"]),
    ]));

    let mut scheduler = scheduler(crawl_options(&output), capturer.clone(), Box::new(NoSession));
    scheduler
        .capture(vec![CrawlInput::new("https://example.test/a")])
        .await
        .unwrap();

    assert_eq!(
        urls(scheduler.tasks()),
        vec!["https://example.test/a", "https://example.test/b"]
    );
    assert_eq!(capturer.captured().len(), 2);
}

#[tokio::test]
async fn test_inner_links_only_and_external_depth() {
    let output = TempDir::new().unwrap();
    let graph: &[(&str, &[&str])] = &[(
        "https://example.test/docs/",
        &["https://example.test/docs/x", "https://other.test/y"],
    )];

    let inner_only = CaptureOptions {
        crawl_inner_links_only: true,
        ..crawl_options(&output)
    };
    let mut scheduler = scheduler(
        inner_only,
        Arc::new(ScriptedCapturer::new(graph)),
        Box::new(NoSession),
    );
    scheduler
        .capture(vec![CrawlInput::new("https://example.test/docs/")])
        .await
        .unwrap();
    assert_eq!(
        urls(scheduler.tasks()),
        vec!["https://example.test/docs/", "https://example.test/docs/x"]
    );
}

#[tokio::test]
async fn test_failed_capture_is_recorded_not_retried() {
    let output = TempDir::new().unwrap();
    let errors_file = output.path().join("errors.log");
    let capturer = Arc::new(
        ScriptedCapturer::new(&[(
            "https://example.test/a",
            &["https://example.test/broken", "https://example.test/ok"],
        )])
        .failing("https://example.test/broken"),
    );
    let options = CaptureOptions {
        errors_file: Some(errors_file.clone()),
        ..crawl_options(&output)
    };

    let mut scheduler = scheduler(options, capturer.clone(), Box::new(NoSession));
    scheduler
        .capture(vec![CrawlInput::new("https://example.test/a")])
        .await
        .unwrap();

    let broken = scheduler
        .tasks()
        .iter()
        .find(|task| task.url == "https://example.test/broken")
        .unwrap();
    assert_eq!(broken.status, TaskStatus::Processed);
    assert!(broken.error.as_deref().unwrap().contains("ERR_CONNECTION_REFUSED"));
    assert_eq!(
        capturer
            .captured()
            .iter()
            .filter(|url| url.as_str() == "https://example.test/broken")
            .count(),
        1
    );

    let log = std::fs::read_to_string(&errors_file).unwrap();
    assert!(log.contains("URL: https://example.test/broken"));
    assert!(!log.contains("https://example.test/ok"));
}

#[tokio::test]
async fn test_session_round_trip() {
    let output = TempDir::new().unwrap();
    let session = output.path().join("session.json");
    let capturer = Arc::new(ScriptedCapturer::new(&[(
        "https://example.test/a",
        &["https://example.test/b"],
    )]));

    let mut first = scheduler(
        crawl_options(&output),
        capturer,
        Box::new(JsonSessionFile::new(&session, SessionMode::Save)),
    );
    first
        .capture(vec![CrawlInput::new("https://example.test/a")])
        .await
        .unwrap();

    let stored = JsonSessionFile::new(&session, SessionMode::Load)
        .load()
        .expect("Session file should load");
    assert_eq!(urls(&stored), urls(first.tasks()));
    assert!(stored.iter().all(|task| task.status == TaskStatus::Processed));
    assert!(stored.iter().all(|task| task.options.is_none()));
    assert!(stored.iter().all(|task| task.filename.is_some()));
}

#[tokio::test]
async fn test_resume_skips_processed_and_dedups_seeds() {
    let output = TempDir::new().unwrap();
    let session = output.path().join("session.json");
    let defaults = crawl_options(&output);

    let mut done = Task::seed("https://example.test/a", defaults.clone());
    done.status = TaskStatus::Processed;
    done.options = None;
    let mut interrupted = Task::child("https://example.test/b", &done, defaults.clone());
    interrupted.status = TaskStatus::Processing;
    let pending = Task::child("https://example.test/c", &done, defaults.clone());
    JsonSessionFile::new(&session, SessionMode::Save)
        .save(&[done, interrupted, pending])
        .unwrap();

    let capturer = Arc::new(ScriptedCapturer::new(&[]));
    let mut resumed = scheduler(
        defaults,
        capturer.clone(),
        Box::new(JsonSessionFile::new(&session, SessionMode::Sync)),
    );
    assert_eq!(resumed.tasks().len(), 3);

    resumed
        .capture(vec![CrawlInput::new("https://example.test/a")])
        .await
        .unwrap();

    let mut captured = capturer.captured();
    captured.sort();
    assert_eq!(
        captured,
        vec!["https://example.test/b", "https://example.test/c"]
    );
    assert_eq!(resumed.tasks().len(), 3);

    let stored = JsonSessionFile::new(&session, SessionMode::Load).load().unwrap();
    assert!(stored.iter().all(|task| task.status == TaskStatus::Processed));
}

#[tokio::test]
async fn test_load_mode_requires_session_file() {
    let output = TempDir::new().unwrap();
    let result = Scheduler::new(
        CaptureOptions::default(),
        &SchedulerConfig::default(),
        Arc::new(ScriptedCapturer::new(&[])),
        Arc::new(FileOutput::new()),
        Box::new(JsonSessionFile::new(
            output.path().join("missing.json"),
            SessionMode::Load,
        )),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_replace_urls_between_saved_pages() {
    let output = TempDir::new().unwrap();
    let capturer = Arc::new(ScriptedCapturer::new(&[(
        "https://example.test/a",
        &["https://example.test/b"],
    )]));
    let options = CaptureOptions {
        crawl_replace_urls: true,
        ..crawl_options(&output)
    };

    let mut scheduler = scheduler(options, capturer, Box::new(NoSession));
    scheduler
        .capture(vec![CrawlInput::new("https://example.test/a")])
        .await
        .unwrap();
    scheduler.finish().await;

    // Each page links to itself; the saved copy points at its own file
    let a = std::fs::read_to_string(output.path().join("a.html")).unwrap();
    assert_eq!(a, "<a href=\"a.html\">");
}
