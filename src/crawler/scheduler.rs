//! Crawl scheduler
//!
//! This module handles:
//! - The task list, deduplicated by URL across the whole crawl
//! - A bounded pool of concurrent capture sessions
//! - Expansion of discovered links into child tasks under the depth policy
//! - Persisting the task list after every change

use super::task::Task;
use super::PageCapturer;
use crate::capture::{CaptureFailure, CaptureOptions, PageData};
use crate::config::SchedulerConfig;
use crate::output::{replace_urls_in_outputs, OutputHandler, SavedPage};
use crate::state::TaskStatus;
use crate::storage::SessionStore;
use crate::url::{parse_rewrite_rules, resolve_link, resolve_seed, rewrite_link};
use crate::SumiError;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;

/// A URL to capture, with its own options when a URL list line overrides them
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlInput {
    pub url: String,
    pub options: Option<CaptureOptions>,
}

impl CrawlInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: None,
        }
    }

    pub fn with_options(url: impl Into<String>, options: CaptureOptions) -> Self {
        Self {
            url: url.into(),
            options: Some(options),
        }
    }
}

/// Scheduler owns the crawl's task list and runs capture sessions for it
///
/// All task list mutations happen on the task driving [`Scheduler::run`];
/// only the captures themselves run concurrently.
pub struct Scheduler {
    /// Every task of the crawl, in discovery order
    tasks: Vec<Task>,

    /// Options for tasks that carry none of their own
    defaults: CaptureOptions,

    max_parallel_workers: usize,

    capturer: Arc<dyn PageCapturer>,

    output: Arc<dyn OutputHandler>,

    store: Box<dyn SessionStore>,

    /// Base for seed inputs given as relative file paths
    working_directory: PathBuf,

    processed: usize,
}

impl Scheduler {
    /// Creates a scheduler, resuming whatever the session store holds
    ///
    /// # Arguments
    ///
    /// * `defaults` - Capture options for seeds without their own
    /// * `config` - Worker pool configuration
    /// * `capturer` - Runs one capture per task
    /// * `output` - Persists results and failures
    /// * `store` - Session persistence
    pub fn new(
        defaults: CaptureOptions,
        config: &SchedulerConfig,
        capturer: Arc<dyn PageCapturer>,
        output: Arc<dyn OutputHandler>,
        store: Box<dyn SessionStore>,
    ) -> Result<Self, SumiError> {
        let tasks = store.load()?;
        if !tasks.is_empty() {
            let pending = tasks
                .iter()
                .filter(|task| task.status != TaskStatus::Processed)
                .count();
            tracing::info!("Resuming crawl: {} tasks, {} not processed", tasks.len(), pending);
        }

        Ok(Self {
            tasks,
            defaults,
            max_parallel_workers: config.max_parallel_workers.max(1),
            capturer,
            output,
            store,
            working_directory: std::env::current_dir()?,
            processed: 0,
        })
    }

    pub fn with_working_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.working_directory = directory.into();
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Enqueues `inputs` and runs until no task is left
    pub async fn capture(&mut self, inputs: Vec<CrawlInput>) -> Result<(), SumiError> {
        self.enqueue(inputs)?;
        self.run().await;
        Ok(())
    }

    /// Appends a seed task for each input whose URL no task has yet
    ///
    /// # Returns
    ///
    /// The number of tasks added
    pub fn enqueue(&mut self, inputs: Vec<CrawlInput>) -> Result<usize, SumiError> {
        let mut added = 0;
        for input in inputs {
            let url = resolve_seed(&input.url, &self.working_directory)?;
            if self.contains(&url) {
                tracing::debug!("Already known, not enqueuing {}", url);
                continue;
            }
            let options = input
                .options
                .unwrap_or_else(|| self.defaults.clone())
                .with_url(&url);
            self.tasks.push(Task::seed(url, options));
            added += 1;
        }
        if added > 0 {
            self.persist();
        }
        Ok(added)
    }

    /// Runs pending tasks, at most `max_parallel_workers` at a time
    ///
    /// Tasks discovered while running are picked up by the same pool.
    /// Returns once no task is pending or processing.
    pub async fn run(&mut self) {
        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < self.max_parallel_workers {
                let Some(index) = self.next_pending() else {
                    break;
                };
                let options = self.task_options(index);
                self.tasks[index].advance(TaskStatus::Processing);
                self.persist();

                tracing::debug!("Starting capture of {}", options.url);
                let capturer = Arc::clone(&self.capturer);
                let handle = tokio::spawn(async move {
                    let outcome = capturer.capture(&options).await;
                    (options, outcome)
                });
                running.push(async move { (index, handle.await) });
            }

            let Some((index, joined)) = running.next().await else {
                break;
            };
            match joined {
                Ok((options, outcome)) => self.complete(index, &options, outcome).await,
                Err(e) => {
                    tracing::error!("Capture of {} aborted: {}", self.tasks[index].url, e);
                    let task = &mut self.tasks[index];
                    task.error = Some(e.to_string());
                    task.advance(TaskStatus::Processed);
                    self.persist();
                }
            }
        }
    }

    /// Waits for outstanding work, rewrites links between saved pages and
    /// releases the browser
    pub async fn finish(&mut self) {
        self.run().await;

        if self.defaults.crawl_replace_urls && !self.defaults.compress_content {
            let pages: Vec<SavedPage> = self
                .tasks
                .iter()
                .filter_map(|task| {
                    Some(SavedPage {
                        original_url: task.original_url.clone(),
                        path: PathBuf::from(task.filename.as_ref()?),
                    })
                })
                .collect();
            tracing::info!("Replacing crawled URLs in {} saved pages", pages.len());
            replace_urls_in_outputs(&pages).await;
        }

        self.capturer.shutdown().await;
        tracing::info!(
            "Crawl finished: {} tasks, {} failed",
            self.tasks.len(),
            self.tasks.iter().filter(|task| task.error.is_some()).count()
        );
    }

    fn next_pending(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|task| task.status == TaskStatus::Pending)
    }

    fn contains(&self, url: &str) -> bool {
        self.tasks.iter().any(|task| task.url == url)
    }

    fn task_options(&self, index: usize) -> CaptureOptions {
        let task = &self.tasks[index];
        task.options
            .as_ref()
            .unwrap_or(&self.defaults)
            .with_url(&task.url)
    }

    async fn complete(
        &mut self,
        index: usize,
        options: &CaptureOptions,
        outcome: Result<PageData, CaptureFailure>,
    ) {
        match outcome {
            Ok(data) => {
                // A page that could not be saved counts as failed and is not expanded
                let saved = match self.output.write_page(&data, options).await {
                    Ok(path) => {
                        self.tasks[index].filename = path.map(|path| path.display().to_string());
                        true
                    }
                    Err(e) => {
                        tracing::error!("Failed to save {}: {}", options.url, e);
                        self.tasks[index].error = Some(e.to_string());
                        false
                    }
                };
                self.tasks[index].advance(TaskStatus::Processed);

                if saved && options.crawl_links && self.tasks[index].within_depth(options) {
                    self.expand(index, options, &data.links);
                }
            }
            Err(failure) => {
                if let Err(e) = self.output.record_failure(&options.url, &failure, options).await {
                    tracing::warn!("Failed to record error for {}: {}", options.url, e);
                }
                let task = &mut self.tasks[index];
                task.error = Some(failure.error.to_string());
                task.advance(TaskStatus::Processed);
            }
        }
        self.persist();

        self.processed += 1;
        if self.processed % 10 == 0 {
            tracing::info!(
                "Progress: {} captures done, {} tasks known",
                self.processed,
                self.tasks.len()
            );
        }
    }

    /// Turns the links found on a task's page into new tasks
    fn expand(&mut self, index: usize, options: &CaptureOptions, links: &[String]) {
        let rules = match parse_rewrite_rules(&options.crawl_rewrite_rules) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("Ignoring rewrite rules: {}", e);
                Vec::new()
            }
        };
        let parent = self.tasks[index].clone();

        let mut discovered: Vec<Task> = Vec::new();
        for link in links {
            let rewritten = rewrite_link(link, options.crawl_remove_url_fragment, &rules);
            let Some(url) = resolve_link(&rewritten, &parent.url) else {
                continue;
            };
            if self.contains(&url) || discovered.iter().any(|task| task.url == url) {
                continue;
            }
            // An explicit output file names the seed's page only
            let mut child_options = options.with_url(&url);
            child_options.output = None;
            let child = Task::child(url, &parent, child_options);
            if child.within_depth(options) && child.allowed_by(options) {
                discovered.push(child);
            }
        }

        if !discovered.is_empty() {
            tracing::debug!("Found {} new links on {}", discovered.len(), parent.url);
            self.tasks.extend(discovered);
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.tasks) {
            tracing::warn!("Failed to save crawl session: {}", e);
        }
    }
}
