//! Crawler module for multi-page captures
//!
//! This module contains the crawl logic, including:
//! - Task records and their place in the crawl tree
//! - Link classification and depth limits
//! - The bounded worker pool driving capture sessions
//! - Session persistence for resumable crawls

mod scheduler;
mod task;

pub use scheduler::{CrawlInput, Scheduler};
pub use task::Task;

use crate::capture::{CaptureFailure, CaptureOptions, PageData};
use async_trait::async_trait;

/// Captures a single page for the scheduler
///
/// The browser-backed implementation is `capture::BrowserCapturer`; tests
/// substitute scripted ones.
#[async_trait]
pub trait PageCapturer: Send + Sync {
    async fn capture(&self, options: &CaptureOptions) -> Result<PageData, CaptureFailure>;

    /// Releases shared resources once the crawl is done
    async fn shutdown(&self) {}
}
