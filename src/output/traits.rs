//! Output handler traits and types
//!
//! This module defines the trait interface the crawl scheduler uses to
//! persist capture results and failures.

use crate::capture::{CaptureFailure, CaptureOptions, PageData};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Where capture results and failures end up
#[async_trait]
pub trait OutputHandler: Send + Sync {
    /// Persists a captured page
    ///
    /// # Returns
    ///
    /// * `Ok(Some(path))` - The file that was written
    /// * `Ok(None)` - Nothing was written (dumped to stdout, or skipped on conflict)
    /// * `Err(OutputError)` - Writing failed
    async fn write_page(
        &self,
        data: &PageData,
        options: &CaptureOptions,
    ) -> OutputResult<Option<PathBuf>>;

    /// Records a failed capture
    async fn record_failure(
        &self,
        url: &str,
        failure: &CaptureFailure,
        options: &CaptureOptions,
    ) -> OutputResult<()>;
}
