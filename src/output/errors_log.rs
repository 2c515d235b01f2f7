//! Error sink for failed captures

use super::traits::{OutputError, OutputResult};
use crate::capture::{CaptureError, CaptureOptions};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;

/// Formats one error log entry
///
/// ```text
/// [2024-01-01T00:00:00.000Z] URL: https://example.test/
/// Error: Load timeout after 60s waiting for networkIdle
/// Stack: ...
/// ```
pub fn format_error_entry(
    time: DateTime<Utc>,
    url: &str,
    error: &CaptureError,
    include_stack: bool,
) -> String {
    let mut entry = format!(
        "[{}] URL: {}\nError: {}\n",
        time.to_rfc3339_opts(SecondsFormat::Millis, true),
        url,
        error
    );
    if include_stack {
        if let Some(stack) = error.stack() {
            entry.push_str(&format!("Stack: {}\n", stack));
        }
    }
    entry
}

/// Appends an entry to the errors file, or logs it when there is none
pub async fn append_error_entry(
    url: &str,
    error: &CaptureError,
    options: &CaptureOptions,
) -> OutputResult<()> {
    let entry = format_error_entry(Utc::now(), url, error, !options.errors_traces_disabled);

    let Some(path) = &options.errors_file else {
        tracing::error!("{} ({})\n{}", error, error.code(), entry.trim_end());
        return Ok(());
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| OutputError::Write {
            path: path.display().to_string(),
            source,
        })?;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
