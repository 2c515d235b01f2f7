//! Capture result files
//!
//! This module handles:
//! - Choosing the output filename and resolving conflicts with existing files
//! - The JSON envelope written instead of the raw document
//! - Dumping content to stdout
//! - The console messages file

use super::errors_log::append_error_entry;
use super::traits::{OutputError, OutputHandler, OutputResult};
use crate::capture::{CaptureFailure, CaptureOptions, PageContent, PageData};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Envelope keys that only matter inside the archived document
const ENVELOPE_DROPPED_KEYS: &[&str] = &["doctype", "viewport", "comment"];

/// What to do when the output file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictAction {
    /// Append ` (2)`, ` (3)`, ... before the extension
    #[default]
    Uniquify,
    Overwrite,
    /// Do not write anything
    Skip,
}

/// Picks the path a result is written to
///
/// # Arguments
///
/// * `filename` - Requested filename, relative to `directory` unless absolute
/// * `directory` - Output directory, if any
/// * `action` - Conflict policy when the path already exists
///
/// # Returns
///
/// `None` when the file exists and `action` is `Skip`.
pub async fn resolve_output_path(
    filename: &str,
    directory: Option<&Path>,
    action: ConflictAction,
) -> Option<PathBuf> {
    let base = match directory {
        Some(directory) => directory.join(filename),
        None => PathBuf::from(filename),
    };
    if action == ConflictAction::Overwrite {
        return Some(base);
    }

    let mut index = 1;
    loop {
        let candidate = if index == 1 {
            base.clone()
        } else {
            uniquified(&base, index)
        };
        let exists = tokio::fs::try_exists(&candidate).await.unwrap_or(false);
        if !exists {
            return Some(candidate);
        }
        if action == ConflictAction::Skip {
            tracing::info!("Skipping existing file {}", candidate.display());
            return None;
        }
        index += 1;
    }
}

fn uniquified(path: &Path, index: u32) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], index, &name[dot..]),
        _ => format!("{} ({})", name, index),
    };
    path.with_file_name(renamed)
}

/// Serializes page data as the JSON envelope
///
/// Binary content moves to `binaryContent` as base64.
pub fn json_envelope(data: &PageData) -> Result<String, serde_json::Error> {
    let mut envelope = serde_json::to_value(data)?;
    if let Value::Object(map) = &mut envelope {
        if let Some(PageContent::Binary(bytes)) = &data.content {
            map.remove("content");
            map.insert("binaryContent".to_string(), json!(BASE64.encode(bytes)));
        }
        for key in ENVELOPE_DROPPED_KEYS {
            map.remove(*key);
        }
    }
    serde_json::to_string_pretty(&envelope)
}

/// Writes results to the filesystem
#[derive(Debug, Clone, Default)]
pub struct FileOutput;

impl FileOutput {
    pub fn new() -> Self {
        Self
    }

    async fn write_console_messages(
        &self,
        data: &PageData,
        options: &CaptureOptions,
    ) -> OutputResult<()> {
        let Some(path) = &options.console_messages_file else {
            return Ok(());
        };
        if data.console_messages.is_empty() {
            return Ok(());
        }
        let content = serde_json::to_string_pretty(&data.console_messages)?;
        write_file(path, content.as_bytes()).await
    }
}

#[async_trait]
impl OutputHandler for FileOutput {
    async fn write_page(
        &self,
        data: &PageData,
        options: &CaptureOptions,
    ) -> OutputResult<Option<PathBuf>> {
        self.write_console_messages(data, options).await?;

        let content: Vec<u8> = if options.output_json {
            json_envelope(data)?.into_bytes()
        } else {
            data.content
                .as_ref()
                .map(|content| content.as_bytes().to_vec())
                .unwrap_or_default()
        };

        let requested = match (&options.output, &data.filename) {
            (Some(output), _) => output.to_string_lossy().into_owned(),
            (None, _) if options.dump_content => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&content).await?;
                if !options.compress_content {
                    stdout.write_all(b"\n").await?;
                }
                stdout.flush().await?;
                return Ok(None);
            }
            (None, Some(filename)) => filename.clone(),
            (None, None) => {
                tracing::warn!("No filename for {}, nothing written", options.url);
                return Ok(None);
            }
        };
        let requested = if options.output_json && !requested.ends_with(".json") {
            format!("{}.json", requested)
        } else {
            requested
        };

        let Some(path) = resolve_output_path(
            &requested,
            options.output_directory.as_deref(),
            options.filename_conflict_action,
        )
        .await
        else {
            return Ok(None);
        };

        write_file(&path, &content).await?;
        tracing::info!("Saved {} to {}", options.url, path.display());
        Ok(Some(path))
    }

    async fn record_failure(
        &self,
        url: &str,
        failure: &CaptureFailure,
        options: &CaptureOptions,
    ) -> OutputResult<()> {
        append_error_entry(url, &failure.error, options).await
    }
}

/// Writes `content`, creating parent directories first
async fn write_file(path: &Path, content: &[u8]) -> OutputResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| OutputError::Write {
                path: parent.display().to_string(),
                source,
            })?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|source| OutputError::Write {
            path: path.display().to_string(),
            source,
        })
}
