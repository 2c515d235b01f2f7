//! JSON session file
//!
//! The file holds the task array. Processed tasks are stored without their
//! options, and an in-flight task is stored as pending so a resumed crawl
//! picks it up again.

use super::traits::{SessionStore, StorageError, StorageResult};
use crate::crawler::Task;
use crate::state::TaskStatus;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// How a session file is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Resume from the file, which must exist; never written
    Load,
    /// Write progress only
    Save,
    /// Resume when the file exists, then keep it up to date
    Sync,
}

impl SessionMode {
    pub fn reads(&self) -> bool {
        matches!(self, Self::Load | Self::Sync)
    }

    pub fn writes(&self) -> bool {
        matches!(self, Self::Save | Self::Sync)
    }
}

/// Session persistence in a JSON file
#[derive(Debug, Clone)]
pub struct JsonSessionFile {
    path: PathBuf,
    mode: SessionMode,
}

impl JsonSessionFile {
    pub fn new(path: impl Into<PathBuf>, mode: SessionMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }
}

/// The form a task takes in the session file
pub fn stored_task(task: &Task) -> Task {
    let mut stored = task.clone();
    if task.status == TaskStatus::Processed {
        stored.options = None;
    }
    stored
}

impl SessionStore for JsonSessionFile {
    fn load(&self) -> StorageResult<Vec<Task>> {
        if !self.mode.reads() {
            return Ok(Vec::new());
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return match self.mode {
                    SessionMode::Load => Err(StorageError::NotFound(self.path.display().to_string())),
                    _ => Ok(Vec::new()),
                };
            }
            Err(e) => return Err(e.into()),
        };
        let tasks: Vec<Task> = match serde_json::from_str(&content) {
            Ok(tasks) => tasks,
            Err(e) if self.mode == SessionMode::Sync => {
                tracing::warn!(
                    "Ignoring unreadable session file {}: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            "Loaded {} tasks from session file {}",
            tasks.len(),
            self.path.display()
        );
        Ok(tasks)
    }

    fn save(&mut self, tasks: &[Task]) -> StorageResult<()> {
        if !self.mode.writes() {
            return Ok(());
        }
        let stored: Vec<Task> = tasks.iter().map(stored_task).collect();
        let content = serde_json::to_string(&stored)?;

        // Replaced by rename so an interrupted write never truncates the session
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(directory)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
