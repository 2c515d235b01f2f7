//! Storage traits and error types
//!
//! This module defines the trait interface for crawl session persistence and
//! associated error types.

use crate::crawler::Task;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session file not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for crawl session backends
///
/// The scheduler calls `save` after every change to its task list, always
/// from a single logical thread, so implementations need no locking.
pub trait SessionStore: Send {
    /// Loads the tasks of a previous crawl
    ///
    /// # Returns
    ///
    /// * `Ok(tasks)` - The stored tasks, empty when there is nothing to resume
    /// * `Err(StorageError)` - The session could not be read
    fn load(&self) -> StorageResult<Vec<Task>>;

    /// Replaces the stored session with `tasks`
    fn save(&mut self, tasks: &[Task]) -> StorageResult<()>;
}

/// A store that remembers nothing
#[derive(Debug, Default)]
pub struct NoSession;

impl SessionStore for NoSession {
    fn load(&self) -> StorageResult<Vec<Task>> {
        Ok(Vec::new())
    }

    fn save(&mut self, _tasks: &[Task]) -> StorageResult<()> {
        Ok(())
    }
}
