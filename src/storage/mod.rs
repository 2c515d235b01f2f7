//! Storage module for persisting crawl sessions
//!
//! This module handles:
//! - The session store interface used by the crawl scheduler
//! - JSON session files in load, save and sync modes
//! - Crawl resumption from a previously saved task list

mod json_file;
mod traits;

pub use json_file::{stored_task, JsonSessionFile, SessionMode};
pub use traits::{NoSession, SessionStore, StorageError, StorageResult};

use std::path::Path;

/// Opens the session store for the given file and mode
///
/// # Arguments
///
/// * `path` - Session file, or `None` to keep nothing
/// * `mode` - How the file is used
///
/// # Returns
///
/// A boxed store ready to hand to the scheduler
pub fn open_session_store(path: Option<&Path>, mode: SessionMode) -> Box<dyn SessionStore> {
    match path {
        Some(path) => Box::new(JsonSessionFile::new(path, mode)),
        None => Box::new(NoSession),
    }
}
