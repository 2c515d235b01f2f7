//! Output module for capture results
//!
//! This module handles:
//! - Writing captured documents or their JSON envelope to disk
//! - Recording failed captures in the error sink
//! - Rewriting links between crawled pages to their saved files

mod errors_log;
mod rewrite;
mod traits;
mod writer;

pub use errors_log::{append_error_entry, format_error_entry};
pub use rewrite::{reference_from, replace_url_references, replace_urls_in_outputs, SavedPage};
pub use traits::{OutputError, OutputHandler, OutputResult};
pub use writer::{json_envelope, resolve_output_path, ConflictAction, FileOutput};
