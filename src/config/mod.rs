//! Configuration module for Sumi-Archive
//!
//! This module handles loading and validating the TOML configuration file
//! and layering capture options from the file, a named profile, command
//! line flags and URL list lines.
//!
//! # Example
//!
//! ```no_run
//! use sumi_archive::config::{build_capture_options, load_config};
//! use serde_json::Map;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sumi.toml")).unwrap();
//! let options = build_capture_options(&config, Some("deep"), &Map::new()).unwrap();
//! println!("Waiting for: {}", options.wait_until);
//! ```

mod overrides;
mod parser;
mod types;
mod validation;

pub use types::{Config, SchedulerConfig};

pub use overrides::{
    load_url_list, overlay, parse_flag_overrides, parse_url_line, split_words,
};
pub use parser::{build_capture_options, compute_config_hash, load_config, load_config_with_hash};
pub use validation::{validate_capture_options, validate_scheduler_config};
