//! Sumi-Archive: single-file page capture over the DevTools protocol
//!
//! This crate drives a Chromium-family browser to capture web pages as
//! self-contained documents. It runs one capture session per page, waits for
//! a configurable readiness condition with fallback, and can crawl the links
//! it finds under depth limits, resuming from a saved session.

pub mod browser;
pub mod capture;
pub mod cdp;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Archive operations
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Protocol error: {0}")]
    Cdp(#[from] cdp::CdpError),

    #[error("Capture failed: {0}")]
    Capture(#[from] capture::CaptureError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Malformed URL: {0}")]
    Malformed(String),

    #[error("Invalid rewrite rule: {0}")]
    InvalidRewriteRule(String),
}

/// Result type alias for Sumi-Archive operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use capture::{capture_page, CaptureOptions, PageData};
pub use config::Config;
pub use crawler::{CrawlInput, Scheduler, Task};
pub use state::{SessionState, TaskStatus};
