use super::page_data::ConsoleMessage;
use crate::cdp::CdpError;
use crate::state::SessionState;
use std::time::Duration;
use thiserror::Error;

/// Error code of a load timeout, the only failure that triggers fallback
pub const LOAD_TIMEOUT_ERROR: &str = "ERR_LOAD_TIMEOUT";

/// Failures of a single capture session
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Setup failed during {step}: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: CdpError,
    },

    #[error("Load timeout after {timeout:?} waiting for {condition}")]
    LoadTimeout { condition: String, timeout: Duration },

    #[error("Unreachable URL {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Execution context not found")]
    ContextNotFound,

    #[error("{message}")]
    Extraction {
        message: String,
        stack: Option<String>,
    },

    #[error("Capture timeout after {timeout:?}")]
    CaptureTimeout { timeout: Duration },

    #[error("Protocol error: {0}")]
    Protocol(#[from] CdpError),

    #[error("Invalid page data: {0}")]
    InvalidPageData(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Failed to read script {path}: {reason}")]
    Script { path: String, reason: String },
}

impl CaptureError {
    /// Stable identifier of the failure class
    pub fn code(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "ERR_SETUP",
            Self::LoadTimeout { .. } => LOAD_TIMEOUT_ERROR,
            Self::Unreachable { .. } => "ERR_UNREACHABLE",
            Self::ContextNotFound => "ERR_CONTEXT_NOT_FOUND",
            Self::Extraction { .. } => "ERR_EXTRACTION",
            Self::CaptureTimeout { .. } => "ERR_CAPTURE_TIMEOUT",
            Self::Protocol(_) => "ERR_PROTOCOL",
            Self::InvalidPageData(_) => "ERR_INVALID_PAGE_DATA",
            Self::InvalidTransition { .. } => "ERR_INVALID_TRANSITION",
            Self::Script { .. } => "ERR_SCRIPT",
        }
    }

    pub fn is_load_timeout(&self) -> bool {
        matches!(self, Self::LoadTimeout { .. })
    }

    /// Stack trace reported by the page, if any
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::Extraction { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

/// A failed capture with the console output collected before it failed
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CaptureFailure {
    #[source]
    pub error: CaptureError,
    pub console_messages: Vec<ConsoleMessage>,
}

impl From<CaptureError> for CaptureFailure {
    fn from(error: CaptureError) -> Self {
        Self {
            error,
            console_messages: Vec::new(),
        }
    }
}
