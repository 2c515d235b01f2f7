//! DevTools protocol plumbing
//!
//! This module handles:
//! - The `Transport` seam between capture sessions and the browser connection
//! - A WebSocket client multiplexing flattened target sessions
//! - Per-tab `Target` handles that filter events down to their own session

mod client;
mod target;

pub use client::{build_cdp_message, parse_incoming, CdpClient, Incoming};
pub use target::{SessionHandle, Target, TargetEvents};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Default time a single protocol command may take before it is abandoned
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by the protocol layer
#[derive(Debug, Error)]
pub enum CdpError {
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Protocol error {code} in {method}: {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("Command {method} timed out after {duration:?}")]
    Timeout { method: String, duration: Duration },

    #[error("Session {session_id} fell behind and lost {skipped} events")]
    EventsLagged { session_id: String, skipped: u64 },

    #[error("Protocol failure: {0}")]
    Protocol(String),
}

/// An event received from the browser
///
/// `session_id` is `None` for browser-level events.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    pub session_id: Option<String>,
    pub method: String,
    pub params: Value,
}

/// Request/response calls and event subscription against a browser connection
///
/// Implemented by [`CdpClient`] for a live browser and by scripted fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a command, addressed to a target session when `session_id` is set
    async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, CdpError>;

    /// Subscribes to every event received from now on
    fn subscribe(&self) -> broadcast::Receiver<CdpEvent>;
}
