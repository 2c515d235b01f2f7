//! Browser collaborator
//!
//! This module handles:
//! - Launching and stopping a local browser with remote debugging
//! - Connecting to an external DevTools endpoint
//! - Cookie inputs applied to capture sessions

mod cookies;
mod launcher;

pub use cookies::{
    load_cookies_file, parse_cookie_arg, parse_cookies, parse_netscape_cookies, Cookie,
    CookieError,
};
pub use launcher::{build_args, discover_ws_endpoint, find_executable, BrowserConfig, BrowserProcess};

use crate::cdp::{CdpClient, CdpError, Transport};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while starting or reaching a browser
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("No browser executable found; set browser.executable-path")]
    ExecutableNotFound,

    #[error("Failed to start browser {path}: {reason}")]
    Spawn { path: String, reason: String },

    #[error("No free remote debugging port available")]
    NoDebugPort,

    #[error("DevTools endpoint discovery failed: {0}")]
    Discovery(String),

    #[error("Protocol error: {0}")]
    Cdp(#[from] CdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The shared browser connection, plus the process when we launched it
pub struct Browser {
    transport: Arc<dyn Transport>,
    process: Option<BrowserProcess>,
}

impl Browser {
    /// Starts a local browser and connects to it
    pub async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let mut process = BrowserProcess::start(config).await?;
        match CdpClient::connect(process.ws_endpoint()).await {
            Ok(client) => Ok(Self {
                transport: Arc::new(client),
                process: Some(process),
            }),
            Err(e) => {
                process.stop().await;
                Err(e.into())
            }
        }
    }

    /// Connects to a browser someone else manages
    ///
    /// Accepts either a WebSocket URL or the HTTP base of the DevTools server.
    pub async fn connect_external(endpoint: &str) -> Result<Self, BrowserError> {
        let ws_url = if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
            endpoint.to_string()
        } else {
            discover_ws_endpoint(&reqwest::Client::new(), endpoint).await?
        };
        tracing::info!("Connecting to external browser at {}", ws_url);
        let client = CdpClient::connect(&ws_url).await?;
        Ok(Self {
            transport: Arc::new(client),
            process: None,
        })
    }

    /// Starts or connects depending on `config.remote_endpoint`
    pub async fn open(config: &BrowserConfig) -> Result<Self, BrowserError> {
        match &config.remote_endpoint {
            Some(endpoint) => Self::connect_external(endpoint).await,
            None => Self::launch(config).await,
        }
    }

    /// Wraps an existing transport; nothing is stopped on close
    pub fn from_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            process: None,
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn is_external(&self) -> bool {
        self.process.is_none()
    }

    /// Drops the connection but leaves an owned browser running
    pub fn detach(mut self) {
        if let Some(process) = self.process.take() {
            process.detach();
        }
    }

    /// Stops the browser process if we own one
    pub async fn close(mut self) {
        if let Some(mut process) = self.process.take() {
            tracing::info!("Stopping browser");
            process.stop().await;
        }
    }
}
