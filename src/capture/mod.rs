//! Page capture sessions
//!
//! This module handles:
//! - Per-tab setup before navigation (emulation, interception, injected scripts)
//! - Navigation and resolution of the top frame's isolated-world context
//! - Extraction with chunked result reassembly and in-page service requests
//! - The session state machine and the readiness fallback ladder

mod configurator;
mod error;
mod extraction;
mod interception;
mod navigation;
mod options;
mod page_data;
mod readiness;
mod scripts;
mod session;

pub use configurator::{configure, interception_rules, media_features};
pub use error::{CaptureError, CaptureFailure, LOAD_TIMEOUT_ERROR};
pub use extraction::{extract, ChunkAssembler, ServiceContext};
pub use interception::{
    console_message, ConsoleCollector, DocumentTracker, InterceptionRules, Interceptor,
};
pub use navigation::{resolve_context, ContextTracker, Signal};
pub use options::{CaptureOptions, DEFAULT_READINESS_LADDER, ISOLATED_WORLD_NAME};
pub use page_data::{ConsoleMessage, HttpInfo, PageContent, PageData};
pub use readiness::{Readiness, ReadinessLadder};
pub use scripts::{
    extraction_expression, glue_script, presence_expression, resolver_call, ScriptBundle,
    FETCH_BINDING, PAGE_DATA_BINDING, PDF_BINDING, SCREENSHOT_BINDING,
};
pub use session::{capture_page, CaptureSession};

use crate::browser::Browser;
use crate::cdp::Transport;
use crate::crawler::PageCapturer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Captures pages in tabs of one shared browser
pub struct BrowserCapturer {
    transport: Arc<dyn Transport>,
    services: ServiceContext,
    browser: Mutex<Option<Browser>>,
    keep_open: bool,
}

impl BrowserCapturer {
    /// # Arguments
    ///
    /// * `browser` - The shared browser; every session opens its own tab in it
    /// * `keep_open` - Leave the browser running on shutdown (debug mode)
    pub fn new(browser: Browser, keep_open: bool) -> Self {
        Self {
            transport: browser.transport(),
            services: ServiceContext::default(),
            browser: Mutex::new(Some(browser)),
            keep_open,
        }
    }
}

#[async_trait]
impl PageCapturer for BrowserCapturer {
    async fn capture(&self, options: &CaptureOptions) -> Result<PageData, CaptureFailure> {
        capture_page(Arc::clone(&self.transport), options, &self.services).await
    }

    async fn shutdown(&self) {
        let Some(browser) = self.browser.lock().await.take() else {
            return;
        };
        if self.keep_open {
            browser.detach();
        } else {
            browser.close().await;
        }
    }
}
