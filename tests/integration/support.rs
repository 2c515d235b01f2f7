//! Scripted in-process browser for capture tests
//!
//! `FakeBrowser` answers the protocol commands a capture session sends and
//! plays back the events a real tab would emit for each configured page.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use sumi_archive::cdp::{CdpError, CdpEvent, Transport};
use tokio::sync::broadcast;

const ISOLATED_WORLD: &str = "singlefile";
const PAGE_DATA_BINDING: &str = "__sumiPageData";

/// Lifecycle entry that makes the top frame navigate again instead
pub const RENAVIGATE: &str = "#renavigate";

/// How one URL behaves when a tab navigates to it
#[derive(Debug, Clone)]
pub struct FakePage {
    /// Lifecycle event names emitted for the top frame, in order
    pub lifecycle: Vec<&'static str>,
    /// Navigation error text, for pages that cannot be reached
    pub error_text: Option<String>,
    /// Serialized page data returned by the extractor
    pub result: String,
    /// Characters per streamed chunk
    pub chunk_size: usize,
    /// Exception description thrown by the extractor instead of a result
    pub exception: Option<String>,
    /// The extractor never settles
    pub stalls: bool,
    /// No isolated world answers the presence check
    pub extractor_missing: bool,
    /// Service bindings the extractor calls before streaming its result
    pub bindings: Vec<&'static str>,
    /// Console lines logged while the page loads
    pub console: Vec<&'static str>,
    /// How long the presence check takes to answer
    pub probe_delay: Option<std::time::Duration>,
}

impl FakePage {
    pub fn new(result: Value) -> Self {
        Self {
            lifecycle: vec!["DOMContentLoaded", "load", "networkAlmostIdle", "networkIdle"],
            error_text: None,
            result: result.to_string(),
            chunk_size: 64,
            exception: None,
            stalls: false,
            extractor_missing: false,
            bindings: Vec::new(),
            console: Vec::new(),
            probe_delay: None,
        }
    }

    /// A page with the given links and a filename derived from its last path segment
    pub fn linking(url: &str, links: &[&str]) -> Self {
        let name = url.trim_end_matches('/').rsplit('/').next().unwrap_or("index");
        Self::new(json!({
            "content": format!("<html><body>{}</body></html>", url),
            "title": name,
            "filename": format!("{}.html", name),
            "links": links,
        }))
    }

    pub fn unreachable(error_text: &str) -> Self {
        Self {
            error_text: Some(error_text.to_string()),
            ..Self::new(json!({}))
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: &[&'static str]) -> Self {
        self.lifecycle = lifecycle.to_vec();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn throwing(mut self, description: &str) -> Self {
        self.exception = Some(description.to_string());
        self
    }

    pub fn stalling(mut self) -> Self {
        self.stalls = true;
        self
    }

    pub fn without_extractor(mut self) -> Self {
        self.extractor_missing = true;
        self
    }

    pub fn calling(mut self, bindings: &[&'static str]) -> Self {
        self.bindings = bindings.to_vec();
        self
    }

    pub fn with_slow_probe(mut self, millis: u64) -> Self {
        self.probe_delay = Some(std::time::Duration::from_millis(millis));
        self
    }

    pub fn logging(mut self, lines: &[&'static str]) -> Self {
        self.console = lines.to_vec();
        self
    }
}

#[derive(Default)]
struct State {
    next_id: u64,
    /// session id -> (context id, navigated URL)
    sessions: HashMap<String, (i64, Option<String>)>,
    created: usize,
    closed: usize,
    commands: Vec<String>,
    navigations: Vec<String>,
    /// Expressions of non-awaited evaluations, in order
    expressions: Vec<String>,
}

/// A browser whose tabs follow scripted page behaviors
pub struct FakeBrowser {
    events: broadcast::Sender<CdpEvent>,
    pages: HashMap<String, FakePage>,
    state: Mutex<State>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(4096);
        Self {
            events,
            pages: HashMap::new(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn targets_created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn targets_closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn expressions(&self) -> Vec<String> {
        self.state.lock().unwrap().expressions.clone()
    }

    fn emit(&self, session_id: &str, method: &str, params: Value) {
        let _ = self.events.send(CdpEvent {
            session_id: Some(session_id.to_string()),
            method: method.to_string(),
            params,
        });
    }

    fn page(&self, url: &str) -> FakePage {
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FakePage::linking(url, &[]))
    }

    fn navigate(&self, session_id: &str, url: &str) -> Value {
        let context_id = {
            let mut state = self.state.lock().unwrap();
            state.navigations.push(url.to_string());
            let entry = state
                .sessions
                .get_mut(session_id)
                .expect("navigate on an unknown session");
            entry.1 = Some(url.to_string());
            entry.0
        };
        let page = self.page(url);
        let frame_id = format!("F-{}", session_id);

        if let Some(error_text) = page.error_text {
            self.emit(
                session_id,
                "Page.frameNavigated",
                json!({ "frame": { "id": frame_id, "url": "chrome-error://chromewebdata/", "unreachableUrl": url } }),
            );
            return json!({ "frameId": frame_id, "errorText": error_text });
        }

        self.emit(
            session_id,
            "Page.frameNavigated",
            json!({ "frame": { "id": frame_id, "url": url } }),
        );
        self.emit(
            session_id,
            "Runtime.executionContextCreated",
            json!({ "context": { "id": context_id - 1, "name": "", "auxData": { "frameId": frame_id, "isDefault": true } } }),
        );
        self.emit(
            session_id,
            "Runtime.executionContextCreated",
            json!({ "context": { "id": context_id, "name": ISOLATED_WORLD, "auxData": { "frameId": frame_id, "isDefault": false } } }),
        );
        for line in &page.console {
            self.emit(
                session_id,
                "Runtime.consoleAPICalled",
                json!({ "type": "log", "args": [{ "type": "string", "value": line }], "timestamp": 1.0 }),
            );
        }
        for name in &page.lifecycle {
            if *name == RENAVIGATE {
                self.emit(
                    session_id,
                    "Page.frameNavigated",
                    json!({ "frame": { "id": frame_id, "url": url } }),
                );
                continue;
            }
            self.emit(
                session_id,
                "Page.lifecycleEvent",
                json!({ "frameId": frame_id, "name": name }),
            );
        }
        json!({ "frameId": frame_id, "loaderId": "L" })
    }

    async fn evaluate(&self, session_id: &str, params: &Value) -> Value {
        let (context_id, url) = {
            let state = self.state.lock().unwrap();
            state.sessions.get(session_id).cloned().unwrap_or((0, None))
        };
        let page = self.page(url.as_deref().unwrap_or_default());
        if params["contextId"].as_i64() != Some(context_id) {
            return json!({ "result": { "type": "boolean", "value": false } });
        }
        if params["awaitPromise"] != true {
            if let Some(expression) = params["expression"].as_str() {
                self.state
                    .lock()
                    .unwrap()
                    .expressions
                    .push(expression.to_string());
            }
            if let Some(delay) = page.probe_delay {
                tokio::time::sleep(delay).await;
            }
            return json!({ "result": { "type": "boolean", "value": !page.extractor_missing } });
        }

        if page.stalls {
            std::future::pending::<()>().await;
        }
        for binding in &page.bindings {
            self.emit(
                session_id,
                "Runtime.bindingCalled",
                json!({ "name": binding, "payload": "", "executionContextId": context_id }),
            );
        }
        if let Some(description) = page.exception {
            return json!({
                "result": { "type": "object", "subtype": "error" },
                "exceptionDetails": { "text": "Uncaught", "exception": { "description": description } }
            });
        }

        let chars: Vec<char> = page.result.chars().collect();
        for chunk in chars.chunks(page.chunk_size.max(1)) {
            self.emit(
                session_id,
                "Runtime.bindingCalled",
                json!({ "name": PAGE_DATA_BINDING, "payload": chunk.iter().collect::<String>(), "executionContextId": context_id }),
            );
        }
        self.emit(
            session_id,
            "Runtime.bindingCalled",
            json!({ "name": PAGE_DATA_BINDING, "payload": "", "executionContextId": context_id }),
        );
        json!({ "result": { "type": "undefined" } })
    }
}

#[async_trait]
impl Transport for FakeBrowser {
    async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, CdpError> {
        self.state.lock().unwrap().commands.push(method.to_string());
        // Let the session's listeners run between commands
        tokio::task::yield_now().await;

        match (session_id, method) {
            (None, "Target.createTarget") => {
                let mut state = self.state.lock().unwrap();
                state.next_id += 1;
                state.created += 1;
                Ok(json!({ "targetId": format!("T{}", state.next_id) }))
            }
            (None, "Target.attachToTarget") => {
                let target_id = params["targetId"].as_str().unwrap_or_default();
                let session_id = target_id.replacen('T', "S", 1);
                let number: i64 = target_id[1..].parse().unwrap_or_default();
                let context_id = 100 + 2 * number;
                let mut state = self.state.lock().unwrap();
                state.sessions.insert(session_id.clone(), (context_id, None));
                Ok(json!({ "sessionId": session_id }))
            }
            (None, "Target.closeTarget") => {
                self.state.lock().unwrap().closed += 1;
                Ok(json!({ "success": true }))
            }
            (None, "Browser.getVersion") => Ok(json!({ "userAgent": "FakeBrowser/1.0" })),
            (None, _) => Ok(json!({})),
            (Some(session_id), "Page.navigate") => {
                let url = params["url"].as_str().unwrap_or_default();
                Ok(self.navigate(session_id, url))
            }
            (Some(session_id), "Runtime.evaluate") => Ok(self.evaluate(session_id, &params).await),
            (Some(_), "Page.getLayoutMetrics") => Ok(json!({
                "cssVisualViewport": { "clientWidth": 1280, "clientHeight": 720, "zoom": 1 }
            })),
            (Some(_), "Page.captureScreenshot") => Ok(json!({ "data": "U0NSRUVO" })),
            (Some(_), "Page.printToPDF") => Ok(json!({ "data": "JVBERi0=" })),
            (Some(_), _) => Ok(json!({})),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }
}
