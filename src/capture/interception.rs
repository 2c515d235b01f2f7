//! Request interception and console collection
//!
//! Both run as background listeners for the lifetime of one capture session
//! and stop when the session's cancellation token fires.

use super::page_data::{ConsoleMessage, HttpInfo};
use crate::cdp::{CdpError, CdpEvent, SessionHandle, TargetEvents};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// What the interception listener does with paused requests
#[derive(Debug, Clone, Default)]
pub struct InterceptionRules {
    pub proxy_credentials: Option<(String, String)>,
    pub blocked_urls: Vec<Regex>,
    /// URL of the primary document, when its HTTP metadata is wanted
    pub track_document: Option<String>,
}

impl InterceptionRules {
    pub fn is_empty(&self) -> bool {
        self.proxy_credentials.is_none()
            && self.blocked_urls.is_empty()
            && self.track_document.is_none()
    }

    /// Parameters for `Fetch.enable`
    pub fn fetch_enable_params(&self) -> Value {
        let mut patterns = Vec::new();
        if self.proxy_credentials.is_some() || !self.blocked_urls.is_empty() {
            patterns.push(json!({ "urlPattern": "*", "requestStage": "Request" }));
        }
        if self.track_document.is_some() {
            patterns.push(json!({
                "urlPattern": "*",
                "resourceType": "Document",
                "requestStage": "Response"
            }));
        }
        json!({
            "patterns": patterns,
            "handleAuthRequests": self.proxy_credentials.is_some(),
        })
    }

    fn is_blocked(&self, url: &str) -> bool {
        self.blocked_urls.iter().any(|pattern| pattern.is_match(url))
    }
}

/// Follows the primary document through its redirects
#[derive(Debug, Clone)]
pub struct DocumentTracker {
    current: String,
    info: HttpInfo,
    done: bool,
}

impl DocumentTracker {
    pub fn new(url: &str) -> Self {
        Self {
            current: url.to_string(),
            info: HttpInfo::default(),
            done: false,
        }
    }

    /// Records a document response; returns true if it belonged to the tracked chain
    pub fn observe(&mut self, url: &str, status: u16, headers: BTreeMap<String, String>) -> bool {
        if self.done || !same_url(url, &self.current) {
            return false;
        }
        if (300..400).contains(&status) {
            let location = headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("location"))
                .map(|(_, value)| value.clone());
            if let Some(location) = location {
                self.info.redirects.push(url.to_string());
                self.current = Url::parse(url)
                    .and_then(|base| base.join(&location))
                    .map(|next| next.to_string())
                    .unwrap_or(location);
                return true;
            }
        }
        self.info.url = url.to_string();
        self.info.status = status;
        self.info.headers = headers;
        self.done = true;
        true
    }

    pub fn finished(&self) -> Option<HttpInfo> {
        self.done.then(|| self.info.clone())
    }
}

fn same_url(left: &str, right: &str) -> bool {
    match (Url::parse(left), Url::parse(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

fn response_headers(params: &Value) -> BTreeMap<String, String> {
    params["responseHeaders"]
        .as_array()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|header| {
                    Some((
                        header["name"].as_str()?.to_string(),
                        header["value"].as_str()?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Handle on the interception listener
pub struct Interceptor {
    tracker: Arc<Mutex<Option<DocumentTracker>>>,
    /// Events the listener lost; paused requests among them never resume
    lost: Arc<Mutex<Option<u64>>>,
    session_id: String,
    task: JoinHandle<()>,
}

impl Interceptor {
    /// Starts listening; must be called before `Fetch.enable`
    pub fn spawn(
        session: SessionHandle,
        rules: InterceptionRules,
        cancel: CancellationToken,
    ) -> Self {
        let tracker = Arc::new(Mutex::new(
            rules.track_document.as_deref().map(DocumentTracker::new),
        ));
        let lost = Arc::new(Mutex::new(None));
        let session_id = session.session_id().to_string();
        let events = session.events();
        let task = tokio::spawn(intercept_loop(
            session,
            events,
            rules,
            Arc::clone(&tracker),
            Arc::clone(&lost),
            cancel,
        ));
        Self {
            tracker,
            lost,
            session_id,
            task,
        }
    }

    /// Fails if the listener fell behind and stopped
    pub fn check(&self) -> Result<(), CdpError> {
        let lost = self.lost.lock().ok().and_then(|lost| *lost);
        match lost {
            Some(skipped) => Err(CdpError::EventsLagged {
                session_id: self.session_id.clone(),
                skipped,
            }),
            None => Ok(()),
        }
    }

    /// HTTP metadata of the primary document, once its final response was seen
    pub fn http_info(&self) -> Option<HttpInfo> {
        self.tracker
            .lock()
            .ok()
            .and_then(|tracker| tracker.as_ref().and_then(DocumentTracker::finished))
    }

    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn intercept_loop(
    session: SessionHandle,
    mut events: TargetEvents,
    rules: InterceptionRules,
    tracker: Arc<Mutex<Option<DocumentTracker>>>,
    lost: Arc<Mutex<Option<u64>>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(CdpError::EventsLagged { skipped, .. }) => {
                    if let Ok(mut lost) = lost.lock() {
                        *lost = Some(skipped);
                    }
                    break;
                }
                Err(_) => break,
            },
        };
        if let Err(e) = handle_event(&session, &rules, &tracker, &event).await {
            tracing::debug!("Interception of {} failed: {}", event.method, e);
        }
    }
}

async fn handle_event(
    session: &SessionHandle,
    rules: &InterceptionRules,
    tracker: &Mutex<Option<DocumentTracker>>,
    event: &CdpEvent,
) -> Result<(), crate::cdp::CdpError> {
    let params = &event.params;
    let request_id = params["requestId"].clone();

    match event.method.as_str() {
        "Fetch.authRequired" => {
            let response = match &rules.proxy_credentials {
                Some((username, password)) => json!({
                    "response": "ProvideCredentials",
                    "username": username,
                    "password": password,
                }),
                None => json!({ "response": "Default" }),
            };
            session
                .call(
                    "Fetch.continueWithAuth",
                    json!({ "requestId": request_id, "authChallengeResponse": response }),
                )
                .await?;
        }
        "Fetch.requestPaused" => {
            let url = params["request"]["url"].as_str().unwrap_or_default();

            if let Some(status) = params["responseStatusCode"].as_u64() {
                if let Ok(mut guard) = tracker.lock() {
                    if let Some(tracker) = guard.as_mut() {
                        tracker.observe(url, status as u16, response_headers(params));
                    }
                }
            } else if rules.is_blocked(url) {
                tracing::debug!("Blocking request to {}", url);
                session
                    .call(
                        "Fetch.failRequest",
                        json!({ "requestId": request_id, "errorReason": "BlockedByClient" }),
                    )
                    .await?;
                return Ok(());
            }

            session
                .call("Fetch.continueRequest", json!({ "requestId": request_id }))
                .await?;
        }
        _ => {}
    }
    Ok(())
}

/// Collects console output of one session
pub struct ConsoleCollector {
    messages: Arc<Mutex<Vec<ConsoleMessage>>>,
    task: JoinHandle<()>,
}

impl ConsoleCollector {
    pub fn spawn(session: &SessionHandle, cancel: CancellationToken) -> Self {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut events = session.events();
        let sink = Arc::clone(&messages);
        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(Some(event)) => event,
                        Ok(None) => break,
                        // Lost console lines are not worth failing the capture
                        Err(_) => continue,
                    },
                };
                if event.method == "Runtime.consoleAPICalled" {
                    if let Ok(mut messages) = sink.lock() {
                        messages.push(console_message(&event.params));
                    }
                }
            }
        });
        Self { messages, task }
    }

    pub fn messages(&self) -> Vec<ConsoleMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub async fn stop(self) -> Vec<ConsoleMessage> {
        let messages = self.messages();
        self.task.abort();
        let _ = self.task.await;
        messages
    }
}

/// Converts a `Runtime.consoleAPICalled` payload
pub fn console_message(params: &Value) -> ConsoleMessage {
    let text = params["args"]
        .as_array()
        .map(|args| {
            args.iter()
                .map(|arg| match (&arg["value"], &arg["description"]) {
                    (Value::String(value), _) => value.clone(),
                    (Value::Null, Value::String(description)) => description.clone(),
                    (value, _) => value.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    ConsoleMessage {
        kind: params["type"].as_str().unwrap_or("log").to_string(),
        text,
        timestamp: params["timestamp"].as_f64(),
    }
}
