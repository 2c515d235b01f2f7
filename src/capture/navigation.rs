//! Navigation and execution-context resolution
//!
//! Resolves the id of the isolated-world context bound to the top-level
//! frame once the page reached its readiness condition:
//! 1. Subscribe to frame, context and lifecycle events before navigating
//! 2. Navigate while tracking the top frame and its isolated-world contexts
//! 3. Fail at once if the top frame reports an unreachable URL
//! 4. On readiness, probe the candidate contexts newest first
//!
//! The whole resolution races one load deadline, computed before navigating.
//! Only the user's wait delay extends it. Losing the race drops the pending
//! navigation call, the in-flight probe and the settle timer together.

use super::error::CaptureError;
use super::options::{CaptureOptions, ISOLATED_WORLD_NAME};
use super::readiness::{Readiness, ReadinessLadder};
use super::scripts::presence_expression;
use crate::cdp::{CdpError, CdpEvent, Target, TargetEvents};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// What an event means for the resolution in progress
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Nothing,
    /// The configured condition was reached on the top frame
    Ready,
    /// An earlier ladder condition was reported; ready after the settle delay
    Early,
    /// The top frame navigated again, any pending settle delay is void
    Restarted,
    /// The top frame could not load
    Unreachable(String),
}

/// Frame and context bookkeeping for one navigation
#[derive(Debug, Clone, Default)]
pub struct ContextTracker {
    top_frame: Option<String>,
    /// Isolated-world contexts as `(context id, frame id)`, oldest first
    contexts: Vec<(i64, String)>,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top_frame(&self) -> Option<&str> {
        self.top_frame.as_deref()
    }

    /// Isolated-world contexts of the top frame, newest first
    pub fn candidates(&self) -> Vec<i64> {
        let Some(top_frame) = &self.top_frame else {
            return Vec::new();
        };
        self.contexts
            .iter()
            .rev()
            .filter(|(_, frame)| frame == top_frame)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Applies one event and reports what it means for readiness
    pub fn apply(&mut self, event: &CdpEvent, ladder: &ReadinessLadder, condition: &str) -> Signal {
        let params = &event.params;
        match event.method.as_str() {
            "Page.frameNavigated" => {
                let frame = &params["frame"];
                if frame.get("parentId").map_or(false, |parent| !parent.is_null()) {
                    return Signal::Nothing;
                }
                self.top_frame = frame["id"].as_str().map(str::to_string);
                match frame["unreachableUrl"].as_str() {
                    Some(url) => Signal::Unreachable(url.to_string()),
                    None => Signal::Restarted,
                }
            }
            "Runtime.executionContextCreated" => {
                let context = &params["context"];
                let aux = &context["auxData"];
                if context["name"] == ISOLATED_WORLD_NAME {
                    if let (Some(id), Some(frame)) = (context["id"].as_i64(), aux["frameId"].as_str()) {
                        self.contexts.push((id, frame.to_string()));
                    }
                }
                Signal::Nothing
            }
            "Runtime.executionContextDestroyed" => {
                if let Some(id) = params["executionContextId"].as_i64() {
                    self.contexts.retain(|(context, _)| *context != id);
                }
                Signal::Nothing
            }
            "Runtime.executionContextsCleared" => {
                self.contexts.clear();
                Signal::Nothing
            }
            "Page.lifecycleEvent" => {
                if self.top_frame.is_none() || params["frameId"].as_str() != self.top_frame.as_deref() {
                    return Signal::Nothing;
                }
                let name = params["name"].as_str().unwrap_or_default();
                match ladder.classify(condition, name) {
                    Readiness::Reached => Signal::Ready,
                    Readiness::Early => Signal::Early,
                    Readiness::Ignored => Signal::Nothing,
                }
            }
            _ => Signal::Nothing,
        }
    }
}

/// Navigates the tab and returns the context extraction must run in
pub async fn resolve_context(
    target: &Target,
    options: &CaptureOptions,
    ladder: &ReadinessLadder,
) -> Result<i64, CaptureError> {
    let mut events = target.events();
    let mut tracker = ContextTracker::new();

    target.call("Runtime.enable", json!({})).await?;
    target
        .call("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
        .await?;

    let mut deadline = options.load_timeout().map(|limit| Instant::now() + limit);

    within(
        deadline,
        options,
        wait_until_ready(target, options, ladder, &mut events, &mut tracker),
    )
    .await?;

    if let Err(e) = target
        .call("Page.setLifecycleEventsEnabled", json!({ "enabled": false }))
        .await
    {
        tracing::debug!("Failed to disable lifecycle events: {}", e);
    }

    if options.wait_delay > 0 {
        let started = Instant::now();
        follow_contexts_for(options.wait_delay(), ladder, options, &mut events, &mut tracker).await?;
        deadline = deadline.map(|deadline| deadline + started.elapsed());
    }

    within(deadline, options, probe_candidates(target, options, &tracker)).await
}

/// Runs one resolution step against the load deadline
async fn within<T, F>(
    deadline: Option<Instant>,
    options: &CaptureOptions,
    step: F,
) -> Result<T, CaptureError>
where
    F: Future<Output = Result<T, CaptureError>>,
{
    let Some(deadline) = deadline else {
        return step.await;
    };
    match tokio::time::timeout_at(deadline, step).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!("Load timeout for {} waiting for {}", options.url, options.wait_until);
            Err(CaptureError::LoadTimeout {
                condition: options.wait_until.clone(),
                timeout: options.load_timeout().unwrap_or_default(),
            })
        }
    }
}

async fn wait_until_ready(
    target: &Target,
    options: &CaptureOptions,
    ladder: &ReadinessLadder,
    events: &mut TargetEvents,
    tracker: &mut ContextTracker,
) -> Result<(), CaptureError> {
    let navigate = target.call("Page.navigate", json!({ "url": options.url }));
    tokio::pin!(navigate);
    let mut navigated = false;

    let settle = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(settle);
    let mut settling = false;

    loop {
        tokio::select! {
            reply = &mut navigate, if !navigated => {
                navigated = true;
                check_navigation(&options.url, reply)?;
            }
            event = events.recv() => {
                let Some(event) = event? else {
                    return Err(CdpError::Protocol("connection closed during navigation".to_string()).into());
                };
                match tracker.apply(&event, ladder, &options.wait_until) {
                    Signal::Ready => {
                        tracing::debug!("{} reached {}", options.url, options.wait_until);
                        break;
                    }
                    Signal::Early if !settling => {
                        settle.as_mut().reset(Instant::now() + options.settle_delay());
                        settling = true;
                    }
                    Signal::Restarted => settling = false,
                    Signal::Unreachable(url) => {
                        return Err(CaptureError::Unreachable {
                            url,
                            reason: "frame failed to load".to_string(),
                        });
                    }
                    Signal::Early | Signal::Nothing => {}
                }
            }
            _ = &mut settle, if settling => {
                tracing::debug!("{} settled before {}", options.url, options.wait_until);
                break;
            }
        }
    }
    Ok(())
}

fn check_navigation(url: &str, reply: Result<Value, CdpError>) -> Result<(), CaptureError> {
    let reply = reply?;
    match reply["errorText"].as_str() {
        Some(reason) if !reason.is_empty() => Err(CaptureError::Unreachable {
            url: url.to_string(),
            reason: reason.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Keeps the context list current while the page is given extra time
async fn follow_contexts_for(
    delay: Duration,
    ladder: &ReadinessLadder,
    options: &CaptureOptions,
    events: &mut TargetEvents,
    tracker: &mut ContextTracker,
) -> Result<(), CaptureError> {
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event? {
                Some(event) => {
                    tracker.apply(&event, ladder, &options.wait_until);
                }
                None => break,
            },
        }
    }
    Ok(())
}

async fn probe_candidates(
    target: &Target,
    options: &CaptureOptions,
    tracker: &ContextTracker,
) -> Result<i64, CaptureError> {
    let expression = presence_expression(&options.extractor_entry);
    for context_id in tracker.candidates() {
        let probe = target
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "contextId": context_id,
                    "returnByValue": true,
                }),
            )
            .await;
        match probe {
            Ok(reply) if reply["result"]["value"] == true => {
                tracing::debug!("Resolved context {} for {}", context_id, options.url);
                return Ok(context_id);
            }
            Ok(_) => tracing::debug!("Context {} has no extractor", context_id),
            Err(e) => tracing::debug!("Context {} is gone: {}", context_id, e),
        }
    }
    Err(CaptureError::ContextNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::options::DEFAULT_READINESS_LADDER;

    fn event(method: &str, params: Value) -> CdpEvent {
        CdpEvent {
            session_id: Some("S".to_string()),
            method: method.to_string(),
            params,
        }
    }

    fn navigated(frame: &str, parent: Option<&str>) -> CdpEvent {
        let mut frame = json!({ "id": frame, "url": "https://example.test/" });
        if let Some(parent) = parent {
            frame["parentId"] = json!(parent);
        }
        event("Page.frameNavigated", json!({ "frame": frame }))
    }

    fn context(id: i64, name: &str, frame: &str) -> CdpEvent {
        event(
            "Runtime.executionContextCreated",
            json!({ "context": { "id": id, "name": name, "origin": "://", "auxData": { "frameId": frame, "isDefault": false } } }),
        )
    }

    fn lifecycle(frame: &str, name: &str) -> CdpEvent {
        event("Page.lifecycleEvent", json!({ "frameId": frame, "name": name }))
    }

    fn ladder() -> ReadinessLadder {
        ReadinessLadder::new(DEFAULT_READINESS_LADDER)
    }

    #[test]
    fn test_candidates_are_isolated_top_frame_contexts_newest_first() {
        let ladder = ladder();
        let mut tracker = ContextTracker::new();
        tracker.apply(&context(1, ISOLATED_WORLD_NAME, "TOP"), &ladder, "load");
        tracker.apply(&navigated("TOP", None), &ladder, "load");
        tracker.apply(&navigated("SUB", Some("TOP")), &ladder, "load");
        tracker.apply(&context(2, "", "TOP"), &ladder, "load");
        tracker.apply(&context(3, ISOLATED_WORLD_NAME, "SUB"), &ladder, "load");
        tracker.apply(&context(4, ISOLATED_WORLD_NAME, "TOP"), &ladder, "load");

        assert_eq!(tracker.top_frame(), Some("TOP"));
        assert_eq!(tracker.candidates(), vec![4, 1]);
    }

    #[test]
    fn test_destroyed_contexts_are_dropped() {
        let ladder = ladder();
        let mut tracker = ContextTracker::new();
        tracker.apply(&navigated("TOP", None), &ladder, "load");
        tracker.apply(&context(1, ISOLATED_WORLD_NAME, "TOP"), &ladder, "load");
        tracker.apply(&context(2, ISOLATED_WORLD_NAME, "TOP"), &ladder, "load");
        tracker.apply(
            &event("Runtime.executionContextDestroyed", json!({ "executionContextId": 2 })),
            &ladder,
            "load",
        );
        assert_eq!(tracker.candidates(), vec![1]);

        tracker.apply(&event("Runtime.executionContextsCleared", json!({})), &ladder, "load");
        assert!(tracker.candidates().is_empty());
    }

    #[test]
    fn test_lifecycle_signals() {
        let ladder = ladder();
        let mut tracker = ContextTracker::new();

        // Nothing counts before the top frame is known
        assert_eq!(tracker.apply(&lifecycle("TOP", "networkIdle"), &ladder, "networkIdle"), Signal::Nothing);

        assert_eq!(tracker.apply(&navigated("TOP", None), &ladder, "networkIdle"), Signal::Restarted);
        assert_eq!(tracker.apply(&lifecycle("SUB", "networkIdle"), &ladder, "networkIdle"), Signal::Nothing);
        assert_eq!(tracker.apply(&lifecycle("TOP", "load"), &ladder, "networkIdle"), Signal::Nothing);
        assert_eq!(tracker.apply(&lifecycle("TOP", "InteractiveTime"), &ladder, "networkIdle"), Signal::Early);
        assert_eq!(tracker.apply(&lifecycle("TOP", "networkIdle"), &ladder, "networkIdle"), Signal::Ready);
    }

    #[test]
    fn test_unreachable_top_frame() {
        let ladder = ladder();
        let mut tracker = ContextTracker::new();
        let failed = event(
            "Page.frameNavigated",
            json!({ "frame": { "id": "TOP", "url": "chrome-error://chromewebdata/", "unreachableUrl": "https://nowhere.test/" } }),
        );
        assert_eq!(
            tracker.apply(&failed, &ladder, "load"),
            Signal::Unreachable("https://nowhere.test/".to_string())
        );
    }

    #[test]
    fn test_check_navigation_error_text() {
        assert!(check_navigation("https://a.test/", Ok(json!({ "frameId": "F" }))).is_ok());
        let error = check_navigation(
            "https://a.test/",
            Ok(json!({ "frameId": "F", "errorText": "net::ERR_NAME_NOT_RESOLVED" })),
        )
        .unwrap_err();
        assert_eq!(error.code(), "ERR_UNREACHABLE");
    }
}
