//! Extraction invoker
//!
//! Runs the extractor in the resolved context and reassembles its result from
//! the chunks it streams back through the page-data binding. The screenshot,
//! PDF and fetch bindings are serviced while the extractor runs.

use super::error::CaptureError;
use super::options::{CaptureOptions, ISOLATED_WORLD_NAME};
use super::page_data::PageData;
use super::scripts::{
    extraction_expression, resolver_call, FETCH_BINDING, PAGE_DATA_BINDING, PDF_BINDING,
    REJECT_FETCH, RESOLVE_FETCH, RESOLVE_PDF, RESOLVE_SCREENSHOT, SCREENSHOT_BINDING,
};
use crate::cdp::{CdpError, CdpEvent, Target};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Accumulates result chunks until the empty end-of-stream chunk
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    buffer: String,
    chunks: usize,
    complete: bool,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk; returns true once the sentinel was received
    pub fn push(&mut self, chunk: &str) -> bool {
        if self.complete {
            return true;
        }
        if chunk.is_empty() {
            self.complete = true;
        } else {
            self.buffer.push_str(chunk);
            self.chunks += 1;
        }
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// The reassembled text, only once complete
    pub fn finish(self) -> Option<String> {
        self.complete.then_some(self.buffer)
    }
}

/// Services in-page requests that need the browser or the network
#[derive(Clone)]
pub struct ServiceContext {
    pub http: reqwest::Client,
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchRequest {
    request_id: u64,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Runs the extractor in `context_id` and returns the parsed page data
///
/// The caller races this against the capture timeout; dropping the future
/// discards the partial buffer with it.
pub async fn extract(
    target: &Target,
    context_id: i64,
    options: &CaptureOptions,
    services: &ServiceContext,
) -> Result<PageData, CaptureError> {
    let mut events = target.events();

    for binding in [PAGE_DATA_BINDING, SCREENSHOT_BINDING, PDF_BINDING, FETCH_BINDING] {
        target
            .call(
                "Runtime.addBinding",
                json!({ "name": binding, "executionContextName": ISOLATED_WORLD_NAME }),
            )
            .await?;
    }

    let evaluate = target.call_unbounded(
        "Runtime.evaluate",
        json!({
            "expression": extraction_expression(options),
            "contextId": context_id,
            "awaitPromise": true,
            "returnByValue": true,
        }),
    );
    tokio::pin!(evaluate);
    let mut evaluated = false;
    let mut assembler = ChunkAssembler::new();

    while !assembler.is_complete() {
        tokio::select! {
            reply = &mut evaluate, if !evaluated => {
                evaluated = true;
                check_evaluation(reply?)?;
            }
            event = events.recv() => {
                let Some(event) = event? else {
                    return Err(CdpError::Protocol("connection closed during extraction".to_string()).into());
                };
                if let Some(call) = binding_call(&event, context_id) {
                    handle_binding(target, context_id, options, services, &mut assembler, call).await;
                }
            }
        }
    }

    // An extractor that rejects after streaming still counts as failed
    if !evaluated {
        check_evaluation(evaluate.await?)?;
    }

    tracing::debug!("Received page data in {} chunks", assembler.chunks());
    let text = assembler.finish().unwrap_or_default();
    PageData::from_json(&text).map_err(|e| CaptureError::InvalidPageData(e.to_string()))
}

struct BindingCall<'a> {
    name: &'a str,
    payload: &'a str,
}

fn binding_call(event: &CdpEvent, context_id: i64) -> Option<BindingCall<'_>> {
    if event.method != "Runtime.bindingCalled" {
        return None;
    }
    if event.params["executionContextId"].as_i64() != Some(context_id) {
        return None;
    }
    Some(BindingCall {
        name: event.params["name"].as_str()?,
        payload: event.params["payload"].as_str().unwrap_or_default(),
    })
}

async fn handle_binding(
    target: &Target,
    context_id: i64,
    options: &CaptureOptions,
    services: &ServiceContext,
    assembler: &mut ChunkAssembler,
    call: BindingCall<'_>,
) {
    let reply = match call.name {
        PAGE_DATA_BINDING => {
            assembler.push(call.payload);
            return;
        }
        SCREENSHOT_BINDING => {
            render(target, "Page.captureScreenshot", &options.screenshot_options)
                .await
                .map(|data| resolver_call(RESOLVE_SCREENSHOT, &[json!(data)]))
        }
        PDF_BINDING => render(target, "Page.printToPDF", &options.pdf_options)
            .await
            .map(|data| resolver_call(RESOLVE_PDF, &[json!(data)])),
        FETCH_BINDING => match relay_fetch(services, call.payload).await {
            Some(expression) => Ok(expression),
            None => return,
        },
        _ => return,
    };

    let expression = match reply {
        Ok(expression) => expression,
        Err(e) => {
            tracing::warn!("In-page {} request failed: {}", call.name, e);
            return;
        }
    };
    if let Err(e) = target
        .call(
            "Runtime.evaluate",
            json!({ "expression": expression, "contextId": context_id }),
        )
        .await
    {
        tracing::warn!("Failed to answer in-page {} request: {}", call.name, e);
    }
}

/// Issues a render call with the user's options passed through untouched
async fn render(target: &Target, method: &str, options: &Value) -> Result<String, CdpError> {
    let params = match options {
        Value::Object(_) => options.clone(),
        _ => json!({}),
    };
    let reply = target.call(method, params).await?;
    reply["data"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CdpError::Protocol(format!("{} returned no data", method)))
}

/// Performs a fetch the page could not do itself and builds the resolver call
async fn relay_fetch(services: &ServiceContext, payload: &str) -> Option<String> {
    let request: FetchRequest = match serde_json::from_str(payload) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Malformed in-page fetch request: {}", e);
            return None;
        }
    };

    let mut builder = services.http.get(&request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }

    let outcome = async {
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>(json!({
            "status": status,
            "headers": headers,
            "data": BASE64.encode(&body),
        }))
    }
    .await;

    Some(match outcome {
        Ok(response) => resolver_call(RESOLVE_FETCH, &[json!(request.request_id), response]),
        Err(e) => {
            tracing::debug!("Relayed fetch of {} failed: {}", request.url, e);
            resolver_call(REJECT_FETCH, &[json!(request.request_id), json!(e.to_string())])
        }
    })
}

/// Turns a thrown exception or rejected promise into an extraction error
fn check_evaluation(reply: Value) -> Result<(), CaptureError> {
    let result = &reply["result"];
    let error = if let Some(details) = reply.get("exceptionDetails") {
        Some(
            details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("Extraction failed"),
        )
    } else if result["subtype"] == "error" {
        Some(result["description"].as_str().unwrap_or("Extraction failed"))
    } else {
        None
    };

    match error {
        Some(description) => {
            let (message, stack) = split_stack(description);
            Err(CaptureError::Extraction { message, stack })
        }
        None => Ok(()),
    }
}

/// Splits a V8 error description into its message line and stack frames
fn split_stack(description: &str) -> (String, Option<String>) {
    match description.split_once("\n    at ") {
        Some((message, frames)) => (message.to_string(), Some(format!("    at {}", frames))),
        None => (description.to_string(), None),
    }
}
