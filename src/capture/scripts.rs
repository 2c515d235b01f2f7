//! Page-side scripts
//!
//! Two scripts are installed on every new document: the hook script in the
//! page's own world and the extraction bundle in the isolated world. The
//! bundle is the extraction script, the user's extra scripts and stylesheets,
//! and a small glue layer exposing the out-of-page services (screenshot, PDF
//! and fetch) that are serviced over protocol bindings.

use super::error::CaptureError;
use super::options::CaptureOptions;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Receives the serialized result, one chunk per call, empty chunk last
pub const PAGE_DATA_BINDING: &str = "__sumiPageData";
pub const SCREENSHOT_BINDING: &str = "__sumiScreenshot";
pub const PDF_BINDING: &str = "__sumiPdf";
pub const FETCH_BINDING: &str = "__sumiFetch";

pub const RESOLVE_SCREENSHOT: &str = "__sumiResolveScreenshot";
pub const RESOLVE_PDF: &str = "__sumiResolvePdf";
pub const RESOLVE_FETCH: &str = "__sumiResolveFetch";
pub const REJECT_FETCH: &str = "__sumiRejectFetch";

/// Scripts installed before navigation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptBundle {
    pub hook: String,
    pub extraction: String,
}

impl ScriptBundle {
    /// Reads the configured script files and assembles the bundle
    pub async fn load(options: &CaptureOptions) -> Result<Self, CaptureError> {
        let hook = match &options.hook_script_path {
            Some(path) => read_script(path).await?,
            None => String::new(),
        };

        let mut extraction = match &options.script_path {
            Some(path) => read_script(path).await?,
            None => String::new(),
        };
        extraction.push_str(&read_all(&options.browser_scripts).await?);
        if !options.browser_stylesheets.is_empty() {
            let styles = read_all(&options.browser_stylesheets).await?;
            extraction.push_str(&stylesheet_snippet(&styles));
        }
        extraction.push_str(&glue_script());

        Ok(Self { hook, extraction })
    }
}

async fn read_script(path: &Path) -> Result<String, CaptureError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CaptureError::Script {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

async fn read_all(paths: &[PathBuf]) -> Result<String, CaptureError> {
    let mut source = String::new();
    for path in paths {
        source.push_str(&read_script(path).await?);
        source.push('\n');
    }
    Ok(source)
}

fn stylesheet_snippet(styles: &str) -> String {
    format!(
        "addEventListener(\"load\",()=>{{const style=document.createElement(\"style\");style.textContent={};document.body.appendChild(style);}});",
        json!(styles)
    )
}

/// Page-side helpers backed by the service bindings
///
/// `globalThis.sumi.screenshot()` and `.pdf()` resolve with base64 data,
/// `.fetch(url, options)` resolves with `{status, headers, data}`.
pub fn glue_script() -> String {
    format!(
        r#"(() => {{
const once = new Map();
const fetches = new Map();
let lastRequestId = 0;
const request = (binding, resolver) => new Promise(resolve => {{
  once.set(resolver, resolve);
  globalThis[binding]("");
}});
const settle = resolver => data => {{
  const resolve = once.get(resolver);
  once.delete(resolver);
  if (resolve) resolve(data);
}};
globalThis["{resolve_screenshot}"] = settle("{resolve_screenshot}");
globalThis["{resolve_pdf}"] = settle("{resolve_pdf}");
globalThis["{resolve_fetch}"] = (requestId, response) => {{
  const pending = fetches.get(requestId);
  fetches.delete(requestId);
  if (pending) pending.resolve(response);
}};
globalThis["{reject_fetch}"] = (requestId, error) => {{
  const pending = fetches.get(requestId);
  fetches.delete(requestId);
  if (pending) pending.reject(new Error(error));
}};
globalThis.sumi = {{
  screenshot: () => request("{screenshot}", "{resolve_screenshot}"),
  pdf: () => request("{pdf}", "{resolve_pdf}"),
  fetch: (url, options = {{}}) => new Promise((resolve, reject) => {{
    const requestId = lastRequestId++;
    fetches.set(requestId, {{ resolve, reject }});
    globalThis["{fetch}"](JSON.stringify({{ requestId, url, headers: options.headers || {{}} }}));
  }})
}};
}})();
"#,
        screenshot = SCREENSHOT_BINDING,
        pdf = PDF_BINDING,
        fetch = FETCH_BINDING,
        resolve_screenshot = RESOLVE_SCREENSHOT,
        resolve_pdf = RESOLVE_PDF,
        resolve_fetch = RESOLVE_FETCH,
        reject_fetch = REJECT_FETCH,
    )
}

/// Expression evaluating to true once the extractor is loaded in a context
pub fn presence_expression(entry: &str) -> String {
    format!(
        "(() => {{ try {{ return typeof {} === \"function\"; }} catch (error) {{ return false; }} }})()",
        entry
    )
}

/// Expression running the extractor and streaming its JSON result back in chunks
///
/// A chunk never ends between the two halves of a surrogate pair: a lone
/// surrogate does not survive the UTF-8 transport.
pub fn extraction_expression(options: &CaptureOptions) -> String {
    format!(
        r#"(async () => {{
const data = await {entry}({argument});
const text = JSON.stringify(data);
let offset = 0;
while (offset < text.length) {{
  let end = Math.min(offset + {chunk}, text.length);
  const last = text.charCodeAt(end - 1);
  if (end < text.length && last >= 0xD800 && last <= 0xDBFF) {{
    end = end - offset > 1 ? end - 1 : end + 1;
  }}
  globalThis["{binding}"](text.substring(offset, end));
  offset = end;
}}
globalThis["{binding}"]("");
}})()"#,
        entry = options.extractor_entry,
        argument = options.extractor_argument(),
        chunk = options.chunk_size.max(1),
        binding = PAGE_DATA_BINDING,
    )
}

/// Statement handing a value back to a page-side resolver
pub fn resolver_call(resolver: &str, arguments: &[serde_json::Value]) -> String {
    let arguments: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
    format!("globalThis[\"{}\"]({})", resolver, arguments.join(","))
}
