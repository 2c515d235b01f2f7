use crate::browser::Cookie;
use crate::output::ConflictAction;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the isolated world the extraction script runs in
pub const ISOLATED_WORLD_NAME: &str = "singlefile";

/// Default readiness ladder, in fallback order
pub const DEFAULT_READINESS_LADDER: [&str; 5] = [
    "InteractiveTime",
    "networkIdle",
    "networkAlmostIdle",
    "load",
    "DOMContentLoaded",
];

/// Per-page capture configuration
///
/// Every key has a default, so a layer (config file, profile, command line,
/// URL list line) only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct CaptureOptions {
    /// Page to capture
    pub url: String,

    // ===== Readiness =====
    /// Lifecycle event that signals the page is ready
    pub wait_until: String,
    /// Retry with the next ladder step on load timeout
    pub wait_until_fallback: bool,
    /// Lifecycle names in fallback order
    pub readiness_ladder: Vec<String>,
    /// Load timeout in milliseconds (0 disables it)
    pub load_max_time: u64,
    /// Extraction timeout in milliseconds (0 disables it)
    pub capture_max_time: u64,
    /// Extra delay after readiness, in milliseconds
    pub wait_delay: u64,
    /// Delay before accepting an out-of-order lifecycle name, in milliseconds
    pub lifecycle_settle_delay: u64,
    /// Keep the tab open after capture
    pub debug: bool,

    // ===== Emulation and security =====
    pub start_minimized: bool,
    pub ignore_https_errors: bool,
    pub bypass_csp: bool,
    pub mobile_emulation: bool,
    pub device_width: Option<u32>,
    pub device_height: Option<u32>,
    pub device_scale_factor: Option<f64>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub platform: Option<String>,
    /// `name:value` pairs, e.g. `prefers-color-scheme:dark`
    pub emulate_media_features: Vec<String>,

    // ===== Network =====
    pub http_headers: BTreeMap<String, String>,
    pub cookies: Vec<Cookie>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    /// Regular expressions; matching requests are aborted
    pub blocked_urls: Vec<String>,
    pub capture_http_info: bool,

    // ===== Extraction =====
    pub script_path: Option<PathBuf>,
    pub hook_script_path: Option<PathBuf>,
    pub browser_scripts: Vec<PathBuf>,
    pub browser_stylesheets: Vec<PathBuf>,
    /// In-page function returning a promise of the page data
    pub extractor_entry: String,
    /// Passed to the extractor as-is
    pub extractor_options: Value,
    /// Passed through to `Page.captureScreenshot`
    pub screenshot_options: Value,
    /// Passed through to `Page.printToPDF`
    pub pdf_options: Value,
    pub embed_screenshot: bool,
    pub embed_pdf: bool,
    pub compress_content: bool,
    /// Characters per result chunk sent back through the binding
    pub chunk_size: usize,

    // ===== Output =====
    pub output: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub output_json: bool,
    pub dump_content: bool,
    pub filename_conflict_action: ConflictAction,
    pub console_messages_file: Option<PathBuf>,
    pub errors_file: Option<PathBuf>,
    pub errors_traces_disabled: bool,

    // ===== Crawl =====
    pub crawl_links: bool,
    pub crawl_inner_links_only: bool,
    pub crawl_no_parent: bool,
    /// 0 means unbounded
    pub crawl_max_depth: u32,
    /// 0 means unbounded
    pub crawl_external_links_max_depth: u32,
    pub crawl_replace_urls: bool,
    pub crawl_remove_url_fragment: bool,
    /// `<regex> <replacement>` pairs applied to discovered links
    pub crawl_rewrite_rules: Vec<String>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            wait_until: "networkIdle".to_string(),
            wait_until_fallback: true,
            readiness_ladder: DEFAULT_READINESS_LADDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            load_max_time: 60_000,
            capture_max_time: 180_000,
            wait_delay: 0,
            lifecycle_settle_delay: 500,
            debug: false,
            start_minimized: false,
            ignore_https_errors: false,
            bypass_csp: true,
            mobile_emulation: false,
            device_width: None,
            device_height: None,
            device_scale_factor: None,
            user_agent: None,
            accept_language: None,
            platform: None,
            emulate_media_features: Vec::new(),
            http_headers: BTreeMap::new(),
            cookies: Vec::new(),
            proxy_username: None,
            proxy_password: None,
            blocked_urls: Vec::new(),
            capture_http_info: false,
            script_path: None,
            hook_script_path: None,
            browser_scripts: Vec::new(),
            browser_stylesheets: Vec::new(),
            extractor_entry: "singlefile.getPageData".to_string(),
            extractor_options: Value::Object(Map::new()),
            screenshot_options: Value::Object(Map::new()),
            pdf_options: Value::Object(Map::new()),
            embed_screenshot: false,
            embed_pdf: false,
            compress_content: false,
            chunk_size: 8 * 1024 * 1024,
            output: None,
            output_directory: None,
            output_json: false,
            dump_content: false,
            filename_conflict_action: ConflictAction::Uniquify,
            console_messages_file: None,
            errors_file: None,
            errors_traces_disabled: true,
            crawl_links: false,
            crawl_inner_links_only: false,
            crawl_no_parent: false,
            crawl_max_depth: 1,
            crawl_external_links_max_depth: 1,
            crawl_replace_urls: false,
            crawl_remove_url_fragment: true,
            crawl_rewrite_rules: Vec::new(),
        }
    }
}

impl CaptureOptions {
    /// Returns a copy targeting another URL
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        millis(self.load_max_time)
    }

    pub fn capture_timeout(&self) -> Option<Duration> {
        millis(self.capture_max_time)
    }

    pub fn wait_delay(&self) -> Duration {
        Duration::from_millis(self.wait_delay)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.lifecycle_settle_delay)
    }

    /// HTTP metadata is needed for the JSON envelope too
    pub fn wants_http_info(&self) -> bool {
        self.capture_http_info || self.output_json
    }

    pub fn has_proxy_credentials(&self) -> bool {
        self.proxy_username.is_some()
    }

    /// Argument object handed to the in-page extractor
    pub fn extractor_argument(&self) -> Value {
        let mut argument = match &self.extractor_options {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        argument.insert("url".to_string(), json!(self.url));
        argument.insert("compressContent".to_string(), json!(self.compress_content));
        argument.insert("embedScreenshot".to_string(), json!(self.embed_screenshot));
        argument.insert("embedPdf".to_string(), json!(self.embed_pdf));
        argument.insert("chunkSize".to_string(), json!(self.chunk_size));
        Value::Object(argument)
    }
}

fn millis(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_millis(value))
}
