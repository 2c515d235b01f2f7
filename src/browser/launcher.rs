//! Browser process supervision
//!
//! Starts a Chromium-family browser with remote debugging enabled on a free
//! port and a throwaway profile, then waits until its DevTools endpoint
//! answers.

use super::BrowserError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::Instant;

const DEBUG_PORT_MIN: u16 = 9222;
const DEBUG_PORT_RANGE: u16 = 256;
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(100);

const BASE_ARGS: &[&str] = &[
    "--disable-field-trial-config",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-back-forward-cache",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-component-extensions-with-background-pages",
    "--disable-component-update",
    "--no-default-browser-check",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-features=LazyFrameLoading,GlobalMediaControls,MediaRouter,Translate,HttpsUpgrades,PaintHolding",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--no-first-run",
    "--enable-automation",
    "--password-store=basic",
    "--use-mock-keychain",
    "--export-tagged-pdf",
    "--disable-search-engine-choice-screen",
    "--no-sandbox",
    "--no-startup-window",
];

#[cfg(target_os = "linux")]
const EXECUTABLE_PATHS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/opt/google/chrome/google-chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-beta",
    "/usr/bin/brave-browser",
    "/usr/bin/microsoft-edge",
    "/usr/bin/vivaldi",
];

#[cfg(target_os = "macos")]
const EXECUTABLE_PATHS: &[&str] = &[
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "windows")]
const EXECUTABLE_PATHS: &[&str] = &[
    "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
    "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
    "C:\\Program Files\\Chromium\\Application\\chrome.exe",
    "C:\\Program Files (x86)\\Microsoft\\Edge\\Application\\msedge.exe",
];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const EXECUTABLE_PATHS: &[&str] = &[];

/// Browser launch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// Explicit executable; well-known install paths are tried otherwise
    pub executable_path: Option<PathBuf>,
    pub headless: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub user_agent: Option<String>,
    pub proxy_server: Option<String>,
    /// Extra flags; a flag named here replaces the built-in one of the same name
    pub args: Vec<String>,
    /// Opens devtools and disables headless mode
    pub debug: bool,
    pub disable_web_security: bool,
    /// Existing DevTools endpoint (`ws://...` or `http://host:port`), never stopped by us
    pub remote_endpoint: Option<String>,
    /// Milliseconds to wait for the DevTools endpoint after spawning
    pub startup_timeout: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            width: None,
            height: None,
            user_agent: None,
            proxy_server: None,
            args: Vec::new(),
            debug: false,
            disable_web_security: true,
            remote_endpoint: None,
            startup_timeout: 20_000,
        }
    }
}

/// Builds the command line for a browser listening on `port`
pub fn build_args(config: &BrowserConfig, port: u16, profile: &Path) -> Vec<String> {
    let mut args: Vec<String> = BASE_ARGS.iter().map(|arg| arg.to_string()).collect();
    args.push(format!("--remote-debugging-port={}", port));
    if config.headless && !config.debug {
        args.push("--headless".to_string());
    } else {
        args.push("--start-maximized".to_string());
    }
    if config.debug {
        args.push("--auto-open-devtools-for-tabs".to_string());
    }
    if config.disable_web_security {
        args.push("--disable-web-security".to_string());
    }
    if let (Some(width), Some(height)) = (config.width, config.height) {
        args.push(format!("--window-size={},{}", width, height));
    }
    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={}", user_agent));
    }
    if let Some(proxy) = &config.proxy_server {
        args.push(format!("--proxy-server={}", proxy));
    }
    args.push(format!("--user-data-dir={}", profile.display()));

    if !config.args.is_empty() {
        let overridden: Vec<&str> = config.args.iter().map(|arg| flag_name(arg)).collect();
        args.retain(|arg| !overridden.contains(&flag_name(arg)));
        args.extend(config.args.iter().cloned());
    }
    args
}

fn flag_name(arg: &str) -> &str {
    arg.split('=').next().unwrap_or(arg)
}

/// Resolves the browser executable
pub fn find_executable(config: &BrowserConfig) -> Result<PathBuf, BrowserError> {
    if let Some(path) = &config.executable_path {
        return Ok(path.clone());
    }
    EXECUTABLE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .ok_or(BrowserError::ExecutableNotFound)
}

/// Asks a DevTools HTTP endpoint for its browser WebSocket URL
pub async fn discover_ws_endpoint(
    client: &reqwest::Client,
    http_base: &str,
) -> Result<String, BrowserError> {
    let url = format!("{}/json/version", http_base.trim_end_matches('/'));
    let version: serde_json::Value = client
        .get(&url)
        .send()
        .await
        .map_err(|e| BrowserError::Discovery(format!("{}: {}", url, e)))?
        .json()
        .await
        .map_err(|e| BrowserError::Discovery(format!("{}: {}", url, e)))?;
    version["webSocketDebuggerUrl"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Discovery(format!("{} has no webSocketDebuggerUrl", url)))
}

/// Picks a debugging port nothing answers on
async fn free_debug_port(client: &reqwest::Client) -> Result<u16, BrowserError> {
    let offset = (std::process::id() as u64 ^ chrono::Utc::now().timestamp_subsec_nanos() as u64)
        % DEBUG_PORT_RANGE as u64;
    for step in 0..DEBUG_PORT_RANGE {
        let port = DEBUG_PORT_MIN + ((offset as u16 + step) % DEBUG_PORT_RANGE);
        let probe = client
            .get(format!("http://127.0.0.1:{}/json/version", port))
            .timeout(Duration::from_millis(500))
            .send()
            .await;
        if probe.is_err() {
            return Ok(port);
        }
    }
    Err(BrowserError::NoDebugPort)
}

/// A running browser process we own
pub struct BrowserProcess {
    child: Option<Child>,
    profile: Option<TempDir>,
    ws_endpoint: String,
}

impl BrowserProcess {
    /// Spawns the browser and waits for its DevTools endpoint
    pub async fn start(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let executable = find_executable(config)?;
        let client = reqwest::Client::new();
        let port = free_debug_port(&client).await?;
        let profile = tempfile::Builder::new().prefix("sumi-profile-").tempdir()?;
        let args = build_args(config, port, profile.path());

        tracing::info!("Starting browser {} on port {}", executable.display(), port);
        tracing::debug!("Browser arguments: {:?}", args);

        let child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(!config.debug)
            .spawn()
            .map_err(|e| BrowserError::Spawn {
                path: executable.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut process = Self {
            child: Some(child),
            profile: Some(profile),
            ws_endpoint: String::new(),
        };

        let base = format!("http://127.0.0.1:{}", port);
        let deadline = Instant::now() + Duration::from_millis(config.startup_timeout);
        loop {
            match discover_ws_endpoint(&client, &base).await {
                Ok(endpoint) => {
                    process.ws_endpoint = endpoint;
                    return Ok(process);
                }
                Err(e) if Instant::now() >= deadline => {
                    process.stop().await;
                    return Err(e);
                }
                Err(_) => tokio::time::sleep(DISCOVERY_POLL_INTERVAL).await,
            }
        }
    }

    pub fn ws_endpoint(&self) -> &str {
        &self.ws_endpoint
    }

    /// Leaves the browser running, keeping its profile directory
    pub fn detach(mut self) {
        if let Some(profile) = self.profile.take() {
            let path = profile.into_path();
            tracing::info!("Browser left running with profile {}", path.display());
        }
    }

    /// Kills the process and removes its profile; safe to call repeatedly
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to stop browser: {}", e);
            }
        }
        if let Some(profile) = self.profile.take() {
            let path = profile.path().display().to_string();
            if let Err(e) = profile.close() {
                tracing::warn!("Failed to remove profile directory {}: {}", path, e);
            }
        }
    }
}
