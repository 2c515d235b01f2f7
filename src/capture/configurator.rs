//! One-time tab setup before navigation

use super::error::CaptureError;
use super::interception::{InterceptionRules, Interceptor};
use super::options::{CaptureOptions, ISOLATED_WORLD_NAME};
use super::scripts::ScriptBundle;
use crate::cdp::Target;
use regex::Regex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const MINIMIZED_WINDOW_STATE: &str = "minimized";
const MOBILE_WIDTH: u32 = 360;
const MOBILE_HEIGHT: u32 = 800;
const MOBILE_SCALE_FACTOR: f64 = 2.0;
const MOBILE_PLATFORM: &str = "Android";

async fn step(
    target: &Target,
    name: &'static str,
    method: &str,
    params: Value,
) -> Result<Value, CaptureError> {
    target
        .call(method, params)
        .await
        .map_err(|source| CaptureError::Setup { step: name, source })
}

/// Applies every setting of `options` to a fresh tab
///
/// Returns the interception listener when one was needed. It is already
/// running and stops when `cancel` fires.
pub async fn configure(
    target: &Target,
    options: &CaptureOptions,
    scripts: &ScriptBundle,
    cancel: &CancellationToken,
) -> Result<Option<Interceptor>, CaptureError> {
    step(target, "page domain", "Page.enable", json!({})).await?;

    if options.start_minimized {
        minimize_window(target).await?;
    }
    if options.ignore_https_errors {
        step(target, "security domain", "Security.enable", json!({})).await?;
        step(
            target,
            "certificate errors",
            "Security.setIgnoreCertificateErrors",
            json!({ "ignore": true }),
        )
        .await?;
    }
    if options.bypass_csp {
        step(target, "bypass CSP", "Page.setBypassCSP", json!({ "enabled": true })).await?;
    }

    emulate_device(target, options).await?;

    let interceptor = enable_interception(target, options, cancel).await?;

    if !options.http_headers.is_empty() || !options.cookies.is_empty() {
        step(target, "network domain", "Network.enable", json!({})).await?;
    }
    if !options.http_headers.is_empty() {
        step(
            target,
            "HTTP headers",
            "Network.setExtraHTTPHeaders",
            json!({ "headers": options.http_headers }),
        )
        .await?;
    }
    if !options.emulate_media_features.is_empty() {
        step(
            target,
            "media features",
            "Emulation.setEmulatedMedia",
            json!({ "features": media_features(&options.emulate_media_features) }),
        )
        .await?;
    }
    if !options.cookies.is_empty() {
        step(
            target,
            "cookies",
            "Network.setCookies",
            json!({ "cookies": options.cookies }),
        )
        .await?;
    }

    target
        .call_browser("Browser.setDownloadBehavior", json!({ "behavior": "deny" }))
        .await
        .map_err(|source| CaptureError::Setup {
            step: "downloads",
            source,
        })?;

    if !scripts.hook.is_empty() {
        step(
            target,
            "hook script",
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": scripts.hook, "runImmediately": true }),
        )
        .await?;
    }
    step(
        target,
        "extraction script",
        "Page.addScriptToEvaluateOnNewDocument",
        json!({
            "source": scripts.extraction,
            "runImmediately": true,
            "worldName": ISOLATED_WORLD_NAME,
        }),
    )
    .await?;

    Ok(interceptor)
}

async fn minimize_window(target: &Target) -> Result<(), CaptureError> {
    let window = target
        .call_browser(
            "Browser.getWindowForTarget",
            json!({ "targetId": target.target_id() }),
        )
        .await
        .map_err(|source| CaptureError::Setup {
            step: "window state",
            source,
        })?;
    if window["bounds"]["windowState"] != MINIMIZED_WINDOW_STATE {
        target
            .call_browser(
                "Browser.setWindowBounds",
                json!({
                    "windowId": window["windowId"],
                    "bounds": { "windowState": MINIMIZED_WINDOW_STATE },
                }),
            )
            .await
            .map_err(|source| CaptureError::Setup {
                step: "window state",
                source,
            })?;
    }
    Ok(())
}

async fn emulate_device(target: &Target, options: &CaptureOptions) -> Result<(), CaptureError> {
    let wants_metrics = options.mobile_emulation
        || options.device_width.is_some()
        || options.device_height.is_some()
        || options.device_scale_factor.is_some();

    if wants_metrics {
        let (width, height, scale) = if options.mobile_emulation {
            (MOBILE_WIDTH, MOBILE_HEIGHT, MOBILE_SCALE_FACTOR)
        } else {
            current_metrics(target).await?
        };
        step(
            target,
            "device metrics",
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": options.device_width.unwrap_or(width),
                "height": options.device_height.unwrap_or(height),
                "deviceScaleFactor": options.device_scale_factor.unwrap_or(scale),
                "mobile": options.mobile_emulation,
            }),
        )
        .await?;
    }

    let platform = options
        .platform
        .clone()
        .or_else(|| options.mobile_emulation.then(|| MOBILE_PLATFORM.to_string()));
    if options.user_agent.is_some() || options.accept_language.is_some() || platform.is_some() {
        let user_agent = match &options.user_agent {
            Some(user_agent) => user_agent.clone(),
            None => {
                let version = target
                    .call_browser("Browser.getVersion", json!({}))
                    .await
                    .map_err(|source| CaptureError::Setup {
                        step: "user agent",
                        source,
                    })?;
                version["userAgent"].as_str().unwrap_or_default().to_string()
            }
        };
        let mut params = json!({ "userAgent": user_agent });
        if let Some(language) = &options.accept_language {
            params["acceptLanguage"] = json!(language);
        }
        if let Some(platform) = platform {
            params["platform"] = json!(platform);
        }
        step(target, "user agent", "Emulation.setUserAgentOverride", params).await?;
    }
    Ok(())
}

/// Window metrics used when only some device dimensions are overridden
async fn current_metrics(target: &Target) -> Result<(u32, u32, f64), CaptureError> {
    let metrics = step(target, "device metrics", "Page.getLayoutMetrics", json!({})).await?;
    let viewport = &metrics["cssVisualViewport"];
    Ok((
        viewport["clientWidth"].as_f64().unwrap_or(0.0) as u32,
        viewport["clientHeight"].as_f64().unwrap_or(0.0) as u32,
        viewport["zoom"].as_f64().unwrap_or(1.0),
    ))
}

async fn enable_interception(
    target: &Target,
    options: &CaptureOptions,
    cancel: &CancellationToken,
) -> Result<Option<Interceptor>, CaptureError> {
    let rules = interception_rules(options)?;
    if rules.is_empty() {
        return Ok(None);
    }
    let params = rules.fetch_enable_params();
    let interceptor = Interceptor::spawn(target.handle(), rules, cancel.child_token());
    step(target, "request interception", "Fetch.enable", params).await?;
    Ok(Some(interceptor))
}

/// Builds the interception rules for a session
pub fn interception_rules(options: &CaptureOptions) -> Result<InterceptionRules, CaptureError> {
    let blocked_urls = options
        .blocked_urls
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| CaptureError::Setup {
                step: "blocked URLs",
                source: crate::cdp::CdpError::Protocol(format!(
                    "invalid pattern '{}': {}",
                    pattern, e
                )),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InterceptionRules {
        proxy_credentials: options.proxy_username.as_ref().map(|username| {
            (
                username.clone(),
                options.proxy_password.clone().unwrap_or_default(),
            )
        }),
        blocked_urls,
        track_document: options.wants_http_info().then(|| options.url.clone()),
    })
}

/// Parses `name:value` media features
pub fn media_features(features: &[String]) -> Vec<Value> {
    features
        .iter()
        .filter_map(|feature| {
            let (name, value) = feature.split_once(':')?;
            Some(json!({ "name": name.trim(), "value": value.trim() }))
        })
        .collect()
}
