//! Cookie inputs
//!
//! Three formats are accepted: a JSON array of cookie objects, Netscape
//! cookie-file text, and the comma-separated command-line form
//! `name,value,domain,path,expires,httpOnly,secure,sameSite,url`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("Failed to read cookies file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid cookie '{0}': name and value are required")]
    Invalid(String),
}

/// A cookie in the shape `Network.setCookies` expects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// Reads a cookies file, JSON first and Netscape text otherwise
pub fn load_cookies_file(path: &Path) -> Result<Vec<Cookie>, CookieError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_cookies(&content))
}

/// Parses cookie file content in either supported format
pub fn parse_cookies(content: &str) -> Vec<Cookie> {
    match serde_json::from_str::<Vec<Cookie>>(content) {
        Ok(cookies) => cookies,
        Err(_) => parse_netscape_cookies(content),
    }
}

/// Parses Netscape cookie-file text
///
/// Lines have seven tab-separated fields: domain, include-subdomains flag,
/// path, secure flag, expiry, name and value. A `#HttpOnly_` prefix on the
/// domain marks an HTTP-only cookie; other `#` lines are comments.
pub fn parse_netscape_cookies(content: &str) -> Vec<Cookie> {
    const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
                Some(rest) => (rest, true),
                None if line.starts_with('#') => return None,
                None => (line, false),
            };
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 7 {
                return None;
            }
            Some(Cookie {
                name: fields[5].to_string(),
                value: fields[6].to_string(),
                domain: Some(fields[0].to_string()),
                path: Some(fields[2].to_string()),
                secure: Some(fields[3] == "TRUE"),
                http_only: Some(http_only),
                expires: fields[4].parse::<f64>().ok().filter(|expires| *expires != 0.0),
                ..Default::default()
            })
        })
        .collect()
}

/// Parses `name,value,domain,path,expires,httpOnly,secure,sameSite,url`
///
/// Trailing fields may be omitted; empty fields are left unset.
pub fn parse_cookie_arg(arg: &str) -> Result<Cookie, CookieError> {
    let fields: Vec<&str> = arg.split(',').map(str::trim).collect();
    let field = |index: usize| {
        fields
            .get(index)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
    };

    let (Some(name), Some(value)) = (field(0), fields.get(1)) else {
        return Err(CookieError::Invalid(arg.to_string()));
    };
    if name.is_empty() {
        return Err(CookieError::Invalid(arg.to_string()));
    }

    Ok(Cookie {
        name,
        value: value.to_string(),
        domain: field(2),
        path: field(3),
        expires: field(4).and_then(|expires| expires.parse().ok()),
        http_only: field(5).map(|flag| flag.eq_ignore_ascii_case("true")),
        secure: field(6).map(|flag| flag.eq_ignore_ascii_case("true")),
        same_site: field(7),
        url: field(8),
    })
}
