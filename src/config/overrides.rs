//! Layered capture options
//!
//! Every layer (config file, profile, command line, URL list line) is a set
//! of keys overlaid on the options below it. Layers are merged through the
//! serde data model: the lower layer is serialized to a JSON object, the
//! upper layer's keys replace its entries, and the result is deserialized
//! back, so type errors and unknown keys surface as `ConfigError`.

use crate::browser::parse_cookie_arg;
use crate::capture::CaptureOptions;
use crate::crawler::CrawlInput;
use crate::ConfigError;
use serde_json::{Map, Value};
use std::path::Path;

/// Applies `layer` on top of `base`
///
/// # Arguments
///
/// * `base` - The options below this layer
/// * `layer` - Kebab-case keys, as in the `[capture]` table
///
/// # Returns
///
/// * `Ok(CaptureOptions)` - The merged options
/// * `Err(ConfigError)` - A key is unknown or a value has the wrong type
pub fn overlay(base: &CaptureOptions, layer: &Map<String, Value>) -> Result<CaptureOptions, ConfigError> {
    if layer.is_empty() {
        return Ok(base.clone());
    }
    let Value::Object(mut merged) = to_json(base)? else {
        return Err(ConfigError::Validation("capture options are not a table".to_string()));
    };
    for (key, value) in layer {
        if !merged.contains_key(key) {
            return Err(ConfigError::UnknownOption(key.clone()));
        }
        let mut single = merged.clone();
        single.insert(key.clone(), value.clone());
        if let Err(e) = serde_json::from_value::<CaptureOptions>(Value::Object(single)) {
            return Err(ConfigError::InvalidValue {
                key: key.clone(),
                reason: e.to_string(),
            });
        }
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged)).map_err(|e| ConfigError::InvalidValue {
        key: "capture".to_string(),
        reason: e.to_string(),
    })
}

fn to_json(options: &CaptureOptions) -> Result<Value, ConfigError> {
    serde_json::to_value(options).map_err(|e| ConfigError::Validation(e.to_string()))
}

/// Parses `--flag value`, `--flag=value` and bare `--flag` arguments
///
/// Values are coerced by the type of the option they set, read from
/// `base`: booleans and numbers are parsed, list options collect every
/// occurrence, `http-headers` takes `Name: value` pairs and `cookies` the
/// comma-separated cookie form.
pub fn parse_flag_overrides(
    args: &[String],
    base: &CaptureOptions,
) -> Result<Map<String, Value>, ConfigError> {
    let Value::Object(shape) = to_json(base)? else {
        return Ok(Map::new());
    };
    let mut layer = Map::new();
    let mut index = 0;

    while index < args.len() {
        let arg = &args[index];
        index += 1;
        let Some(flag) = arg.strip_prefix("--") else {
            return Err(ConfigError::InvalidValue {
                key: arg.clone(),
                reason: "expected a --flag".to_string(),
            });
        };
        let (key, inline) = match flag.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (flag.to_string(), None),
        };
        let Some(existing) = shape.get(&key) else {
            return Err(ConfigError::UnknownOption(key));
        };

        let raw = match inline {
            Some(value) => Some(value),
            None if existing.is_boolean() => match args.get(index).map(String::as_str) {
                Some(value @ ("true" | "false")) => {
                    index += 1;
                    Some(value.to_string())
                }
                _ => None,
            },
            None => {
                let value = args.get(index).ok_or_else(|| ConfigError::InvalidValue {
                    key: key.clone(),
                    reason: "missing value".to_string(),
                })?;
                index += 1;
                Some(value.clone())
            }
        };

        let value = coerce(&key, existing, raw.as_deref(), layer.get(&key))?;
        layer.insert(key, value);
    }
    Ok(layer)
}

/// Converts a flag value to the JSON type of the option it sets
///
/// `previous` is the value an earlier occurrence of the same flag produced.
fn coerce(
    key: &str,
    existing: &Value,
    raw: Option<&str>,
    previous: Option<&Value>,
) -> Result<Value, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: key.to_string(),
        reason,
    };
    let Some(raw) = raw else {
        return Ok(Value::Bool(true));
    };

    match existing {
        Value::Bool(_) => raw
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| invalid(format!("'{}' is not a boolean", raw))),
        Value::Number(_) => serde_json::from_str::<serde_json::Number>(raw)
            .map(Value::Number)
            .map_err(|_| invalid(format!("'{}' is not a number", raw))),
        Value::Array(_) if raw.trim_start().starts_with('[') => {
            serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))
        }
        Value::Array(_) => {
            let item = if key == "cookies" {
                let cookie = parse_cookie_arg(raw).map_err(|e| invalid(e.to_string()))?;
                serde_json::to_value(cookie).map_err(|e| invalid(e.to_string()))?
            } else {
                Value::String(raw.to_string())
            };
            let mut items = match previous {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            items.push(item);
            Ok(Value::Array(items))
        }
        Value::Object(_) if raw.trim_start().starts_with('{') => {
            serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))
        }
        Value::Object(_) => {
            let (name, value) = raw
                .split_once(':')
                .ok_or_else(|| invalid(format!("expected 'name: value', got '{}'", raw)))?;
            let mut entries = match previous {
                Some(Value::Object(entries)) => entries.clone(),
                _ => Map::new(),
            };
            entries.insert(name.trim().to_string(), Value::String(value.trim().to_string()));
            Ok(Value::Object(entries))
        }
        Value::Null => Ok(match serde_json::from_str::<Value>(raw) {
            Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
            _ => Value::String(raw.to_string()),
        }),
        Value::String(_) => Ok(Value::String(raw.to_string())),
    }
}

/// Splits a URL list line into words, honoring double and single quotes
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Parses one URL list line
///
/// Blank lines and `#` comments yield `None`. Flags after the URL override
/// `defaults` for that URL only.
pub fn parse_url_line(line: &str, defaults: &CaptureOptions) -> Result<Option<CrawlInput>, ConfigError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = split_words(line).into_iter();
    let Some(url) = words.next() else {
        return Ok(None);
    };
    let args: Vec<String> = words.collect();
    if args.is_empty() {
        return Ok(Some(CrawlInput::new(url)));
    }
    let layer = parse_flag_overrides(&args, defaults)?;
    Ok(Some(CrawlInput::with_options(url, overlay(defaults, &layer)?)))
}

/// Reads a URL list file
pub fn load_url_list(path: &Path, defaults: &CaptureOptions) -> Result<Vec<CrawlInput>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut inputs = Vec::new();
    for line in content.lines() {
        if let Some(input) = parse_url_line(line, defaults)? {
            inputs.push(input);
        }
    }
    Ok(inputs)
}
