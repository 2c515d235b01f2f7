use crate::browser::BrowserConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Main configuration structure, as read from the TOML file
///
/// Capture settings stay as raw tables here: they are layers merged onto
/// the built-in defaults, so only the keys a layer names take effect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub browser: BrowserConfig,

    pub scheduler: SchedulerConfig,

    /// `[capture]` keys, same names as the command-line flags
    pub capture: Map<String, Value>,

    /// `[profiles.<name>]` tables applied on top of `[capture]`
    pub profiles: BTreeMap<String, Map<String, Value>>,
}

/// Crawl scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Maximum number of capture sessions running at once
    pub max_parallel_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_workers: 8,
        }
    }
}
