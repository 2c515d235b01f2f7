use crate::capture::CaptureOptions;
use crate::config::overrides::overlay;
use crate::config::types::Config;
use crate::config::validation::{validate, validate_capture_options};
use crate::ConfigError;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_archive::config::load_config;
///
/// let config = load_config(Path::new("sumi.toml")).unwrap();
/// println!("Workers: {}", config.scheduler.max_parallel_workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored alongside a saved session so a resumed crawl can tell whether its
/// configuration changed in between.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Resolves the default capture options for a run
///
/// Layers, lowest first: built-in defaults, `[capture]`, the selected
/// `[profiles.<name>]`, then `cli` (flags given on the command line).
pub fn build_capture_options(
    config: &Config,
    profile: Option<&str>,
    cli: &Map<String, Value>,
) -> Result<CaptureOptions, ConfigError> {
    let mut options = overlay(&CaptureOptions::default(), &config.capture)?;

    if let Some(name) = profile {
        let layer = config
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        options = overlay(&options, layer)?;
    }

    let options = overlay(&options, cli)?;
    validate_capture_options(&options)?;
    Ok(options)
}
