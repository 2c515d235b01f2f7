use crate::capture::CaptureOptions;
use crate::config::types::{Config, SchedulerConfig};
use crate::url::parse_rewrite_rules;
use crate::ConfigError;
use regex::Regex;

/// Validates the parts of the configuration that do not depend on layering
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler_config(&config.scheduler)?;
    if let Some(endpoint) = &config.browser.remote_endpoint {
        url::Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid remote-endpoint '{}': {}", endpoint, e))
        })?;
    }
    Ok(())
}

/// Validates scheduler configuration
pub fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.max_parallel_workers < 1 || config.max_parallel_workers > 100 {
        return Err(ConfigError::Validation(format!(
            "max_parallel_workers must be between 1 and 100, got {}",
            config.max_parallel_workers
        )));
    }
    Ok(())
}

/// Validates fully layered capture options
pub fn validate_capture_options(options: &CaptureOptions) -> Result<(), ConfigError> {
    if options.readiness_ladder.is_empty() {
        return Err(ConfigError::Validation(
            "readiness_ladder cannot be empty".to_string(),
        ));
    }

    if !options
        .readiness_ladder
        .iter()
        .any(|name| *name == options.wait_until)
    {
        return Err(ConfigError::Validation(format!(
            "wait_until '{}' is not in the readiness ladder ({})",
            options.wait_until,
            options.readiness_ladder.join(", ")
        )));
    }

    if options.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "chunk_size must be greater than 0".to_string(),
        ));
    }

    for pattern in &options.blocked_urls {
        Regex::new(pattern).map_err(|e| {
            ConfigError::Validation(format!("Invalid blocked_urls pattern '{}': {}", pattern, e))
        })?;
    }

    parse_rewrite_rules(&options.crawl_rewrite_rules)
        .map_err(|e| ConfigError::Validation(e.to_string()))?;

    if options.proxy_password.is_some() && options.proxy_username.is_none() {
        return Err(ConfigError::Validation(
            "proxy_password requires proxy_username".to_string(),
        ));
    }

    Ok(())
}
