use crate::UrlError;
use regex::Regex;

/// A `<pattern> <replacement>` rule applied to discovered links
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    /// Parses a rule; a missing replacement deletes the first match
    pub fn parse(rule: &str) -> Result<Self, UrlError> {
        let mut parts = rule.split_whitespace();
        let pattern = parts
            .next()
            .ok_or_else(|| UrlError::InvalidRewriteRule(rule.to_string()))?;
        let pattern = Regex::new(pattern)
            .map_err(|e| UrlError::InvalidRewriteRule(format!("{}: {}", rule, e)))?;
        Ok(Self {
            pattern,
            replacement: parts.next().unwrap_or_default().to_string(),
        })
    }

    /// Rewrites the first match only
    pub fn apply(&self, url: &str) -> String {
        self.pattern
            .replace(url, self.replacement.as_str())
            .trim()
            .to_string()
    }
}

/// Parses every rule, skipping blank ones
pub fn parse_rewrite_rules(rules: &[String]) -> Result<Vec<RewriteRule>, UrlError> {
    rules
        .iter()
        .filter(|rule| !rule.trim().is_empty())
        .map(|rule| RewriteRule::parse(rule))
        .collect()
}

/// Normalizes a discovered link before it becomes a task
///
/// # Arguments
///
/// * `url` - The link as reported by the page
/// * `remove_fragment` - Drop everything from the first `#`
/// * `rules` - Applied in order, each to the output of the previous one
pub fn rewrite_link(url: &str, remove_fragment: bool, rules: &[RewriteRule]) -> String {
    let mut url = url.trim().to_string();
    if remove_fragment {
        if let Some(index) = url.find('#') {
            url.truncate(index);
        }
    }
    for rule in rules {
        url = rule.apply(&url);
    }
    url
}
