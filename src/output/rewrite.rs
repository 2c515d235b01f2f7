//! Replacing crawled URLs with saved filenames in output files

use regex::{NoExpand, Regex, RegexBuilder};
use std::path::{Path, PathBuf};

/// A crawled page: the URL other pages link to and where it was saved
#[derive(Debug, Clone, PartialEq)]
pub struct SavedPage {
    pub original_url: String,
    pub path: PathBuf,
}

fn case_insensitive(literal: &str) -> Option<Regex> {
    RegexBuilder::new(&regex::escape(literal))
        .case_insensitive(true)
        .build()
        .ok()
}

fn replace_literal(content: String, from: &str, to: &str) -> String {
    match case_insensitive(from) {
        Some(pattern) => pattern.replace_all(&content, NoExpand(to)).into_owned(),
        None => content,
    }
}

/// Path of `target` as referenced from a file at `from`
///
/// Relative to `from`'s directory when `target` lives below it.
pub fn reference_from(from: &Path, target: &Path) -> String {
    let relative = from
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .and_then(|parent| target.strip_prefix(parent).ok());
    relative.unwrap_or(target).to_string_lossy().into_owned()
}

/// Rewrites references to `url` in the quoted and bare attribute forms
///
/// Handles `"url"`, `'url'`, `=url ` and `=url>`, ignoring case. In the
/// bare forms spaces in the filename are encoded as `%20`.
pub fn replace_url_references(content: String, url: &str, filename: &str) -> String {
    let encoded = filename.replace(' ', "%20");
    let content = replace_literal(
        content,
        &format!("\"{}\"", url),
        &format!("\"{}\"", filename),
    );
    let content = replace_literal(content, &format!("'{}'", url), &format!("'{}'", filename));
    let content = replace_literal(content, &format!("={} ", url), &format!("={} ", encoded));
    replace_literal(content, &format!("={}>", url), &format!("={}>", encoded))
}

/// Points every saved page's links to other crawled pages at their files
///
/// Files that cannot be read or written are skipped.
pub async fn replace_urls_in_outputs(pages: &[SavedPage]) {
    for page in pages {
        let content = match tokio::fs::read_to_string(&page.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Not rewriting {}: {}", page.path.display(), e);
                continue;
            }
        };
        let rewritten = pages.iter().fold(content, |content, other| {
            let filename = reference_from(&page.path, &other.path);
            replace_url_references(content, &other.original_url, &filename)
        });
        if let Err(e) = tokio::fs::write(&page.path, rewritten).await {
            tracing::warn!("Failed to rewrite links in {}: {}", page.path.display(), e);
        }
    }
}
