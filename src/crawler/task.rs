//! Crawl task records

use crate::capture::CaptureOptions;
use crate::state::TaskStatus;
use crate::url::{is_child_link, is_inner_link};
use serde::{Deserialize, Serialize};

/// One URL of a crawl, with where it sits in the crawl tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub url: String,

    /// URL as first discovered, the one other pages reference
    pub original_url: String,

    /// URL of the seed task this task descends from; `None` for seeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_url: Option<String>,

    /// Hops from the seed task
    pub depth: u32,

    /// Hops since the crawl left the root's host; -1 while on it
    pub external_link_depth: i32,

    #[serde(default)]
    pub is_inner_link: bool,

    #[serde(default)]
    pub is_child: bool,

    /// Absent once processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<CaptureOptions>,

    #[serde(default)]
    pub status: TaskStatus,

    /// Where the result was saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Failure message when the capture failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// A task for a URL given by the user
    pub fn seed(url: impl Into<String>, options: CaptureOptions) -> Self {
        let url = url.into();
        Self {
            original_url: url.clone(),
            url,
            root_url: None,
            depth: 0,
            external_link_depth: -1,
            is_inner_link: false,
            is_child: false,
            options: Some(options),
            status: TaskStatus::Pending,
            filename: None,
            error: None,
        }
    }

    /// A task for a link found on `parent`'s page
    pub fn child(url: impl Into<String>, parent: &Task, options: CaptureOptions) -> Self {
        let url = url.into();
        let root_url = parent.root_url.clone().unwrap_or_else(|| parent.url.clone());
        let is_inner_link = is_inner_link(&url, &root_url);
        let is_child = is_inner_link && is_child_link(&url, &root_url);
        Self {
            original_url: url.clone(),
            url,
            depth: parent.depth + 1,
            external_link_depth: if is_inner_link {
                -1
            } else {
                parent.external_link_depth + 1
            },
            is_inner_link,
            is_child,
            root_url: Some(root_url),
            options: Some(options),
            status: TaskStatus::Pending,
            filename: None,
            error: None,
        }
    }

    /// Whether links found on this task's page may still be followed
    ///
    /// A limit of 0 means unbounded.
    pub fn within_depth(&self, options: &CaptureOptions) -> bool {
        let depth_ok = options.crawl_max_depth == 0 || self.depth <= options.crawl_max_depth;
        let external_ok = options.crawl_external_links_max_depth == 0
            || self.external_link_depth < options.crawl_external_links_max_depth as i32;
        depth_ok && external_ok
    }

    /// Whether the inner-links-only and no-parent policies admit this task
    pub fn allowed_by(&self, options: &CaptureOptions) -> bool {
        (!options.crawl_inner_links_only || self.is_inner_link)
            && (!options.crawl_no_parent || self.is_child || !self.is_inner_link)
    }

    /// Moves the status one step forward
    ///
    /// Returns false, leaving the status untouched, for any other move.
    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}
