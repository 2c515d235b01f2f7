//! URL handling for crawl tasks
//!
//! This module provides seed and link resolution, inner/child link
//! classification relative to a crawl root, and link rewriting rules.

mod resolve;
mod rewrite;

pub use resolve::{
    base_directory, is_absolute_url, is_child_link, is_inner_link, resolve_link, same_origin,
    resolve_seed,
};
pub use rewrite::{parse_rewrite_rules, rewrite_link, RewriteRule};
