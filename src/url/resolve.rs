use crate::UrlError;
use std::path::Path;
use url::Url;

const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "file"];

/// Returns true when `input` already is an absolute `http(s)` or `file` URL
pub fn is_absolute_url(input: &str) -> bool {
    SUPPORTED_SCHEMES.iter().any(|scheme| {
        input
            .get(..scheme.len() + 3)
            .map(|prefix| prefix.eq_ignore_ascii_case(&format!("{}://", scheme)))
            .unwrap_or(false)
    })
}

/// Turns a seed input into a URL
///
/// Inputs that are not URLs are filesystem paths relative to `cwd`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sumi_archive::url::resolve_seed;
///
/// let url = resolve_seed("https://example.test/a", Path::new("/tmp")).unwrap();
/// assert_eq!(url, "https://example.test/a");
///
/// let url = resolve_seed("pages/index.html", Path::new("/srv/site")).unwrap();
/// assert_eq!(url, "file:///srv/site/pages/index.html");
/// ```
pub fn resolve_seed(input: &str, cwd: &Path) -> Result<String, UrlError> {
    let input = input.trim();
    if is_absolute_url(input) {
        return Ok(input.to_string());
    }
    if input.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    let base = Url::from_directory_path(cwd)
        .map_err(|_| UrlError::Malformed(format!("not an absolute directory: {}", cwd.display())))?;
    let relative = input.replace('\\', "/").replace('#', "%23");
    base.join(&relative)
        .map(String::from)
        .map_err(|e| UrlError::Parse(format!("Invalid URL or file path {}: {}", input, e)))
}

/// Resolves a discovered link against the page it was found on
///
/// Links that do not end up as `http(s)` or `file` URLs are dropped.
pub fn resolve_link(link: &str, base: &str) -> Option<String> {
    if link.is_empty() {
        return None;
    }
    if is_absolute_url(link) {
        return Some(link.to_string());
    }
    let resolved = Url::parse(base).ok()?.join(link).ok()?;
    SUPPORTED_SCHEMES
        .contains(&resolved.scheme())
        .then(|| resolved.to_string())
}

/// Whether two URLs share scheme, host, port and credentials
///
/// `file` URLs have opaque origins, so for them the host alone decides.
pub fn same_origin(left: &Url, right: &Url) -> bool {
    let origin_matches = if left.scheme() == "file" || right.scheme() == "file" {
        left.scheme() == right.scheme() && left.host_str() == right.host_str()
    } else {
        left.origin() == right.origin()
    };
    origin_matches && left.username() == right.username() && left.password() == right.password()
}

/// Everything up to and including the last `/` of `url`
pub fn base_directory(url: &str) -> &str {
    match url.rfind('/') {
        Some(index) => &url[..=index],
        None => "",
    }
}

/// Whether `link` has the same origin as the root task
pub fn is_inner_link(link: &str, root_url: &str) -> bool {
    match (Url::parse(link), Url::parse(root_url)) {
        (Ok(link), Ok(root)) => same_origin(&link, &root),
        _ => false,
    }
}

/// Whether `link` is an inner link below the root task's directory
pub fn is_child_link(link: &str, root_url: &str) -> bool {
    let directory = base_directory(root_url);
    is_inner_link(link, root_url) && !directory.is_empty() && link.starts_with(directory)
}
