//! Request classification
//!
//! Picks out the requests a tag policy applies to: `PUT` to the
//! manifest-by-tag endpoint, `/v2/{project}/manifests/{tag}`.
//!
//! Paths are matched in decoded form; the registry resolves `%6Catest` to
//! `latest`, so the filter has to as well.

use axum::http::Method;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Manifest-by-tag URL. Capture 1 is the project path with its trailing `/`,
/// capture 2 is the tag (1 to 128 ASCII word characters, `.` or `-`, not
/// starting with `.` or `-`).
const PROJECT_TAG_URL: &str = concat!(
    r"^/v2/((?:[a-zA-Z0-9]+(?:[._-][a-zA-Z0-9]+)*/)+)",
    r"manifests/([A-Za-z0-9_][A-Za-z0-9_.-]{0,127})$",
);

static PROJECT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PROJECT_TAG_URL).expect("manifest URL pattern is valid"));

/// A push of `tag` into `project`, borrowed from the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRequest<'a> {
    /// Project path without surrounding slashes, e.g. `library/nginx`
    pub project: &'a str,
    /// Tag being written, e.g. `1.25-alpine`
    pub tag: &'a str,
}

/// Percent-decode a request path
///
/// A path that does not decode to UTF-8 is returned unchanged; it cannot
/// match the manifest pattern either way.
pub fn decode_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}

/// Classify a request, returning the project and tag for manifest pushes
pub fn classify<'a>(method: &Method, path: &'a str) -> Option<TagRequest<'a>> {
    if method != Method::PUT {
        return None;
    }
    classify_path(path)
}

/// Match a URL path against the manifest-by-tag pattern, ignoring the method
pub fn classify_path(path: &str) -> Option<TagRequest<'_>> {
    let captures = PROJECT_TAG_RE.captures(path)?;
    let project = captures.get(1)?.as_str().trim_end_matches('/');
    let tag = captures.get(2)?.as_str();
    Some(TagRequest { project, tag })
}
