//! Slash-delimited path helpers shared by every provider.
//!
//! Providers accept both `/` and `\` from callers; everything past the public
//! surface works with the canonical `/` form.

use std::borrow::Cow;

/// The canonical separator.
pub const SEPARATOR: char = '/';

/// Replaces `\` with `/`. Borrows when nothing needs rewriting.
#[must_use]
pub fn normalize(path: &str) -> Cow<'_, str> {
    if path.contains('\\') { Cow::Owned(path.replace('\\', "/")) } else { Cow::Borrowed(path) }
}

/// Iterates the non-empty segments of a path, in order.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|segment| !segment.is_empty())
}

/// `true` when the path addresses the provider root (empty or whitespace only).
#[must_use]
pub fn is_root(path: &str) -> bool {
    segments(path.trim()).next().is_none()
}

/// Splits a path into its parent and final segment.
///
/// ```rust
/// use depot_storage::path::split_parent;
///
/// assert_eq!(split_parent("docs/2024/report.pdf"), ("docs/2024".into(), Some("report.pdf")));
/// assert_eq!(split_parent("report.pdf"), ("".into(), Some("report.pdf")));
/// assert_eq!(split_parent("/"), ("".into(), None));
/// ```
#[must_use]
pub fn split_parent(path: &str) -> (String, Option<&str>) {
    let parts: Vec<&str> = segments(path).collect();
    match parts.split_last() {
        Some((name, parent)) => (parent.join("/"), Some(*name)),
        None => (String::new(), None),
    }
}

/// Final segment of a path, if any.
#[must_use]
pub fn file_name(path: &str) -> Option<&str> {
    segments(path).last()
}

/// Joins a base and a child with exactly one separator.
#[must_use]
pub fn join(base: &str, child: &str) -> String {
    let base = base.trim_end_matches(['/', '\\']);
    let child = child.trim_start_matches(['/', '\\']);
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}{SEPARATOR}{child}"),
    }
}
