//! Logical path utilities shared by the registry and the data sources.
//!
//! Container paths are slash-separated logical names (`"sales/daily"`), not
//! filesystem paths. They are compared after normalization so that
//! `"/sales//daily/"` and `"sales/daily"` name the same container.

use std::path::{Path, PathBuf};

/// Normalize a logical container path.
///
/// Strips leading and trailing separators and collapses repeated ones.
/// The root container normalizes to the empty string.
///
/// # Example
/// ```
/// use tessera_config::path::normalize_container_path;
/// assert_eq!(normalize_container_path("//a//b/"), "a/b");
/// assert_eq!(normalize_container_path("/"), "");
/// ```
pub fn normalize_container_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check whether `container` is a segment-wise prefix of `path`.
///
/// Both arguments are normalized first. The root container contains every path.
pub fn container_contains(container: &str, path: &str) -> bool {
    let container = normalize_container_path(container);
    let path = normalize_container_path(path);
    if container.is_empty() {
        return true;
    }
    path == container || path.starts_with(&format!("{}/", container))
}

/// Append a logical (slash-separated) child to a filesystem directory.
///
/// An empty child yields `parent` unchanged.
pub fn append_logical(parent: &Path, child: &str) -> PathBuf {
    let normalized = normalize_container_path(child);
    if normalized.is_empty() {
        return parent.to_path_buf();
    }
    normalized
        .split('/')
        .fold(parent.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Compute relative path from base to target.
///
/// Returns None if `target` is not below `base`.
pub fn compute_relative_path(base: impl AsRef<Path>, target: impl AsRef<Path>) -> Option<PathBuf> {
    target
        .as_ref()
        .strip_prefix(base.as_ref())
        .ok()
        .map(|p| p.to_path_buf())
}
