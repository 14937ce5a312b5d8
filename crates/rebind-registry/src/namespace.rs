#![forbid(unsafe_code)]

//! Module-path inclusion matching.
//!
//! Patterns use `::` separators. A plain pattern matches exactly one path;
//! a pattern ending in `::*` matches the base path itself and everything
//! beneath it.

use ahash::AHashSet;

/// String/prefix matcher deciding which module paths participate in
/// component discovery.
pub struct ModulePathFilter {
    exact: AHashSet<String>,
    recursive: Vec<String>,
}

impl ModulePathFilter {
    /// Build a filter from patterns like `"app::viewmodels"` (exact) or
    /// `"app::services::*"` (the base and everything beneath it).
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut exact = AHashSet::new();
        let mut recursive = Vec::new();
        for pattern in patterns {
            let pattern = pattern.into();
            if let Some(base) = pattern.strip_suffix("::*") {
                exact.insert(base.to_string());
                recursive.push(format!("{base}::"));
            } else {
                exact.insert(pattern);
            }
        }
        Self { exact, recursive }
    }

    /// Whether `path` is included. The empty path never is.
    #[must_use]
    pub fn includes(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        if self.exact.contains(path) {
            return true;
        }
        self.recursive.iter().any(|prefix| path.starts_with(prefix))
    }
}
