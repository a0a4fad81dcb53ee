//! Per-compilation dependency capture.
//!
//! The analyzer exposes compilation through a tracking handler that
//! overrides the resolve-inherit, resolve-import, and resolve-include
//! hooks. Each hook performs the underlying resolution, then hands the
//! resolved path to a [`DependencyTracker`]. Tracker instances are created
//! per compilation request and never shared; bleed-over between nested or
//! concurrent compiles would corrupt the graph.

use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

/// Records the project-internal paths one compilation resolved.
///
/// Standard-library paths (anything outside the project root) are
/// deliberately excluded to bound the dependency graph.
#[derive(Debug)]
pub struct DependencyTracker {
    project_root: PathBuf,
    resolved: Vec<String>,
    seen: FxHashSet<String>,
}

impl DependencyTracker {
    /// Create a tracker scoped to the given project root.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self { project_root: project_root.into(), resolved: Vec::new(), seen: FxHashSet::default() }
    }

    /// Record a path resolved by an `inherit` directive.
    pub fn record_inherit(&mut self, resolved: &Path) {
        self.record(resolved);
    }

    /// Record a path resolved by an `import` directive.
    pub fn record_import(&mut self, resolved: &Path) {
        self.record(resolved);
    }

    /// Record a path resolved by an `#include` directive.
    pub fn record_include(&mut self, resolved: &Path) {
        self.record(resolved);
    }

    fn record(&mut self, resolved: &Path) {
        if !resolved.starts_with(&self.project_root) {
            tracing::trace!(path = %resolved.display(), "skipping dependency outside project root");
            return;
        }
        let path = resolved.to_string_lossy().into_owned();
        if self.seen.insert(path.clone()) {
            self.resolved.push(path);
        }
    }

    /// Number of distinct dependencies captured so far.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// True when nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Consume the tracker, yielding dependencies in capture order.
    pub fn into_dependencies(self) -> Vec<String> {
        self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_paths_inside_root() {
        let mut tracker = DependencyTracker::new("/project");
        tracker.record_inherit(Path::new("/project/lib/base.pike"));
        tracker.record_include(Path::new("/project/include/defs.h"));

        assert_eq!(
            tracker.into_dependencies(),
            vec!["/project/lib/base.pike".to_string(), "/project/include/defs.h".to_string()]
        );
    }

    #[test]
    fn test_excludes_stdlib_paths() {
        let mut tracker = DependencyTracker::new("/project");
        tracker.record_import(Path::new("/usr/lib/pike/modules/Stdio.pmod"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_dedupes_repeated_resolution() {
        let mut tracker = DependencyTracker::new("/project");
        tracker.record_inherit(Path::new("/project/base.pike"));
        tracker.record_include(Path::new("/project/base.pike"));
        assert_eq!(tracker.len(), 1);
    }
}
