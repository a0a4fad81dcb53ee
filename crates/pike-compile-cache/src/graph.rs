//! Forward and reverse dependency edges.
//!
//! Two maps maintained in lockstep: `dependencies` (path → files it pulled
//! in at compile time) and `dependents` (path → files that pulled it in).
//! Every public mutation updates both before returning, so the reverse map
//! is the exact inverse of the forward map at all times.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Project dependency graph captured during compilation.
///
/// Only paths inside the project root are ever recorded (the
/// [`DependencyTracker`](crate::DependencyTracker) filters at capture time),
/// which bounds the graph to the workspace.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges: path → paths its compilation resolved
    dependencies: FxHashMap<String, Vec<String>>,
    /// Reverse edges: path → paths whose compilation resolved it
    dependents: FxHashMap<String, FxHashSet<String>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the forward edge list for `path`, keeping the reverse map in
    /// sync. Old edges are removed before the new ones are added.
    pub fn set_dependencies(&mut self, path: &str, deps: Vec<String>) {
        self.drop_forward_edges(path);

        // Dedup while preserving capture order.
        let mut seen = FxHashSet::default();
        let deps: Vec<String> =
            deps.into_iter().filter(|d| d != path && seen.insert(d.clone())).collect();

        for dep in &deps {
            self.dependents.entry(dep.clone()).or_default().insert(path.to_string());
        }
        if deps.is_empty() {
            self.dependencies.remove(path);
        } else {
            self.dependencies.insert(path.to_string(), deps);
        }
        debug_assert!(self.is_consistent());
    }

    /// Remove `path` as a dependency source: drop its forward edges and the
    /// matching reverse entries. Edges *into* `path` (recorded on other
    /// nodes) are untouched.
    pub fn remove_file(&mut self, path: &str) {
        self.drop_forward_edges(path);
        debug_assert!(self.is_consistent());
    }

    fn drop_forward_edges(&mut self, path: &str) {
        if let Some(old) = self.dependencies.remove(path) {
            for dep in old {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.remove(path);
                    if set.is_empty() {
                        self.dependents.remove(&dep);
                    }
                }
            }
        }
    }

    /// Files whose compilation resolved `path`.
    pub fn dependents_of(&self, path: &str) -> Vec<String> {
        self.dependents.get(path).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    /// Files `path` resolved during its last compilation.
    pub fn dependencies_of(&self, path: &str) -> &[String] {
        self.dependencies.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breadth-first walk over `dependents`, starting from (but excluding)
    /// `path`. The visited set makes inheritance cycles terminate.
    pub fn transitive_dependents(&self, path: &str) -> Vec<String> {
        let mut visited = FxHashSet::default();
        visited.insert(path.to_string());
        let mut queue: VecDeque<String> = self.dependents_of(path).into();
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for next in self.dependents_of(&current) {
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
            out.push(current);
        }
        out
    }

    /// Drop every edge.
    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
    }

    /// Number of files with recorded forward edges.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// True when no edges are recorded.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Verify that the reverse map is the exact inverse of the forward map.
    pub fn is_consistent(&self) -> bool {
        for (path, deps) in &self.dependencies {
            for dep in deps {
                match self.dependents.get(dep) {
                    Some(set) if set.contains(path) => {}
                    _ => return false,
                }
            }
        }
        for (dep, set) in &self.dependents {
            for path in set {
                match self.dependencies.get(path) {
                    Some(deps) if deps.contains(dep) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_forward_and_reverse_stay_inverse() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("child.pike", vec!["base.pike".into(), "util.pike".into()]);
        graph.set_dependencies("other.pike", vec!["base.pike".into()]);

        let mut deps = graph.dependents_of("base.pike");
        deps.sort();
        assert_eq!(deps, vec!["child.pike".to_string(), "other.pike".to_string()]);
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_replacing_edges_removes_stale_reverse_entries() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("child.pike", vec!["base.pike".into()]);
        graph.set_dependencies("child.pike", vec!["new_base.pike".into()]);

        assert!(graph.dependents_of("base.pike").is_empty());
        assert_eq!(graph.dependents_of("new_base.pike"), vec!["child.pike".to_string()]);
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_self_edges_are_dropped() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("a.pike", vec!["a.pike".into(), "b.pike".into()]);
        assert_eq!(graph.dependencies_of("a.pike"), &["b.pike".to_string()]);
    }

    #[test]
    fn test_transitive_dependents_walks_chain() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("mid.pike", vec!["base.pike".into()]);
        graph.set_dependencies("leaf.pike", vec!["mid.pike".into()]);

        let mut reached = graph.transitive_dependents("base.pike");
        reached.sort();
        assert_eq!(reached, vec!["leaf.pike".to_string(), "mid.pike".to_string()]);
    }

    #[test]
    fn test_transitive_dependents_terminates_on_cycle() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("a.pike", vec!["b.pike".into()]);
        graph.set_dependencies("b.pike", vec!["a.pike".into()]);

        assert_eq!(graph.transitive_dependents("a.pike"), vec!["b.pike".to_string()]);
    }

    #[test]
    fn test_remove_file_prunes_reverse_edges() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("child.pike", vec!["base.pike".into()]);
        graph.remove_file("child.pike");

        assert!(graph.dependents_of("base.pike").is_empty());
        assert!(graph.is_empty());
        assert!(graph.is_consistent());
    }
}
