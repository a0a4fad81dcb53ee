//! The compiled-program cache.
//!
//! Shape: `path → {cache_key → CompilationResult}`. The nested map gives
//! O(1) invalidate-by-path; per-path only a single key is retained, so each
//! new version supersedes older ones for the same path.
//!
//! # Size bound
//!
//! A hard cap on distinct paths (default 500). When inserting a *new* path
//! would exceed it, the whole cache is cleared rather than evicting
//! piecemeal; entries are cheap to rebuild and a full wipe keeps the
//! dependency graph trivially consistent.

use crate::graph::DependencyGraph;
use crate::key::CacheKey;
use crate::tracker::DependencyTracker;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default cap on distinct cached paths.
pub const DEFAULT_MAX_FILES: usize = 500;

/// Severity of a compile diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Compilation error
    Error,
    /// Compilation warning
    Warning,
    /// Informational note
    Information,
}

/// One diagnostic produced by compilation.
#[derive(Debug, Clone, Serialize)]
pub struct CompileDiagnostic {
    /// Severity class
    pub severity: DiagnosticSeverity,
    /// Human-readable message
    pub message: String,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column; negative when unknown
    pub character: i32,
}

/// What the compile callback hands back to the cache.
#[derive(Debug)]
pub struct CompileOutcome<P> {
    /// Compiled program handle; `None` when compilation failed
    pub program: Option<P>,
    /// Diagnostics emitted during compilation
    pub diagnostics: Vec<CompileDiagnostic>,
}

/// A cached compilation: program handle, diagnostics, and the dependency
/// paths compilation actually resolved (observed via compiler callbacks,
/// not parsed from the source).
#[derive(Debug)]
pub struct CompilationResult<P> {
    /// Opaque compiled-program handle; `None` for failed compiles
    pub program: Option<P>,
    /// Diagnostics from the compile
    pub diagnostics: Vec<CompileDiagnostic>,
    /// Project-internal paths resolved during compilation
    pub dependencies: Vec<String>,
}

/// Result of a cache fetch, mirroring the `_perf` block of the analyze
/// response.
#[derive(Debug)]
pub struct CacheLookup<P> {
    /// The compilation, shared with the cache
    pub result: Arc<CompilationResult<P>>,
    /// True when the result came from the cache without compiling
    pub cache_hit: bool,
    /// Rendered cache key (`LSP:<v>` or `FS:<mtime>\0<size>`)
    pub cache_key: String,
}

/// Cache statistics, serialized verbatim for `get_cache_stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that compiled
    pub misses: u64,
    /// Entries dropped by supersession or the nuclear wipe
    pub evictions: u64,
    /// Distinct paths currently cached
    pub size: usize,
    /// Configured path cap
    pub max_files: usize,
}

/// Errors from cache lookups.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The file backing a closed-document lookup no longer exists.
    #[error("file removed: {0}")]
    FileRemoved(String),
    /// Statting the file failed for a reason other than absence.
    #[error("failed to stat {path}")]
    Stat {
        /// Path that failed to stat
        path: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// The analyzer-side compiled-program cache.
///
/// Generic over the program handle type `P` (the embedding process supplies
/// its real compiled-program representation; tests use placeholders). Lives
/// for the analyzer process lifetime and is cleared only on restart.
pub struct CompilationCache<P> {
    entries: FxHashMap<String, FxHashMap<CacheKey, Arc<CompilationResult<P>>>>,
    graph: DependencyGraph,
    project_root: PathBuf,
    max_files: usize,
    stats: CacheStats,
}

impl<P> CompilationCache<P> {
    /// Create a cache scoped to `project_root` with the default path cap.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self::with_max_files(project_root, DEFAULT_MAX_FILES)
    }

    /// Create a cache with an explicit path cap.
    pub fn with_max_files(project_root: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            graph: DependencyGraph::new(),
            project_root: project_root.into(),
            max_files,
            stats: CacheStats { max_files, ..CacheStats::default() },
        }
    }

    /// Look up `path`, compiling on miss.
    ///
    /// `document_version > 0` marks an open document: the key is
    /// `LSP:<version>` and no filesystem stat happens. Otherwise the key
    /// derives from a stat of `path`; a missing file invalidates any prior
    /// entry and fails with [`CacheError::FileRemoved`].
    ///
    /// On miss, `compile` runs with a fresh [`DependencyTracker`]; the
    /// captured dependencies replace the graph edges for `path` in the same
    /// critical section that stores the result.
    pub fn fetch_or_compile<F>(
        &mut self,
        path: &str,
        document_version: i32,
        compile: F,
    ) -> Result<CacheLookup<P>, CacheError>
    where
        F: FnOnce(&mut DependencyTracker) -> CompileOutcome<P>,
    {
        let key = self.key_for(path, document_version)?;

        if let Some(hit) = self.entries.get(path).and_then(|per_path| per_path.get(&key)) {
            self.stats.hits += 1;
            tracing::debug!(path, key = %key, "compilation cache hit");
            return Ok(CacheLookup {
                result: Arc::clone(hit),
                cache_hit: true,
                cache_key: key.to_string(),
            });
        }

        self.stats.misses += 1;
        let mut tracker = DependencyTracker::new(&self.project_root);
        let outcome = compile(&mut tracker);
        let dependencies = tracker.into_dependencies();

        let result = Arc::new(CompilationResult {
            program: outcome.program,
            diagnostics: outcome.diagnostics,
            dependencies: dependencies.clone(),
        });

        self.store(path, key.clone(), Arc::clone(&result), dependencies);

        Ok(CacheLookup { result, cache_hit: false, cache_key: key.to_string() })
    }

    fn key_for(&mut self, path: &str, document_version: i32) -> Result<CacheKey, CacheError> {
        if document_version > 0 {
            return Ok(CacheKey::editor(document_version));
        }
        match CacheKey::disk(Path::new(path)) {
            Ok(key) => Ok(key),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.invalidate(path);
                Err(CacheError::FileRemoved(path.to_string()))
            }
            Err(e) => Err(CacheError::Stat { path: path.to_string(), source: e }),
        }
    }

    fn store(
        &mut self,
        path: &str,
        key: CacheKey,
        result: Arc<CompilationResult<P>>,
        dependencies: Vec<String>,
    ) {
        let is_new_path = !self.entries.contains_key(path);
        if is_new_path && self.entries.len() >= self.max_files {
            self.clear_all();
            tracing::warn!(
                max_files = self.max_files,
                "compilation cache exceeded path cap; cleared"
            );
        }

        let per_path = self.entries.entry(path.to_string()).or_default();
        // Per-path versions are not retained: any entry under a different
        // key is stale and goes away now.
        let stale = per_path.len();
        if stale > 0 {
            self.stats.evictions += stale as u64;
            per_path.clear();
        }
        per_path.insert(key, result);

        self.graph.set_dependencies(path, dependencies);
        self.stats.size = self.entries.len();
    }

    /// Drop the entry for `path` and its forward dependency edges.
    pub fn invalidate(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.stats.evictions += 1;
        }
        self.graph.remove_file(path);
        self.stats.size = self.entries.len();
    }

    /// Invalidate `changed_path` and everything that transitively depends
    /// on it. Breadth-first over the reverse edges; a visited set keeps
    /// inheritance cycles finite.
    pub fn invalidate_transitive(&mut self, changed_path: &str) {
        let affected = self.graph.transitive_dependents(changed_path);
        self.invalidate(changed_path);
        for path in &affected {
            self.invalidate(path);
        }
        if !affected.is_empty() {
            tracing::debug!(
                changed = changed_path,
                count = affected.len(),
                "transitively invalidated dependents"
            );
        }
    }

    /// Wipe everything: entries, graph, size. Hit/miss counters survive.
    pub fn clear_all(&mut self) {
        self.stats.evictions += self.entries.len() as u64;
        self.entries.clear();
        self.graph.clear();
        self.stats.size = 0;
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.size = self.entries.len();
        stats
    }

    /// Read access to the dependency graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Whether an entry for `path` is currently cached (any key).
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn compiled(program: &str) -> CompileOutcome<String> {
        CompileOutcome { program: Some(program.to_string()), diagnostics: Vec::new() }
    }

    #[test]
    fn test_open_document_hits_on_same_version() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::new("/project");

        let first = cache.fetch_or_compile("/project/b.pike", 1, |_| compiled("p1"))?;
        assert!(!first.cache_hit);
        assert_eq!(first.cache_key, "LSP:1");

        let second = cache.fetch_or_compile("/project/b.pike", 1, |_| {
            unreachable!("cache hit must not recompile")
        })?;
        assert!(second.cache_hit);
        assert_eq!(second.result.program.as_deref(), Some("p1"));
        Ok(())
    }

    #[test]
    fn test_new_version_supersedes_old_entry() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::new("/project");
        cache.fetch_or_compile("/project/a.pike", 1, |_| compiled("v1"))?;
        cache.fetch_or_compile("/project/a.pike", 2, |_| compiled("v2"))?;

        // v1's key is gone; only one entry per path is retained.
        let miss = cache.fetch_or_compile("/project/a.pike", 1, |_| compiled("v1-again"))?;
        assert!(!miss.cache_hit);
        assert_eq!(cache.stats().evictions, 2);
        Ok(())
    }

    #[test]
    fn test_missing_file_invalidates_and_fails() -> Result<(), Box<dyn std::error::Error>> {
        let mut cache: CompilationCache<String> = CompilationCache::new("/");
        cache.fetch_or_compile("/no/such/file.pike", 3, |_| compiled("p"))?;

        // Closed-document lookup stats the filesystem and finds nothing.
        let err = cache.fetch_or_compile("/no/such/file.pike", 0, |_| compiled("p"));
        assert!(matches!(err, Err(CacheError::FileRemoved(_))));
        assert!(!cache.contains("/no/such/file.pike"));
        Ok(())
    }

    #[test]
    fn test_closed_file_hit_when_stat_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stable.pike");
        let mut f = std::fs::File::create(&path)?;
        f.write_all(b"class C {}\n")?;
        f.sync_all()?;
        let path_str = path.to_string_lossy().into_owned();

        let mut cache: CompilationCache<String> = CompilationCache::new(dir.path());
        let first = cache.fetch_or_compile(&path_str, 0, |_| compiled("p"))?;
        assert!(!first.cache_hit);
        assert!(first.cache_key.starts_with("FS:"));

        let second = cache.fetch_or_compile(&path_str, 0, |_| unreachable!())?;
        assert!(second.cache_hit);
        Ok(())
    }

    #[test]
    fn test_dependency_capture_updates_graph() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::new("/project");
        cache.fetch_or_compile("/project/child.pike", 1, |tracker| {
            tracker.record_inherit(Path::new("/project/base.pike"));
            tracker.record_import(Path::new("/usr/lib/pike/Stdio.pmod"));
            compiled("child")
        })?;

        assert_eq!(
            cache.graph().dependencies_of("/project/child.pike"),
            &["/project/base.pike".to_string()]
        );
        assert_eq!(
            cache.graph().dependents_of("/project/base.pike"),
            vec!["/project/child.pike".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_transitive_invalidation_clears_dependents() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::new("/project");
        cache.fetch_or_compile("/project/base.pike", 1, |_| compiled("base"))?;
        cache.fetch_or_compile("/project/child.pike", 1, |tracker| {
            tracker.record_inherit(Path::new("/project/base.pike"));
            compiled("child")
        })?;

        cache.invalidate_transitive("/project/base.pike");

        assert!(!cache.contains("/project/base.pike"));
        assert!(!cache.contains("/project/child.pike"));
        // No dangling edges afterwards.
        assert!(cache.graph().is_empty());
        assert!(cache.graph().is_consistent());
        Ok(())
    }

    #[test]
    fn test_nuclear_eviction_on_path_cap() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::with_max_files("/p", 2);
        cache.fetch_or_compile("/p/a.pike", 1, |_| compiled("a"))?;
        cache.fetch_or_compile("/p/b.pike", 1, |_| compiled("b"))?;
        assert_eq!(cache.stats().size, 2);

        // Third distinct path trips the cap: everything goes.
        cache.fetch_or_compile("/p/c.pike", 1, |_| compiled("c"))?;
        assert_eq!(cache.stats().size, 1);
        assert!(cache.contains("/p/c.pike"));
        assert!(!cache.contains("/p/a.pike"));
        Ok(())
    }

    #[test]
    fn test_existing_path_does_not_trip_cap() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::with_max_files("/p", 2);
        cache.fetch_or_compile("/p/a.pike", 1, |_| compiled("a"))?;
        cache.fetch_or_compile("/p/b.pike", 1, |_| compiled("b"))?;
        // Re-storing a known path at a new version is not a new path.
        cache.fetch_or_compile("/p/a.pike", 2, |_| compiled("a2"))?;
        assert_eq!(cache.stats().size, 2);
        assert!(cache.contains("/p/b.pike"));
        Ok(())
    }

    #[test]
    fn test_stats_track_hits_and_misses() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::new("/p");
        cache.fetch_or_compile("/p/a.pike", 1, |_| compiled("a"))?;
        cache.fetch_or_compile("/p/a.pike", 1, |_| unreachable!())?;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_files, DEFAULT_MAX_FILES);
        Ok(())
    }

    #[test]
    fn test_failed_compile_is_cached_with_diagnostics() -> Result<(), CacheError> {
        let mut cache: CompilationCache<String> = CompilationCache::new("/p");
        let lookup = cache.fetch_or_compile("/p/broken.pike", 1, |_| CompileOutcome {
            program: None,
            diagnostics: vec![CompileDiagnostic {
                severity: DiagnosticSeverity::Error,
                message: "syntax error, unexpected '}'".into(),
                line: 4,
                character: 0,
            }],
        })?;

        assert!(lookup.result.program.is_none());
        assert_eq!(lookup.result.diagnostics.len(), 1);

        // The failure is cached too; re-analyzing the same version is a hit.
        let again = cache.fetch_or_compile("/p/broken.pike", 1, |_| unreachable!())?;
        assert!(again.cache_hit);
        Ok(())
    }
}
