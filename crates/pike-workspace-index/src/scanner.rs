//! Recursive workspace scanning with WalkDir.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use url::Url;
use walkdir::WalkDir;

/// Scan configuration.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum directory depth; 0 means unlimited
    pub max_depth: usize,
    /// Extensions that identify source files (lowercase, no dot)
    pub extensions: Vec<String>,
    /// Directory names excluded from the walk
    pub exclude_names: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: 0,
            extensions: vec!["pike".to_string(), "pmod".to_string()],
            exclude_names: [".git", ".hg", ".svn", "node_modules", "dist", "build", ".cache"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// One tracked workspace file.
#[derive(Debug, Clone)]
pub struct WorkspaceFile {
    /// file:// URI
    pub uri: String,
    /// Filesystem path
    pub path: PathBuf,
    /// Modification time at scan
    pub last_modified: Option<SystemTime>,
    /// Declared symbol names, once some analysis cached them
    symbols: Option<FxHashSet<String>>,
}

/// Result of a scan pass.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    /// Files recorded
    pub files: usize,
    /// Entries skipped by the exclusion rules
    pub excluded: usize,
    /// Wall-clock scan duration
    pub duration: Duration,
}

/// Enumerates and tracks project files; feeds identifier lookups for
/// cross-file features (references, workspace symbols).
#[derive(Debug, Default)]
pub struct WorkspaceScanner {
    options: ScanOptions,
    files: Mutex<FxHashMap<String, WorkspaceFile>>,
    roots: Mutex<Vec<PathBuf>>,
}

impl WorkspaceScanner {
    /// Scanner with default options.
    pub fn new() -> Self {
        Self::with_options(ScanOptions::default())
    }

    /// Scanner with explicit options.
    pub fn with_options(options: ScanOptions) -> Self {
        Self { options, files: Mutex::new(FxHashMap::default()), roots: Mutex::new(Vec::new()) }
    }

    /// Recursively scan the given roots, replacing prior state.
    pub fn initialize(&self, roots: &[PathBuf]) -> ScanSummary {
        self.files.lock().clear();
        *self.roots.lock() = roots.to_vec();

        let start = Instant::now();
        let mut total = ScanSummary { files: 0, excluded: 0, duration: Duration::ZERO };
        for root in roots {
            let summary = self.scan_root(root);
            total.files += summary.files;
            total.excluded += summary.excluded;
        }
        total.duration = start.elapsed();
        tracing::info!(
            files = total.files,
            excluded = total.excluded,
            ms = total.duration.as_millis() as u64,
            "workspace scan complete"
        );
        total
    }

    /// Add one folder incrementally.
    pub fn add_folder(&self, path: &Path) -> ScanSummary {
        self.roots.lock().push(path.to_path_buf());
        self.scan_root(path)
    }

    /// Remove a folder and every file recorded under it.
    pub fn remove_folder(&self, path: &Path) {
        self.roots.lock().retain(|root| root != path);
        self.files.lock().retain(|_, file| !file.path.starts_with(path));
    }

    /// URIs of files that may declare `name`.
    ///
    /// Files with cached symbol tables answer exactly; files without are
    /// conservatively included so a deeper search can decide.
    pub fn search_symbol(&self, name: &str) -> Vec<String> {
        self.files
            .lock()
            .values()
            .filter(|file| match &file.symbols {
                Some(symbols) => symbols.contains(name),
                None => true,
            })
            .map(|file| file.uri.clone())
            .collect()
    }

    /// Record the declared names for a file (called after analysis).
    pub fn record_symbols(&self, uri: &str, names: impl IntoIterator<Item = String>) {
        if let Some(file) = self.files.lock().get_mut(uri) {
            file.symbols = Some(names.into_iter().collect());
        }
    }

    /// Drop cached symbol information for a file.
    pub fn invalidate_file(&self, uri: &str) {
        if let Some(file) = self.files.lock().get_mut(uri) {
            file.symbols = None;
        }
    }

    /// Number of tracked files.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Look up one tracked file.
    pub fn get(&self, uri: &str) -> Option<WorkspaceFile> {
        self.files.lock().get(uri).cloned()
    }

    fn scan_root(&self, root: &Path) -> ScanSummary {
        let start = Instant::now();
        let mut files = 0usize;
        let mut excluded = 0usize;

        let mut walker = WalkDir::new(root).follow_links(false);
        if self.options.max_depth > 0 {
            walker = walker.max_depth(self.options.max_depth);
        }
        let exclude = &self.options.exclude_names;
        let iter = walker.into_iter().filter_entry(|entry| {
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                if exclude.iter().any(|ex| ex == name.as_ref()) {
                    return false;
                }
            }
            true
        });

        for entry in iter {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Never fatal: one unreadable directory is not a reason
                    // to lose the rest of the workspace.
                    tracing::debug!(error = %e, "workspace scan entry error");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !self.matches_extension(entry.path()) {
                excluded += 1;
                continue;
            }
            let Ok(uri) = Url::from_file_path(entry.path()) else {
                continue;
            };
            let last_modified = match entry.metadata() {
                Ok(meta) => meta.modified().ok(),
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "stat failed");
                    None
                }
            };
            self.files.lock().insert(
                uri.to_string(),
                WorkspaceFile {
                    uri: uri.to_string(),
                    path: entry.path().to_path_buf(),
                    last_modified,
                    symbols: None,
                },
            );
            files += 1;
        }

        ScanSummary { files, excluded, duration: start.elapsed() }
    }

    fn matches_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.options.extensions.iter().any(|allowed| *allowed == ext)
    }
}
