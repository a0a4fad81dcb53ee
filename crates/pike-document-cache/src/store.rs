//! The snapshot store.
//!
//! Singleton in the mediator. Writes come from the validation pipeline
//! only; feature handlers read, or block on the in-flight validation via
//! [`DocumentCache::wait_for`] instead of serving a stale snapshot.

use crate::entry::DocumentCacheEntry;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Per-URI store of analysis snapshots with pending-validation futures.
#[derive(Debug, Default)]
pub struct DocumentCache {
    entries: Mutex<FxHashMap<String, Arc<DocumentCacheEntry>>>,
    pending: Mutex<FxHashMap<String, watch::Receiver<bool>>>,
}

impl DocumentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for `uri`, if one has been built.
    pub fn get(&self, uri: &str) -> Option<Arc<DocumentCacheEntry>> {
        self.entries.lock().get(uri).cloned()
    }

    /// Replace the snapshot for `uri` atomically.
    ///
    /// Refuses entries older than the stored version and reports whether
    /// the write happened: once version V is cached, no V' < V is ever
    /// cached for the same URI (stale validations discard themselves here).
    pub fn insert(&self, uri: &str, entry: DocumentCacheEntry) -> bool {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(uri) {
            if entry.version < existing.version {
                tracing::debug!(
                    uri,
                    stale = entry.version,
                    current = existing.version,
                    "discarding stale snapshot"
                );
                return false;
            }
        }
        entries.insert(uri.to_string(), Arc::new(entry));
        true
    }

    /// Skip-path refresh: bump version and hashes on the existing entry
    /// without touching symbols or diagnostics.
    pub fn refresh_unchanged(
        &self,
        uri: &str,
        version: i32,
        content_hash: String,
        line_hashes: Vec<u64>,
    ) -> bool {
        let mut entries = self.entries.lock();
        let Some(existing) = entries.get(uri) else { return false };
        if version < existing.version {
            return false;
        }
        let mut updated = (**existing).clone();
        updated.version = version;
        updated.content_hash = content_hash;
        updated.line_hashes = line_hashes;
        entries.insert(uri.to_string(), Arc::new(updated));
        true
    }

    /// Drop the snapshot for `uri`.
    pub fn remove(&self, uri: &str) {
        self.entries.lock().remove(uri);
    }

    /// Number of cached snapshots.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Mark a validation as in flight for `uri`.
    ///
    /// The returned guard resolves all waiters when dropped (normally or on
    /// an error path - completion is completion either way).
    pub fn begin_validation(&self, uri: &str) -> ValidationGuard {
        let (tx, rx) = watch::channel(false);
        self.pending.lock().insert(uri.to_string(), rx);
        ValidationGuard { tx: Some(tx), uri: uri.to_string() }
    }

    /// Wait until the in-flight validation for `uri` (if any) finishes,
    /// then return the current snapshot.
    pub async fn wait_for(&self, uri: &str) -> Option<Arc<DocumentCacheEntry>> {
        let rx = self.pending.lock().get(uri).cloned();
        if let Some(mut rx) = rx {
            // A dropped sender also means the validation is over.
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
        self.get(uri)
    }

    /// Clear a finished validation's pending marker.
    fn finish_validation(&self, uri: &str) {
        self.pending.lock().remove(uri);
    }
}

/// RAII marker for an in-flight validation.
///
/// Dropping it wakes every [`DocumentCache::wait_for`] caller.
#[derive(Debug)]
pub struct ValidationGuard {
    tx: Option<watch::Sender<bool>>,
    uri: String,
}

impl ValidationGuard {
    /// Complete the validation explicitly, waking waiters.
    pub fn finish(mut self, cache: &DocumentCache) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(true);
        }
        cache.finish_validation(&self.uri);
    }
}

impl Drop for ValidationGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(true);
        }
    }
}
