//! The analyze orchestrator: document lifecycle events in, analyzer
//! requests and cache mutations out.
//!
//! Open and save validate immediately; changes debounce behind a per-URI
//! timer gated on the expected document version, so a stale timer firing
//! after an undo can never overwrite a fresher snapshot. When the change
//! classifier proves an edit semantically inert, the analyzer round-trip
//! is skipped entirely and only version/hash metadata is refreshed.
//!
//! Validation work runs through the request scheduler under the key
//! `validate:<uri>`: a newer validation for the same document supersedes
//! an older one at its next checkpoint, before any cache write.

pub mod diagnostics;
pub mod merge;

use crate::sink::DiagnosticsSink;
use crate::state::{DocumentState, ServerConfig};
use parking_lot::Mutex;
use pike_bridge::{AnalyzeOp, AnalyzeResponse, BridgeError, PikeBridge, WireToken};
use pike_document_cache::{
    DocumentCache, DocumentCacheEntry, InheritanceTable, classify, hashing, positions,
};
use pike_scheduler::{Checkpoint, RequestClass, RequestScheduler, ScheduleError, ScheduleOptions};
use pike_symbol_types::flatten_symbols;
use pike_workspace_index::WorkspaceScanner;
use rustc_hash::FxHashSet;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// The analyzer operations a validation needs.
///
/// Abstract so tests can substitute a scripted analyzer; production wires
/// in [`PikeBridge`].
pub trait AnalyzeBackend: Send + Sync + 'static {
    /// Run the unified analyze call for one document.
    fn analyze_document(
        &self,
        code: String,
        filename: String,
        version: i32,
    ) -> impl Future<Output = Result<AnalyzeResponse, BridgeError>> + Send;
}

impl AnalyzeBackend for PikeBridge {
    fn analyze_document(
        &self,
        code: String,
        filename: String,
        version: i32,
    ) -> impl Future<Output = Result<AnalyzeResponse, BridgeError>> + Send {
        let bridge = self.clone();
        async move { bridge.analyze(&code, &AnalyzeOp::ALL, &filename, version).await }
    }
}

struct PendingValidation {
    expected_version: i32,
    /// Inclusive changed-line window accumulated since the last snapshot;
    /// `None` once any change was a full replacement.
    change_range: Option<(u32, u32)>,
    timer: tokio::task::JoinHandle<()>,
}

/// Debounced validation pipeline: classify, analyze, update caches, emit
/// diagnostics.
pub struct AnalyzeOrchestrator<B: AnalyzeBackend> {
    backend: B,
    scheduler: RequestScheduler,
    cache: Arc<DocumentCache>,
    scanner: Arc<WorkspaceScanner>,
    inherits: Arc<InheritanceTable>,
    sink: Arc<dyn DiagnosticsSink>,
    config: Arc<Mutex<ServerConfig>>,
    documents: Arc<Mutex<HashMap<String, DocumentState>>>,
    pending: Mutex<HashMap<String, PendingValidation>>,
}

impl<B: AnalyzeBackend> AnalyzeOrchestrator<B> {
    /// Wire the pipeline together.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: B,
        scheduler: RequestScheduler,
        cache: Arc<DocumentCache>,
        scanner: Arc<WorkspaceScanner>,
        inherits: Arc<InheritanceTable>,
        sink: Arc<dyn DiagnosticsSink>,
        config: Arc<Mutex<ServerConfig>>,
        documents: Arc<Mutex<HashMap<String, DocumentState>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            scheduler,
            cache,
            scanner,
            inherits,
            sink,
            config,
            documents,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// The snapshot store (read-side for feature handlers).
    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// Validate immediately, bypassing debounce and classification
    /// (didOpen, didSave).
    pub fn validate_now(self: &Arc<Self>, uri: &str) {
        self.cancel_timer(uri);
        let this = Arc::clone(self);
        let uri = uri.to_string();
        tokio::spawn(async move {
            this.run_validation(uri, None).await;
        });
    }

    /// Schedule a debounced validation for version `version` (didChange).
    ///
    /// `change_lines` is the inclusive line window of this change set, or
    /// `None` for a full-document replacement.
    pub fn validate_debounced(
        self: &Arc<Self>,
        uri: &str,
        version: i32,
        change_lines: Option<(u32, u32)>,
    ) {
        let delay = self.config.lock().diagnostic_delay();

        let merged_range = {
            let mut pending = self.pending.lock();
            let prior = pending.remove(uri);
            let merged = match &prior {
                None => change_lines,
                // Accumulate the window across rapid edits: the cached
                // line hashes predate all of them, so the comparison must
                // cover every touched line.
                Some(prev) => match (prev.change_range, change_lines) {
                    (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
                    _ => None,
                },
            };
            if let Some(prev) = prior {
                prev.timer.abort();
            }
            merged
        };

        let this = Arc::clone(self);
        let timer_uri = uri.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.debounce_fired(timer_uri, version).await;
        });

        self.pending.lock().insert(
            uri.to_string(),
            PendingValidation { expected_version: version, change_range: merged_range, timer },
        );
    }

    /// Tear down all state for a closed document and clear its
    /// diagnostics in the editor.
    pub fn document_closed(self: &Arc<Self>, uri: &str) {
        self.cancel_timer(uri);
        self.cache.remove(uri);
        self.inherits.remove(uri);
        self.scanner.invalidate_file(uri);
        self.sink.publish(uri, None, &[]);
    }

    fn cancel_timer(&self, uri: &str) {
        if let Some(prev) = self.pending.lock().remove(uri) {
            prev.timer.abort();
        }
    }

    async fn debounce_fired(self: Arc<Self>, uri: String, expected_version: i32) {
        let change_range = {
            let mut pending = self.pending.lock();
            match pending.get(&uri) {
                Some(p) if p.expected_version == expected_version => {
                    pending.remove(&uri).and_then(|p| p.change_range)
                }
                // A newer change rescheduled this URI; that timer owns it.
                _ => return,
            }
        };

        let Some((text, version)) =
            self.documents.lock().get(&uri).map(|d| (d.text.clone(), d.version))
        else {
            return;
        };
        if version != expected_version {
            // A newer change is already scheduled. Validating now would
            // overwrite a fresher snapshot with stale results.
            tracing::trace!(uri, expected_version, version, "stale validation dropped");
            return;
        }

        let previous = self.cache.get(&uri);
        let verdict = classify(previous.as_deref(), &text, change_range);
        if verdict.can_skip {
            tracing::debug!(uri, reason = ?verdict.reason, "re-analysis skipped");
            self.cache.refresh_unchanged(&uri, version, verdict.content_hash, verdict.line_hashes);
            return;
        }
        // Thread the freshly computed hashes into the pipeline so they are
        // not recomputed after analysis.
        self.run_validation(uri, Some((verdict.content_hash, verdict.line_hashes))).await;
    }

    async fn run_validation(self: &Arc<Self>, uri: String, hashes: Option<(String, Vec<u64>)>) {
        let guard = self.cache.begin_validation(&uri);
        let this = Arc::clone(self);
        let task_uri = uri.clone();
        let result = self
            .scheduler
            .schedule(
                ScheduleOptions::new(RequestClass::Interactive).with_key(format!("validate:{uri}")),
                move |checkpoint| async move {
                    this.validation_task(checkpoint, task_uri, hashes).await
                },
            )
            .await;
        guard.finish(&self.cache);

        match result {
            Ok(()) => {}
            Err(ScheduleError::Superseded) => {
                // By design: a fresher validation for this URI is in
                // flight. Not a failure.
                tracing::trace!(uri, "validation superseded");
            }
            Err(e) => {
                tracing::warn!(uri, error = %e, "validation failed");
                // Clear diagnostics so the Problems pane does not keep
                // results from a version we could not analyze.
                self.sink.publish(&uri, None, &[]);
            }
        }
    }

    async fn validation_task(
        self: Arc<Self>,
        checkpoint: Checkpoint,
        uri: String,
        hashes: Option<(String, Vec<u64>)>,
    ) -> Result<(), ScheduleError> {
        let Some((text, version)) =
            self.documents.lock().get(&uri).map(|d| (d.text.clone(), d.version))
        else {
            return Ok(()); // closed while queued
        };
        checkpoint.check()?;

        let response = self
            .backend
            .analyze_document(text.clone(), filename_of(&uri), version)
            .await
            .map_err(|e| ScheduleError::Task(anyhow::anyhow!(e)))?;

        // Last checkpoint before cache writes: a superseded validation
        // must have no observable side effect on any cache.
        checkpoint.check()?;

        // Per-operation failures degrade to empty defaults so the rest of
        // the pipeline sees a uniform structure.
        let parse = response.parse.unwrap_or_default();
        let introspect = response.introspect.unwrap_or_default();
        let compile_diags = response.diagnostics.unwrap_or_default();
        let tokens = response.tokenize.ok();

        let introspection_symbols = introspect.symbols.clone();
        let deprecated: FxHashSet<String> = flatten_symbols(&introspection_symbols)
            .into_iter()
            .filter(|s| s.is_deprecated())
            .map(|s| s.name)
            .collect();

        // Positions from parse, types and modifiers from introspection.
        let merged = merge::merge_symbols(parse.symbols, introspect.symbols);
        let flat = flatten_symbols(&merged);

        let symbol_positions = match tokens {
            Some(tokens) if !tokens.is_empty() => {
                positions::build_reference_index(&text, &flat, &doc_tokens(&tokens))
            }
            // Token data unavailable: regex fallback with comment skip.
            _ => positions::scan_reference_index(&text, &flat),
        };

        let max_problems = self.config.lock().max_number_of_problems;
        let diagnostics = diagnostics::build_diagnostics(
            &parse.diagnostics,
            &compile_diags,
            &introspect.diagnostics,
            &deprecated,
            max_problems,
        );

        let (content_hash, line_hashes) = hashes
            .unwrap_or_else(|| (hashing::content_hash(&text), hashing::line_hashes(&text)));

        let inherit_edges = introspect.inherits.clone();
        let mut entry = DocumentCacheEntry {
            version,
            symbols: merged,
            diagnostics: diagnostics.clone(),
            symbol_positions,
            symbol_names: FxHashSet::default(),
            content_hash,
            line_hashes,
            introspection: (!introspection_symbols.is_empty()).then_some(introspection_symbols),
            inherits: introspect.inherits,
        };
        entry.index_symbol_names();
        let names: Vec<String> = entry.symbol_names.iter().cloned().collect();

        // Insert refuses entries older than the cached version; a stale
        // validation discards itself here instead of publishing.
        if self.cache.insert(&uri, entry) {
            self.scanner.record_symbols(&uri, names);
            self.inherits.update(&uri, inherit_edges);
            self.sink.publish(&uri, Some(version), &diagnostics);
            tracing::debug!(
                uri,
                version,
                cache_hit = response.perf.cache_hit,
                cache_key = %response.perf.cache_key,
                "validation published"
            );
        }
        Ok(())
    }
}

/// Analyzer-facing filename for a document URI.
fn filename_of(uri: &str) -> String {
    Url::parse(uri)
        .ok()
        .and_then(|url| url.to_file_path().ok())
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| uri.to_string())
}

fn doc_tokens(tokens: &[WireToken]) -> Vec<positions::Token> {
    tokens
        .iter()
        .map(|t| positions::Token { text: t.text.clone(), line: t.line, character: t.character })
        .collect()
}
