//! End-to-end validation pipeline tests against a scripted analyzer.
//!
//! The fake analyzer understands a toy dialect: every line of the form
//! `int <name>;` declares a variable, and a declaration line missing its
//! semicolon produces one `syntax-error` diagnostic. Its compilation
//! cache is keyed by `(filename, LSP:<version>)` like the real one.

use lsp_types::NumberOrString;
use parking_lot::Mutex;
use pike_bridge::{
    AnalyzeResponse, BridgeError, OpOutcome, ParseResult, PerfInfo, WireDiagnostic, WireSeverity,
};
use pike_lsp::orchestrator::{AnalyzeBackend, AnalyzeOrchestrator};
use pike_lsp::sink::{DiagnosticsSink, RecordingSink};
use pike_lsp::state::{DocumentState, ServerConfig};
use pike_document_cache::{DocumentCache, InheritanceTable};
use pike_scheduler::RequestScheduler;
use pike_symbol_types::{PikeSymbol, PikeSymbolKind, WirePosition};
use pike_workspace_index::WorkspaceScanner;
use rustc_hash::FxHashSet;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct FakeAnalyzer {
    /// (filename, documentVersion) per analyze call, in order
    calls: Arc<Mutex<Vec<(String, i32)>>>,
    /// Simulated analyzer-side compilation cache keys
    seen_keys: Arc<Mutex<FxHashSet<String>>>,
    /// Artificial per-call latency
    latency: Option<Duration>,
}

impl FakeAnalyzer {
    fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Default::default() }
    }

    fn calls(&self) -> Vec<(String, i32)> {
        self.calls.lock().clone()
    }
}

impl AnalyzeBackend for FakeAnalyzer {
    fn analyze_document(
        &self,
        code: String,
        filename: String,
        version: i32,
    ) -> impl Future<Output = Result<AnalyzeResponse, BridgeError>> + Send {
        let this = self.clone();
        async move {
            if let Some(latency) = this.latency {
                tokio::time::sleep(latency).await;
            }
            this.calls.lock().push((filename.clone(), version));

            let cache_key = format!("{}\u{1}LSP:{}", filename, version);
            let cache_hit = !this.seen_keys.lock().insert(cache_key);

            let mut symbols = Vec::new();
            let mut diagnostics = Vec::new();
            for (line_no, line) in code.lines().enumerate() {
                let trimmed = line.trim();
                let Some(rest) = trimmed.strip_prefix("int ") else { continue };
                let name: String = rest
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if !name.is_empty() {
                    let mut symbol = PikeSymbol::new(name, PikeSymbolKind::Variable);
                    symbol.position = Some(WirePosition::new(line_no as u32, 4));
                    symbols.push(symbol);
                }
                if !trimmed.ends_with(';') {
                    diagnostics.push(WireDiagnostic {
                        severity: WireSeverity::Error,
                        message: "syntax error: missing ';'".to_string(),
                        line: line_no as u32,
                        character: trimmed.len() as i32,
                        code: Some("syntax-error".to_string()),
                    });
                }
            }

            Ok(AnalyzeResponse {
                parse: OpOutcome::Ok(ParseResult { symbols, diagnostics }),
                introspect: OpOutcome::Failed("no compilation in fake analyzer".to_string()),
                diagnostics: OpOutcome::Ok(Vec::new()),
                tokenize: OpOutcome::Absent,
                perf: PerfInfo { cache_hit, cache_key: format!("LSP:{}", version) },
            })
        }
    }
}

struct Harness {
    orchestrator: Arc<AnalyzeOrchestrator<FakeAnalyzer>>,
    documents: Arc<Mutex<HashMap<String, DocumentState>>>,
    sink: Arc<RecordingSink>,
    backend: FakeAnalyzer,
    cache: Arc<DocumentCache>,
}

fn harness_with(backend: FakeAnalyzer) -> Harness {
    let documents: Arc<Mutex<HashMap<String, DocumentState>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let cache = Arc::new(DocumentCache::new());
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = AnalyzeOrchestrator::new(
        backend.clone(),
        RequestScheduler::new(),
        Arc::clone(&cache),
        Arc::new(WorkspaceScanner::new()),
        Arc::new(InheritanceTable::new()),
        Arc::clone(&sink) as Arc<dyn DiagnosticsSink>,
        Arc::new(Mutex::new(ServerConfig::default())),
        Arc::clone(&documents),
    );
    Harness { orchestrator, documents, sink, backend, cache }
}

fn harness() -> Harness {
    harness_with(FakeAnalyzer::default())
}

impl Harness {
    fn open(&self, uri: &str, text: &str, version: i32) {
        self.documents.lock().insert(uri.to_string(), DocumentState::new(text, version, "pike"));
        self.orchestrator.validate_now(uri);
    }

    fn change(&self, uri: &str, text: &str, version: i32, lines: Option<(u32, u32)>) {
        if let Some(doc) = self.documents.lock().get_mut(uri) {
            doc.apply_change(None, text, version);
        }
        self.orchestrator.validate_debounced(uri, version, lines);
    }

    fn save(&self, uri: &str) {
        self.orchestrator.validate_now(uri);
    }

    fn close(&self, uri: &str) {
        self.documents.lock().remove(uri);
        self.orchestrator.document_closed(uri);
    }
}

/// Drain timers and queued work; paused time advances automatically.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(2_000)).await;
}

const URI: &str = "file:///project/a.pike";

#[tokio::test(start_paused = true)]
async fn test_open_edit_close_scenario() {
    let h = harness();

    // Open a clean document: one validation, zero diagnostics.
    h.open(URI, "int x;\n", 1);
    settle().await;

    let (version, diagnostics) = h.sink.last_for(URI).unwrap_or((None, vec![]));
    assert_eq!(version, Some(1));
    assert!(diagnostics.is_empty());
    let entry = h.cache.get(URI).unwrap_or_default();
    assert_eq!(entry.version, 1);
    assert!(entry.declares("x"));

    // Remove the semicolon: after the debounce, exactly one syntax error.
    h.change(URI, "int x\n", 2, Some((0, 0)));
    settle().await;

    let (version, diagnostics) = h.sink.last_for(URI).unwrap_or((None, vec![]));
    assert_eq!(version, Some(2));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].code,
        Some(NumberOrString::String("syntax-error".to_string()))
    );

    // Close: cache entry dropped, diagnostics cleared.
    h.close(URI);
    settle().await;
    assert!(h.cache.get(URI).is_none());
    let sentinel = vec![lsp_types::Diagnostic::default()];
    let (_, diagnostics) = h.sink.last_for(URI).unwrap_or((None, sentinel));
    assert!(diagnostics.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rapid_typing_validates_only_newest_version() {
    let h = harness();
    h.open(URI, "int a;\n", 1);
    settle().await;

    // Three changes inside one debounce window (delay is 200 ms).
    h.change(URI, "int ab;\n", 2, Some((0, 0)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.change(URI, "int abc;\n", 3, Some((0, 0)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.change(URI, "int abcd;\n", 4, Some((0, 0)));
    settle().await;

    // One validation for the open, one for the final version. No analyze
    // call was ever issued for versions 2 or 3.
    let versions: Vec<i32> = h.backend.calls().into_iter().map(|(_, v)| v).collect();
    assert_eq!(versions, vec![1, 4]);

    let (version, diagnostics) = h.sink.last_for(URI).unwrap_or((None, vec![]));
    assert_eq!(version, Some(4));
    assert!(diagnostics.is_empty());
    assert_eq!(h.cache.get(URI).unwrap_or_default().version, 4);
}

#[tokio::test(start_paused = true)]
async fn test_revalidation_at_same_version_hits_analyzer_cache() {
    let h = harness();
    h.open(URI, "int b;\n", 1);
    settle().await;

    // Save re-validates the same version; the analyzer cache answers.
    h.save(URI);
    settle().await;

    let calls = h.backend.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, 1);
    assert_eq!(calls[1].1, 1);
    // First call was a miss, second a hit in the simulated analyzer cache.
    assert_eq!(h.backend.seen_keys.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_whitespace_edit_skips_reanalysis_and_keeps_diagnostics() {
    let h = harness();
    h.open(URI, "int x\nint y;\n", 1);
    settle().await;
    assert_eq!(h.backend.calls().len(), 1);
    let before = h.sink.published().len();

    // Trailing whitespace on the broken line: semantically inert.
    if let Some(doc) = h.documents.lock().get_mut(URI) {
        doc.apply_change(None, "int x   \nint y;\n", 2);
    }
    h.orchestrator.validate_debounced(URI, 2, Some((0, 0)));
    settle().await;

    // No second analyzer call, no new publication; only version and
    // hashes moved forward.
    assert_eq!(h.backend.calls().len(), 1);
    assert_eq!(h.sink.published().len(), before);
    let entry = h.cache.get(URI).unwrap_or_default();
    assert_eq!(entry.version, 2);
    assert_eq!(entry.diagnostics.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_newline_insertion_forces_reanalysis() {
    let h = harness();
    h.open(URI, "int x; int y;\n", 1);
    settle().await;
    assert_eq!(h.backend.calls().len(), 1);

    if let Some(doc) = h.documents.lock().get_mut(URI) {
        doc.apply_change(None, "int x;\nint y;\n", 2);
    }
    h.orchestrator.validate_debounced(URI, 2, Some((0, 0)));
    settle().await;

    // Line indices shifted: the classifier must not skip.
    assert_eq!(h.backend.calls().len(), 2);
    assert_eq!(h.cache.get(URI).unwrap_or_default().version, 2);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_validation_leaves_no_side_effects() {
    let h = harness_with(FakeAnalyzer::with_latency(Duration::from_millis(500)));

    h.open(URI, "int a;\n", 1);
    // Let the first validation start its (slow) analyze call.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A newer version arrives while version 1 is still in flight.
    h.change(URI, "int ab;\n", 2, Some((0, 0)));
    settle().await;

    // The superseded validation wrote nothing; only version 2 landed.
    let entry = h.cache.get(URI).unwrap_or_default();
    assert_eq!(entry.version, 2);
    let publications = h.sink.published();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].1, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_clears_diagnostics() {
    #[derive(Clone)]
    struct FailingAnalyzer;
    impl AnalyzeBackend for FailingAnalyzer {
        fn analyze_document(
            &self,
            _code: String,
            _filename: String,
            _version: i32,
        ) -> impl Future<Output = Result<AnalyzeResponse, BridgeError>> + Send {
            async {
                Err(BridgeError::NotRunning { reason: "no analyzer in this test".to_string() })
            }
        }
    }

    let documents: Arc<Mutex<HashMap<String, DocumentState>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let cache = Arc::new(DocumentCache::new());
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = AnalyzeOrchestrator::new(
        FailingAnalyzer,
        RequestScheduler::new(),
        Arc::clone(&cache),
        Arc::new(WorkspaceScanner::new()),
        Arc::new(InheritanceTable::new()),
        Arc::clone(&sink) as Arc<dyn DiagnosticsSink>,
        Arc::new(Mutex::new(ServerConfig::default())),
        Arc::clone(&documents),
    );

    documents.lock().insert(URI.to_string(), DocumentState::new("int x;\n", 1, "pike"));
    orchestrator.validate_now(URI);
    settle().await;

    // The failed analysis published an empty set rather than stale
    // problems, and cached nothing.
    let (version, diagnostics) = sink.last_for(URI).unwrap_or((Some(99), vec![]));
    assert_eq!(version, None);
    assert!(diagnostics.is_empty());
    assert!(cache.get(URI).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_after_undo_does_not_overwrite() {
    let h = harness();
    h.open(URI, "int a;\n", 1);
    settle().await;

    // Schedule a validation for version 2, then let version 3 land before
    // the timer fires. The version gate must drop the stale validation.
    h.change(URI, "int ab;\n", 2, Some((0, 0)));
    h.change(URI, "int abc;\n", 3, Some((0, 0)));
    settle().await;

    let versions: Vec<i32> = h.backend.calls().into_iter().map(|(_, v)| v).collect();
    assert!(!versions.contains(&2), "stale version 2 must never be analyzed: {:?}", versions);
    assert_eq!(h.cache.get(URI).unwrap_or_default().version, 3);
}
