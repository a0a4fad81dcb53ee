//! Subprocess ownership, deduplication, and typed operations.

use crate::decode;
use crate::error::{BridgeError, TransportError};
use crate::protocol::{
    AnalyzeOp, AnalyzeResponse, AnalyzerCacheStats, CompletionContext, InheritedTypes,
    ParseResult, ResolveOutcome, WireDiagnostic, WireToken,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::transport::{AnalyzerTransport, TransportEvent};

/// How the bridge spawns and talks to the analyzer.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Interpreter executable (usually `pike`)
    pub executable: String,
    /// Arguments, typically the analyzer script path
    pub args: Vec<String>,
    /// Per-request wall-clock timeout
    pub request_timeout: Duration,
    /// Environment variables passed through to the subprocess; everything
    /// else is dropped
    pub env_whitelist: Vec<String>,
    /// How many stderr lines to retain for diagnostics
    pub stderr_tail_lines: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            executable: "pike".to_string(),
            args: Vec::new(),
            request_timeout: Duration::from_secs(15),
            env_whitelist: [
                "PATH",
                "HOME",
                "PIKE_MODULE_PATH",
                "PIKE_INCLUDE_PATH",
                "PIKE_MASTER",
                "TMPDIR",
                "LANG",
                "LC_ALL",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            stderr_tail_lines: 40,
        }
    }
}

/// Lifecycle of the analyzer subprocess.
///
/// A crash never requires operator action: the next call notices the
/// `Crashed` state and restarts lazily.
#[derive(Debug, Clone)]
enum Lifecycle {
    NotStarted,
    Starting,
    Running { since: Instant },
    Crashed { stderr_tail: String },
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::NotStarted => "not-started",
            Lifecycle::Starting => "starting",
            Lifecycle::Running { .. } => "running",
            Lifecycle::Crashed { .. } => "crashed",
        }
    }
}

/// Lightweight health snapshot for diagnostics surfaces.
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    /// Lifecycle state name
    pub state: &'static str,
    /// How long the current subprocess has been up
    pub uptime: Option<Duration>,
    /// Analyzer version, once the background fetch lands
    pub version: Option<String>,
    /// Recent stderr lines, oldest first
    pub stderr_tail: Vec<String>,
    /// Successful restart count since construction
    pub restarts: u64,
}

type RequestResult = Result<Arc<Value>, BridgeError>;

struct LifecycleState {
    lifecycle: Lifecycle,
    transport: Option<Arc<AnalyzerTransport>>,
}

struct BridgeInner {
    config: Mutex<BridgeConfig>,
    state: Mutex<LifecycleState>,
    child: tokio::sync::Mutex<Option<tokio::process::Child>>,
    /// Inflight fingerprint → attached callers. Independent of the
    /// scheduler's key-based supersession: the scheduler decides whether a
    /// task runs at all, the bridge deduplicates requests that do run.
    inflight: Mutex<HashMap<String, Vec<oneshot::Sender<RequestResult>>>>,
    stderr_tail: Mutex<VecDeque<String>>,
    version: Mutex<Option<String>>,
    restarts: AtomicU64,
}

/// The mediator's handle on the analyzer subprocess.
///
/// Cheap to clone; all clones share one subprocess. No other component
/// spawns processes.
#[derive(Clone)]
pub struct PikeBridge {
    inner: Arc<BridgeInner>,
}

impl PikeBridge {
    /// Create a bridge. The subprocess starts on [`PikeBridge::start`] or
    /// lazily on the first operation.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                config: Mutex::new(config),
                state: Mutex::new(LifecycleState {
                    lifecycle: Lifecycle::NotStarted,
                    transport: None,
                }),
                child: tokio::sync::Mutex::new(None),
                inflight: Mutex::new(HashMap::new()),
                stderr_tail: Mutex::new(VecDeque::new()),
                version: Mutex::new(None),
                restarts: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn the subprocess. Version information is fetched in the
    /// background and does not delay the first `analyze`.
    ///
    /// Returns a boxed future (rather than `async fn`) to break the
    /// `start` -> `fetch_version` -> `request` -> `ensure_running` ->
    /// `start` type-level cycle that otherwise defeats the compiler's
    /// auto-trait (`Send`) inference.
    pub fn start(&self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>> {
        Box::pin(async move {
        let was_crashed = {
            let mut st = self.inner.state.lock();
            if let (Lifecycle::Running { .. }, Some(transport)) = (&st.lifecycle, &st.transport) {
                if transport.is_alive() {
                    return Ok(());
                }
            }
            let was_crashed = matches!(st.lifecycle, Lifecycle::Crashed { .. });
            st.lifecycle = Lifecycle::Starting;
            was_crashed
        };
        let config = self.inner.config.lock().clone();

        let mut command = Command::new(&config.executable);
        command.args(&config.args);
        command.env_clear();
        for key in &config.env_whitelist {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("failed to spawn {}: {}", config.executable, e);
                tracing::warn!(%reason, "analyzer spawn failed");
                self.inner.state.lock().lifecycle = Lifecycle::Crashed { stderr_tail: String::new() };
                return Err(BridgeError::NotRunning { reason });
            }
        };

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(BridgeError::NotRunning { reason: "subprocess pipes unavailable".into() });
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(AnalyzerTransport::new(stdin, stdout, event_tx.clone()));
        if let Some(stderr) = child.stderr.take() {
            AnalyzerTransport::attach_stderr(stderr, event_tx);
        }

        *self.inner.child.lock().await = Some(child);
        {
            let mut st = self.inner.state.lock();
            st.lifecycle = Lifecycle::Running { since: Instant::now() };
            st.transport = Some(Arc::clone(&transport));
        }
        // Restart resets inflight state; dropped senders surface as
        // SubprocessExited to any caller still attached.
        self.inner.inflight.lock().clear();
        if was_crashed {
            self.inner.restarts.fetch_add(1, Ordering::Relaxed);
        }

        tokio::spawn(event_pump(Arc::clone(&self.inner), event_rx));
        tokio::spawn(fetch_version(self.clone()));

        tracing::info!(executable = %config.executable, "analyzer started");
        Ok(())
        })
    }

    /// Replace the subprocess configuration.
    ///
    /// Takes effect on the next (re)start; callers that change the
    /// executable or script typically follow with [`PikeBridge::stop`] so
    /// the next operation restarts lazily under the new settings.
    pub fn reconfigure(&self, config: BridgeConfig) {
        *self.inner.config.lock() = config;
    }

    /// Kill and reap the subprocess.
    pub async fn stop(&self) {
        {
            let mut st = self.inner.state.lock();
            st.lifecycle = Lifecycle::NotStarted;
            st.transport = None;
        }
        if let Some(mut child) = self.inner.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "analyzer kill failed (already gone?)");
            }
            let _ = child.wait().await;
        }
    }

    /// Health snapshot.
    pub fn status(&self) -> BridgeStatus {
        let st = self.inner.state.lock();
        BridgeStatus {
            state: st.lifecycle.name(),
            uptime: match &st.lifecycle {
                Lifecycle::Running { since } => Some(since.elapsed()),
                _ => None,
            },
            version: self.inner.version.lock().clone(),
            stderr_tail: self.inner.stderr_tail.lock().iter().cloned().collect(),
            restarts: self.inner.restarts.load(Ordering::Relaxed),
        }
    }

    /// One raw JSON-RPC round-trip with deduplication and timeout.
    ///
    /// Identical concurrent requests (same method, same canonicalized
    /// params - `serde_json` keeps object keys sorted) produce exactly one
    /// wire request; every caller receives the same resolved value.
    pub async fn request(&self, method: &str, params: Value) -> RequestResult {
        let transport = self.ensure_running().await?;

        let fingerprint = format!("{}:{}", method, params);
        let (tx, rx) = oneshot::channel();
        let drives = {
            let mut inflight = self.inner.inflight.lock();
            match inflight.get_mut(&fingerprint) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    inflight.insert(fingerprint.clone(), vec![tx]);
                    true
                }
            }
        };

        if drives {
            // Driven from its own task so attached callers resolve even if
            // the first caller drops its future mid-flight.
            let inner = Arc::clone(&self.inner);
            let method = method.to_string();
            tokio::spawn(async move {
                let outcome = drive_request(&inner, &transport, &method, params).await;
                let waiters = inner.inflight.lock().remove(&fingerprint).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::SubprocessExited { stderr_tail: self.stderr_tail_joined() }),
        }
    }

    async fn ensure_running(&self) -> Result<Arc<AnalyzerTransport>, BridgeError> {
        {
            let st = self.inner.state.lock();
            if let (Lifecycle::Running { .. }, Some(transport)) = (&st.lifecycle, &st.transport) {
                if transport.is_alive() {
                    return Ok(Arc::clone(transport));
                }
            }
        }
        // Lazy restart: at most one attempt per incoming request.
        self.start().await?;
        let st = self.inner.state.lock();
        st.transport
            .clone()
            .ok_or_else(|| BridgeError::NotRunning { reason: "no transport after start".into() })
    }

    fn stderr_tail_joined(&self) -> String {
        self.inner.stderr_tail.lock().iter().cloned().collect::<Vec<_>>().join("\n")
    }

    // === Typed operations ===

    /// The unified workhorse: bundle `include` operations into one
    /// round-trip so the analyzer can reuse one compilation for all of
    /// them and its cache can answer by `(filename, documentVersion)`.
    pub async fn analyze(
        &self,
        code: &str,
        include: &[AnalyzeOp],
        filename: &str,
        document_version: i32,
    ) -> Result<AnalyzeResponse, BridgeError> {
        let include: Vec<&str> = include.iter().map(|op| op.as_str()).collect();
        let result = self
            .request(
                "analyze",
                json!({
                    "code": code,
                    "include": include,
                    "filename": filename,
                    "documentVersion": document_version,
                }),
            )
            .await?;
        Ok(decode::analyze_response(&result))
    }

    /// Source-level parse without compilation.
    pub async fn parse(&self, code: &str, filename: &str) -> Result<ParseResult, BridgeError> {
        let result = self.request("parse", json!({"code": code, "filename": filename})).await?;
        Ok(decode::parse_result(&result))
    }

    /// Parse a batch of files in one round-trip (workspace indexing).
    pub async fn batch_parse(
        &self,
        files: &[(String, String)],
    ) -> Result<Vec<ParseResult>, BridgeError> {
        let files: Vec<Value> = files
            .iter()
            .map(|(code, filename)| json!({"code": code, "filename": filename}))
            .collect();
        let result = self.request("batch_parse", json!({"files": files})).await?;
        Ok(decode::batch_parse_results(&result))
    }

    /// Full compile for diagnostics only.
    pub async fn compile(
        &self,
        code: &str,
        filename: &str,
    ) -> Result<Vec<WireDiagnostic>, BridgeError> {
        let result = self.request("compile", json!({"code": code, "filename": filename})).await?;
        Ok(decode::diagnostics(decode::array(&result, "diagnostics")))
    }

    /// Lex the source into tokens.
    pub async fn tokenize(&self, code: &str) -> Result<Vec<WireToken>, BridgeError> {
        let result = self.request("tokenize", json!({"code": code})).await?;
        Ok(decode::tokens(decode::array(&result, "tokens")))
    }

    /// Supertypes and subtypes of a class, from the compiled program.
    pub async fn get_inherited(
        &self,
        code: &str,
        class_name: &str,
        filename: &str,
    ) -> Result<InheritedTypes, BridgeError> {
        let result = self
            .request(
                "get_inherited",
                json!({"code": code, "className": class_name, "filename": filename}),
            )
            .await?;
        Ok(decode::inherited_types(&result))
    }

    /// All identifier occurrences in `code`.
    pub async fn find_occurrences(&self, code: &str) -> Result<Vec<WireToken>, BridgeError> {
        let result = self.request("find_occurrences", json!({"code": code})).await?;
        Ok(decode::tokens(decode::array(&result, "occurrences")))
    }

    /// Positions a rename of `symbol` would touch.
    pub async fn find_rename_positions(
        &self,
        code: &str,
        symbol: &str,
    ) -> Result<Vec<WireToken>, BridgeError> {
        let result =
            self.request("find_rename_positions", json!({"code": code, "symbol": symbol})).await?;
        Ok(decode::tokens(decode::array(&result, "positions")))
    }

    /// Rename validity probe; raw payload passed through to the handler.
    pub async fn prepare_rename(
        &self,
        code: &str,
        line: u32,
        character: u32,
    ) -> Result<Arc<Value>, BridgeError> {
        self.request(
            "prepare_rename",
            json!({"code": code, "line": line, "character": character}),
        )
        .await
    }

    /// Completion site classification.
    pub async fn get_completion_context(
        &self,
        code: &str,
        line: u32,
        character: u32,
        uri: Option<&str>,
        version: Option<i32>,
    ) -> Result<CompletionContext, BridgeError> {
        let mut params = json!({"code": code, "line": line, "character": character});
        if let (Some(map), Some(uri)) = (params.as_object_mut(), uri) {
            map.insert("uri".into(), json!(uri));
            if let Some(version) = version {
                map.insert("version".into(), json!(version));
            }
        }
        let result = self.request("get_completion_context", params).await?;
        Ok(decode::completion_context(&result))
    }

    /// Resolve a module reference to a filesystem path.
    pub async fn resolve_module(
        &self,
        module: &str,
        current_file: Option<&str>,
    ) -> Result<ResolveOutcome, BridgeError> {
        let mut params = json!({"module": module});
        if let (Some(map), Some(current)) = (params.as_object_mut(), current_file) {
            map.insert("currentFile".into(), json!(current));
        }
        let result = self.request("resolve", params).await?;
        Ok(decode::resolve_outcome(&result))
    }

    /// Dataflow pass for use-before-assignment diagnostics.
    pub async fn analyze_uninitialized(
        &self,
        code: &str,
        filename: &str,
    ) -> Result<Vec<WireDiagnostic>, BridgeError> {
        let result = self
            .request("analyze_uninitialized", json!({"code": code, "filename": filename}))
            .await?;
        Ok(decode::diagnostics(decode::array(&result, "diagnostics")))
    }

    /// Constant-fold an expression; raw value passed through.
    pub async fn evaluate_constant(&self, code: &str) -> Result<Arc<Value>, BridgeError> {
        self.request("evaluate_constant", json!({"code": code})).await
    }

    /// Analyzer-side compilation cache statistics.
    pub async fn get_cache_stats(&self) -> Result<AnalyzerCacheStats, BridgeError> {
        let result = self.request("get_cache_stats", json!({})).await?;
        Ok(decode::cache_stats(&result))
    }

    #[cfg(test)]
    fn with_transport(config: BridgeConfig, transport: Arc<AnalyzerTransport>) -> Self {
        let bridge = Self::new(config);
        {
            let mut st = bridge.inner.state.lock();
            st.lifecycle = Lifecycle::Running { since: Instant::now() };
            st.transport = Some(transport);
        }
        bridge
    }

    #[cfg(test)]
    fn push_stderr_line(&self, line: &str) {
        self.inner.stderr_tail.lock().push_back(line.to_string());
    }
}

async fn drive_request(
    inner: &Arc<BridgeInner>,
    transport: &Arc<AnalyzerTransport>,
    method: &str,
    params: Value,
) -> RequestResult {
    let timeout = inner.config.lock().request_timeout;
    match tokio::time::timeout(timeout, transport.send(method, params)).await {
        Err(_) => {
            // Do not kill the subprocess; it may recover on the next call.
            tracing::warn!(method, seconds = timeout.as_secs(), "analyzer request timed out");
            Err(BridgeError::Timeout { seconds: timeout.as_secs() })
        }
        Ok(Err(TransportError::SubprocessExited)) => {
            let stderr_tail = join_tail(inner);
            mark_crashed(inner, &stderr_tail);
            Err(BridgeError::SubprocessExited { stderr_tail })
        }
        Ok(Err(TransportError::Io(reason))) => {
            let stderr_tail = join_tail(inner);
            mark_crashed(inner, &stderr_tail);
            Err(BridgeError::NotRunning { reason })
        }
        Ok(Ok(response)) => split_response(&response),
    }
}

fn split_response(response: &Value) -> RequestResult {
    if let Some(error) = response.get("error") {
        let code = decode::i64_or(error, "code", -32603) as i32;
        let message = decode::string_or(error, "message", "unknown analyzer error").to_string();
        return Err(BridgeError::Analyzer { code, message });
    }
    Ok(Arc::new(response.get("result").cloned().unwrap_or(Value::Null)))
}

fn mark_crashed(inner: &Arc<BridgeInner>, stderr_tail: &str) {
    let mut st = inner.state.lock();
    if !matches!(st.lifecycle, Lifecycle::NotStarted) {
        st.lifecycle = Lifecycle::Crashed { stderr_tail: stderr_tail.to_string() };
        st.transport = None;
    }
}

fn join_tail(inner: &Arc<BridgeInner>) -> String {
    inner.stderr_tail.lock().iter().cloned().collect::<Vec<_>>().join("\n")
}

async fn event_pump(
    inner: Arc<BridgeInner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Stderr(line) => {
                tracing::debug!(target: "pike_analyzer", "{}", line);
                let keep = inner.config.lock().stderr_tail_lines;
                let mut tail = inner.stderr_tail.lock();
                tail.push_back(line);
                while tail.len() > keep {
                    tail.pop_front();
                }
            }
            TransportEvent::Exit(code) => {
                let stderr_tail = join_tail(&inner);
                let deliberate = {
                    let mut st = inner.state.lock();
                    if matches!(st.lifecycle, Lifecycle::NotStarted) {
                        true
                    } else {
                        st.lifecycle =
                            Lifecycle::Crashed { stderr_tail: stderr_tail.clone() };
                        st.transport = None;
                        false
                    }
                };
                if !deliberate {
                    tracing::warn!(?code, "analyzer exited; will restart lazily on next call");
                }
            }
        }
    }
}

async fn fetch_version(bridge: PikeBridge) {
    match bridge.request("version", json!({})).await {
        Ok(result) => {
            let version = result
                .as_str()
                .map(str::to_string)
                .or_else(|| decode::string_opt(&result, "version"));
            if let Some(version) = version {
                tracing::info!(%version, "analyzer version detected");
                *bridge.inner.version.lock() = Some(version);
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "analyzer version fetch failed");
        }
    }
}
