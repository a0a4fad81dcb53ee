//! The LSP server runtime: stdio loop and request dispatch.

mod lifecycle;
mod text_sync;
mod workspace;

use crate::orchestrator::AnalyzeOrchestrator;
use crate::sink::{DiagnosticsSink, WriterSink};
use crate::state::{DocumentState, ServerConfig};
use crate::transport;
use parking_lot::Mutex;
use pike_bridge::PikeBridge;
use pike_document_cache::{DocumentCache, InheritanceTable};
use pike_lsp_protocol::{JsonRpcRequest, JsonRpcResponse, method_not_found, methods, not_initialized};
use pike_scheduler::RequestScheduler;
use pike_workspace_index::WorkspaceScanner;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// LSP server that handles JSON-RPC communication over stdio.
///
/// Owns every core subsystem: the analyzer bridge, the request scheduler,
/// the document cache, the workspace scanner, and the orchestrator that
/// ties them together. Feature handlers read the document cache and call
/// bridge operations; only the orchestrator mutates the cache.
pub struct LspServer {
    /// Open document contents indexed by URI
    pub(crate) documents: Arc<Mutex<HashMap<String, DocumentState>>>,
    /// Server configuration, updated via didChangeConfiguration
    pub(crate) config: Arc<Mutex<ServerConfig>>,
    /// The analyzer subprocess handle
    pub(crate) bridge: PikeBridge,
    /// Request scheduler shared with feature handlers
    pub(crate) scheduler: RequestScheduler,
    /// Analyzed-document snapshot store
    pub(crate) document_cache: Arc<DocumentCache>,
    /// Inheritance edges mirrored from introspection
    pub(crate) inheritance: Arc<InheritanceTable>,
    /// Workspace file index
    pub(crate) scanner: Arc<WorkspaceScanner>,
    /// Validation pipeline
    pub(crate) orchestrator: Arc<AnalyzeOrchestrator<PikeBridge>>,
    /// Synchronized output writer for responses and notifications
    pub(crate) output: Arc<Mutex<Box<dyn Write + Send>>>,
    /// Workspace roots from initialize
    pub(crate) workspace_folders: Vec<PathBuf>,
    /// Whether the client completed initialization
    pub(crate) initialized: bool,
    /// Whether shutdown was received (for LSP-compliant exit handling)
    pub(crate) shutdown_received: bool,
}

impl LspServer {
    /// Build a server over the given output writer.
    ///
    /// Must be called within a tokio runtime (the scheduler spawns its
    /// worker immediately).
    pub fn new(config: ServerConfig, output: Box<dyn Write + Send>) -> Self {
        let config = Arc::new(Mutex::new(config));
        let documents: Arc<Mutex<HashMap<String, DocumentState>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let bridge = PikeBridge::new(config.lock().bridge_config());
        let scheduler = RequestScheduler::new();
        let document_cache = Arc::new(DocumentCache::new());
        let inheritance = Arc::new(InheritanceTable::new());
        let scanner = Arc::new(WorkspaceScanner::new());
        let output: Arc<Mutex<Box<dyn Write + Send>>> = Arc::new(Mutex::new(output));
        let sink: Arc<dyn DiagnosticsSink> = Arc::new(WriterSink::new(Arc::clone(&output)));

        let orchestrator = AnalyzeOrchestrator::new(
            bridge.clone(),
            scheduler.clone(),
            Arc::clone(&document_cache),
            Arc::clone(&scanner),
            Arc::clone(&inheritance),
            sink,
            Arc::clone(&config),
            Arc::clone(&documents),
        );

        Self {
            documents,
            config,
            bridge,
            scheduler,
            document_cache,
            inheritance,
            scanner,
            orchestrator,
            output,
            workspace_folders: Vec::new(),
            initialized: false,
            shutdown_received: false,
        }
    }

    /// Server wired to the process's stdout.
    pub fn stdio(config: ServerConfig) -> Self {
        Self::new(config, Box::new(std::io::stdout()))
    }

    /// Main loop: read framed messages from stdin, dispatch until `exit`.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut requests = spawn_stdin_reader();
        while let Some(request) = requests.recv().await {
            if self.dispatch(request).await {
                break;
            }
        }
        if !self.shutdown_received {
            tracing::warn!("exit received without a preceding shutdown request");
        }
        self.scheduler.shutdown();
        self.bridge.stop().await;
        Ok(())
    }

    /// Snapshot store read by feature handlers. Handlers never mutate it;
    /// a missing entry means "not yet analyzed - degrade gracefully".
    pub fn document_cache(&self) -> &Arc<DocumentCache> {
        &self.document_cache
    }

    /// The analyzer bridge, for feature handlers that need synchronous
    /// analyzer operations (completion context, rename positions).
    pub fn bridge(&self) -> &PikeBridge {
        &self.bridge
    }

    /// The request scheduler shared by all feature handlers.
    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// The workspace file index.
    pub fn scanner(&self) -> &Arc<WorkspaceScanner> {
        &self.scanner
    }

    /// Inheritance edges for type-hierarchy handlers.
    pub fn inheritance(&self) -> &Arc<InheritanceTable> {
        &self.inheritance
    }

    /// Test-only entry point: feed one message through dispatch.
    #[doc(hidden)]
    pub async fn dispatch_for_tests(&mut self, request: JsonRpcRequest) -> bool {
        self.dispatch(request).await
    }

    /// Handle one message. Returns true when the server should exit.
    pub(crate) async fn dispatch(&mut self, request: JsonRpcRequest) -> bool {
        let id = request.id.clone();
        let method = request.method.as_str();

        // Requests before initialize are refused; notifications other than
        // exit are silently dropped, per the protocol.
        if !self.initialized
            && !matches!(method, methods::INITIALIZE | methods::INITIALIZED | methods::EXIT)
        {
            if id.is_some() {
                self.respond(JsonRpcResponse::error(id, not_initialized()));
            }
            return false;
        }

        match method {
            methods::INITIALIZE => {
                let result = self.handle_initialize(request.params);
                self.respond(JsonRpcResponse::success(id, result));
            }
            methods::INITIALIZED => {
                tracing::debug!("client initialized");
            }
            methods::SHUTDOWN => {
                self.shutdown_received = true;
                self.respond(JsonRpcResponse::null(id));
            }
            methods::EXIT => return true,
            methods::TEXT_DOCUMENT_DID_OPEN => self.log_notification(self.handle_did_open(request.params)),
            methods::TEXT_DOCUMENT_DID_CHANGE => {
                self.log_notification(self.handle_did_change(request.params))
            }
            methods::TEXT_DOCUMENT_DID_SAVE => self.log_notification(self.handle_did_save(request.params)),
            methods::TEXT_DOCUMENT_DID_CLOSE => {
                self.log_notification(self.handle_did_close(request.params))
            }
            methods::WORKSPACE_DID_CHANGE_CONFIGURATION => {
                self.handle_did_change_configuration(request.params).await;
            }
            methods::WORKSPACE_DID_CHANGE_WORKSPACE_FOLDERS => {
                self.handle_did_change_workspace_folders(request.params);
            }
            methods::CANCEL_REQUEST => self.handle_cancel(request.params),
            other => {
                if id.is_some() {
                    self.respond(JsonRpcResponse::error(id, method_not_found(other)));
                } else {
                    tracing::trace!(method = other, "ignoring unknown notification");
                }
            }
        }
        false
    }

    pub(crate) fn respond(&self, response: JsonRpcResponse) {
        let mut output = self.output.lock();
        if let Err(e) = transport::write_message(&mut *output, &response) {
            tracing::error!(error = %e, "failed to write response");
        }
    }

    fn log_notification(&self, result: Result<(), pike_lsp_protocol::JsonRpcError>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "notification handling failed");
        }
    }

    fn handle_cancel(&self, params: Option<serde_json::Value>) {
        let Some(id) = params.as_ref().and_then(|p| p.get("id")) else { return };
        // Keyed feature requests register under "request:<id>"; pending
        // ones are canceled, started ones run to discarded completion.
        let key = format!("request:{}", id);
        if self.scheduler.cancel_pending_by_key(&key) {
            tracing::debug!(%key, "canceled pending request");
        }
    }
}

/// Read framed messages from stdin on a dedicated thread.
fn spawn_stdin_reader() -> tokio::sync::mpsc::UnboundedReceiver<JsonRpcRequest> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut reader = stdin.lock();
        loop {
            match transport::read_message(&mut reader) {
                Ok(Some(request)) => {
                    if tx.send(request).is_err() {
                        break; // server loop gone
                    }
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}
