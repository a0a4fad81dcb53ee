//! LSP method name constants for request/notification routing.
//!
//! Centralizes the method identifiers the mediator consumes so dispatch,
//! capability registration, and error reporting agree on spelling. Only the
//! lifecycle and synchronization subset the core reacts to is listed here;
//! feature methods live with their handlers.

// === Lifecycle ===

/// Initialize request - client announces capabilities and workspace roots
pub const INITIALIZE: &str = "initialize";
/// Initialized notification - client is ready for requests
pub const INITIALIZED: &str = "initialized";
/// Shutdown request - prepare for exit
pub const SHUTDOWN: &str = "shutdown";
/// Exit notification - terminate the server process
pub const EXIT: &str = "exit";

// === Text document synchronization ===

/// Document opened in the editor
pub const TEXT_DOCUMENT_DID_OPEN: &str = "textDocument/didOpen";
/// Document content changed
pub const TEXT_DOCUMENT_DID_CHANGE: &str = "textDocument/didChange";
/// Document saved to disk
pub const TEXT_DOCUMENT_DID_SAVE: &str = "textDocument/didSave";
/// Document closed in the editor
pub const TEXT_DOCUMENT_DID_CLOSE: &str = "textDocument/didClose";

// === Server-to-client notifications ===

/// Publish diagnostics for a document
pub const TEXT_DOCUMENT_PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";

// === Workspace ===

/// Configuration changed
pub const WORKSPACE_DID_CHANGE_CONFIGURATION: &str = "workspace/didChangeConfiguration";
/// Workspace folder set changed
pub const WORKSPACE_DID_CHANGE_WORKSPACE_FOLDERS: &str = "workspace/didChangeWorkspaceFolders";

// === Special ===

/// Client-initiated request cancellation
pub const CANCEL_REQUEST: &str = "$/cancelRequest";
