//! Pike LSP Runtime Crate
//!
//! The incremental analysis core of a Pike language server: a mediator
//! process between an LSP client and a Pike interpreter subprocess that
//! performs the actual parsing, compilation, and symbol introspection.
//!
//! # Architecture
//!
//! - [`transport`] - Content-Length message framing toward the editor
//! - [`state`] - Document and server configuration state
//! - [`runtime`] - Server loop, dispatch, and lifecycle handlers
//! - [`orchestrator`] - Debounced validation pipeline: classify, call the
//!   analyzer through the bridge, update caches, emit diagnostics
//! - [`sink`] - Diagnostics publication seam
//!
//! The analyzer-facing half lives in sibling crates: `pike-bridge`
//! (subprocess transport and typed operations), `pike-scheduler`
//! (priority queues and supersession), `pike-document-cache` (snapshots
//! and the change classifier), `pike-compile-cache` (the analyzer-side
//! compilation cache), and `pike-workspace-index` (file enumeration).
//!
//! # Usage
//!
//! The primary entry point is [`run_stdio()`], which serves LSP over
//! stdio until the client sends `exit`:
//!
//! ```no_run
//! # async fn main_loop() -> anyhow::Result<()> {
//! pike_lsp::run_stdio().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod orchestrator;
pub mod runtime;
pub mod sink;
pub mod state;
pub mod transport;

// Re-exports for key types
pub use pike_lsp_protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use runtime::LspServer;

/// Run the LSP server in stdio mode with default configuration.
///
/// Reads JSON-RPC messages from stdin and writes responses to stdout,
/// following the Language Server Protocol base framing.
pub async fn run_stdio() -> anyhow::Result<()> {
    let mut server = LspServer::stdio(state::ServerConfig::default());
    server.run().await
}
