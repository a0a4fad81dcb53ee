//! Bridge and transport error taxonomy.
//!
//! Both error types are `Clone`: a deduplicated request fans one outcome
//! out to every attached caller, and a subprocess exit rejects every
//! pending future with the same error.

use thiserror::Error;

/// Errors at the framing/correlation layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The subprocess closed its stdout (or never had one). Further sends
    /// fail until the bridge restarts it.
    #[error("analyzer subprocess exited")]
    SubprocessExited,
    /// Writing to the subprocess stdin failed.
    #[error("analyzer transport I/O error: {0}")]
    Io(String),
}

/// Errors surfaced by [`PikeBridge`](crate::PikeBridge) operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The subprocess exited while the request was pending. Carries the
    /// last stderr lines for diagnosis. The bridge lazily restarts on the
    /// next call.
    #[error("analyzer subprocess exited: {stderr_tail}")]
    SubprocessExited {
        /// Joined tail of the subprocess's recent stderr output
        stderr_tail: String,
    },
    /// The request exceeded the per-request wall-clock timeout. The
    /// subprocess is left alive; it may recover on the next request.
    #[error("analyzer request timed out after {seconds}s")]
    Timeout {
        /// Configured timeout in whole seconds
        seconds: u64,
    },
    /// The subprocess is not running and the restart attempt failed.
    #[error("analyzer not running: {reason}")]
    NotRunning {
        /// Why the restart failed
        reason: String,
    },
    /// The analyzer answered with a JSON-RPC error object.
    #[error("analyzer error {code}: {message}")]
    Analyzer {
        /// JSON-RPC error code (application errors use the -32000 range)
        code: i32,
        /// Error message from the analyzer
        message: String,
    },
}
