//! JSON-RPC error codes used by the server and the analyzer dialect.
//!
//! Standard codes follow JSON-RPC 2.0 / LSP conventions; analyzer-side
//! application errors use the `-32000` range.

use crate::JsonRpcError;

/// Invalid JSON was received by the server
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist or is not available
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Internal JSON-RPC error
pub const INTERNAL_ERROR: i32 = -32603;

/// The request was cancelled by the client ($/cancelRequest)
pub const REQUEST_CANCELLED: i32 = -32800;
/// The document was modified while the request was in flight
pub const CONTENT_MODIFIED: i32 = -32801;
/// Server not yet initialized
pub const SERVER_NOT_INITIALIZED: i32 = -32002;

/// Start of the analyzer application error range
pub const ANALYZER_ERROR_BASE: i32 = -32000;
/// Analyzer failed to compile the given source
pub const ANALYZER_COMPILE_FAILED: i32 = -32001;
/// Analyzer could not resolve a module path
pub const ANALYZER_RESOLVE_FAILED: i32 = -32003;
/// The file backing a cached entry no longer exists
pub const ANALYZER_FILE_REMOVED: i32 = -32004;

/// Build an "invalid params" error with a descriptive message
pub fn invalid_params(message: impl Into<String>) -> JsonRpcError {
    JsonRpcError::new(INVALID_PARAMS, message)
}

/// Build a "method not found" error naming the offending method
pub fn method_not_found(method: &str) -> JsonRpcError {
    JsonRpcError::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
}

/// Build a "server not initialized" error
pub fn not_initialized() -> JsonRpcError {
    JsonRpcError::new(SERVER_NOT_INITIALIZED, "Server not initialized")
}

/// True if the code falls in the analyzer application error range
pub fn is_analyzer_error(code: i32) -> bool {
    (-32099..=-32000).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyzer_error_range() {
        assert!(is_analyzer_error(ANALYZER_COMPILE_FAILED));
        assert!(is_analyzer_error(ANALYZER_ERROR_BASE));
        assert!(!is_analyzer_error(METHOD_NOT_FOUND));
        assert!(!is_analyzer_error(REQUEST_CANCELLED));
    }

    #[test]
    fn test_method_not_found_message() {
        let err = method_not_found("textDocument/selectionRange");
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert!(err.message.contains("textDocument/selectionRange"));
    }
}
