//! Server capability advertisement.
//!
//! Builds the `initialize` response payload. The core advertises incremental
//! text synchronization and workspace-folder support; feature capabilities
//! are contributed by the handlers that implement them.

use serde_json::{Value, json};

/// Text document sync kind: full document replacement on every change
pub const SYNC_FULL: u8 = 1;
/// Text document sync kind: incremental ranged changes
pub const SYNC_INCREMENTAL: u8 = 2;

/// Build the server capabilities object returned from `initialize`.
pub fn server_capabilities() -> Value {
    json!({
        "textDocumentSync": {
            "openClose": true,
            "change": SYNC_INCREMENTAL,
            "save": { "includeText": false },
        },
        "workspace": {
            "workspaceFolders": {
                "supported": true,
                "changeNotifications": true,
            },
        },
    })
}

/// Build the full `initialize` result, including server info.
pub fn initialize_result(name: &str, version: &str) -> Value {
    json!({
        "capabilities": server_capabilities(),
        "serverInfo": { "name": name, "version": version },
    })
}
