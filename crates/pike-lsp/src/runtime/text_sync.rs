//! Text document synchronization
//!
//! Handles didOpen, didChange, didSave, didClose notifications.

use super::LspServer;
use crate::state::DocumentState;
use pike_lsp_protocol::{JsonRpcError, invalid_params};
use serde_json::Value;

impl LspServer {
    /// Handle textDocument/didOpen notification
    pub(crate) fn handle_did_open(&self, params: Option<Value>) -> Result<(), JsonRpcError> {
        let Some(params) = params else { return Ok(()) };
        let uri = params
            .pointer("/textDocument/uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid_params("Missing required parameter: textDocument.uri"))?;
        let text = params
            .pointer("/textDocument/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid_params("Missing required parameter: textDocument.text"))?;
        let version_i64 =
            params.pointer("/textDocument/version").and_then(|v| v.as_i64()).unwrap_or(0);
        let version = i32::try_from(version_i64).unwrap_or(0);
        let language_id = params
            .pointer("/textDocument/languageId")
            .and_then(|v| v.as_str())
            .unwrap_or("pike");

        tracing::debug!(uri, version, "document opened");
        self.documents
            .lock()
            .insert(uri.to_string(), DocumentState::new(text, version, language_id));

        // Open validates immediately; no debounce.
        self.orchestrator.validate_now(uri);
        Ok(())
    }

    /// Handle textDocument/didChange notification
    pub(crate) fn handle_did_change(&self, params: Option<Value>) -> Result<(), JsonRpcError> {
        let Some(params) = params else { return Ok(()) };
        let uri = params
            .pointer("/textDocument/uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid_params("Missing required parameter: textDocument.uri"))?;
        let version_i64 = params
            .pointer("/textDocument/version")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| invalid_params("Missing required parameter: textDocument.version"))?;
        let version = i32::try_from(version_i64).unwrap_or(i32::MAX);
        let changes = params
            .get("contentChanges")
            .and_then(|v| v.as_array())
            .ok_or_else(|| invalid_params("Missing required parameter: contentChanges"))?;

        // Apply the change set and accumulate the touched line window. A
        // change without a range is a full replacement; the window becomes
        // meaningless and the classifier falls back to whole-text hashing.
        let mut touched: Option<(u32, u32)> = None;
        let mut saw_full_replacement = false;
        {
            let mut documents = self.documents.lock();
            let Some(document) = documents.get_mut(uri) else {
                return Err(invalid_params(format!("didChange for unopened document: {}", uri)));
            };
            for change in changes {
                let new_text = change.get("text").and_then(|v| v.as_str()).unwrap_or("");
                match decode_range(change) {
                    Some((start, end)) => {
                        document.apply_change(Some((start, end)), new_text, version);
                        touched = Some(match touched {
                            None => (start.0, end.0),
                            Some((lo, hi)) => (lo.min(start.0), hi.max(end.0)),
                        });
                    }
                    None => {
                        document.apply_change(None, new_text, version);
                        saw_full_replacement = true;
                    }
                }
            }
        }

        let change_lines = if saw_full_replacement { None } else { touched };
        self.orchestrator.validate_debounced(uri, version, change_lines);
        Ok(())
    }

    /// Handle textDocument/didSave notification
    pub(crate) fn handle_did_save(&self, params: Option<Value>) -> Result<(), JsonRpcError> {
        let Some(params) = params else { return Ok(()) };
        let uri = params
            .pointer("/textDocument/uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid_params("Missing required parameter: textDocument.uri"))?;

        if self.documents.lock().contains_key(uri) {
            tracing::debug!(uri, "document saved");
            self.orchestrator.validate_now(uri);
        }
        Ok(())
    }

    /// Handle textDocument/didClose notification
    pub(crate) fn handle_did_close(&self, params: Option<Value>) -> Result<(), JsonRpcError> {
        let Some(params) = params else { return Ok(()) };
        let uri = params
            .pointer("/textDocument/uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid_params("Missing required parameter: textDocument.uri"))?;

        tracing::debug!(uri, "document closed");
        self.documents.lock().remove(uri);
        self.orchestrator.document_closed(uri);
        Ok(())
    }
}

/// `((start_line, start_char), (end_line, end_char))` from a content
/// change, when it carries a range.
fn decode_range(change: &Value) -> Option<((u32, u32), (u32, u32))> {
    let range = change.get("range")?;
    let read = |pointer: &str| -> Option<u32> {
        range.pointer(pointer).and_then(|v| v.as_u64()).map(|n| n.min(u32::MAX as u64) as u32)
    };
    Some((
        (read("/start/line")?, read("/start/character")?),
        (read("/end/line")?, read("/end/character")?),
    ))
}
