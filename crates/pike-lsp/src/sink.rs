//! Diagnostics publication seam.
//!
//! The orchestrator never writes to stdout directly; it publishes through
//! this trait so the runtime can frame notifications and tests can record
//! them.

use lsp_types::Diagnostic;
use parking_lot::Mutex;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

/// Receiver of `textDocument/publishDiagnostics` payloads.
pub trait DiagnosticsSink: Send + Sync {
    /// Publish the full diagnostic set for `uri` (an empty slice clears
    /// the editor's Problems pane for that document).
    fn publish(&self, uri: &str, version: Option<i32>, diagnostics: &[Diagnostic]);
}

/// Production sink: frames a notification onto the shared output writer.
pub struct WriterSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl WriterSink {
    /// Sink over the server's shared output writer.
    pub fn new(writer: Arc<Mutex<Box<dyn Write + Send>>>) -> Self {
        Self { writer }
    }
}

impl DiagnosticsSink for WriterSink {
    fn publish(&self, uri: &str, version: Option<i32>, diagnostics: &[Diagnostic]) {
        let mut params = json!({
            "uri": uri,
            "diagnostics": diagnostics,
        });
        if let (Some(map), Some(version)) = (params.as_object_mut(), version) {
            map.insert("version".into(), json!(version));
        }
        let mut writer = self.writer.lock();
        if let Err(e) = crate::transport::write_notification(
            &mut *writer,
            pike_lsp_protocol::methods::TEXT_DOCUMENT_PUBLISH_DIAGNOSTICS,
            params,
        ) {
            tracing::warn!(error = %e, uri, "failed to publish diagnostics");
        }
    }
}

/// Test sink that records every publication.
#[derive(Debug, Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, Option<i32>, Vec<Diagnostic>)>>,
}

impl RecordingSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<(String, Option<i32>, Vec<Diagnostic>)> {
        self.published.lock().clone()
    }

    /// The most recent publication for `uri`.
    pub fn last_for(&self, uri: &str) -> Option<(Option<i32>, Vec<Diagnostic>)> {
        self.published
            .lock()
            .iter()
            .rev()
            .find(|(u, _, _)| u == uri)
            .map(|(_, v, d)| (*v, d.clone()))
    }
}

impl DiagnosticsSink for RecordingSink {
    fn publish(&self, uri: &str, version: Option<i32>, diagnostics: &[Diagnostic]) {
        self.published.lock().push((uri.to_string(), version, diagnostics.to_vec()));
    }
}
