//! Server lifecycle: initialize and workspace root discovery.

use super::LspServer;
use pike_lsp_protocol::capabilities;
use serde_json::Value;
use std::path::PathBuf;
use url::Url;

impl LspServer {
    /// Handle the initialize request: record workspace roots, kick off the
    /// workspace scan, and advertise capabilities.
    pub(crate) fn handle_initialize(&mut self, params: Option<Value>) -> Value {
        let mut roots: Vec<PathBuf> = Vec::new();
        if let Some(params) = &params {
            if let Some(folders) = params.get("workspaceFolders").and_then(|v| v.as_array()) {
                for folder in folders {
                    if let Some(path) = folder
                        .get("uri")
                        .and_then(|v| v.as_str())
                        .and_then(uri_to_path)
                    {
                        roots.push(path);
                    }
                }
            }
            if roots.is_empty() {
                if let Some(path) =
                    params.get("rootUri").and_then(|v| v.as_str()).and_then(uri_to_path)
                {
                    roots.push(path);
                } else if let Some(path) = params.get("rootPath").and_then(|v| v.as_str()) {
                    roots.push(PathBuf::from(path));
                }
            }
        }

        if !roots.is_empty() {
            let summary = self.scanner.initialize(&roots);
            tracing::info!(files = summary.files, roots = roots.len(), "workspace indexed");
        }
        self.workspace_folders = roots;
        self.initialized = true;

        capabilities::initialize_result("pike-lsp", env!("CARGO_PKG_VERSION"))
    }
}

pub(crate) fn uri_to_path(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok()?.to_file_path().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_to_path() {
        assert_eq!(uri_to_path("file:///tmp/project"), Some(PathBuf::from("/tmp/project")));
        assert_eq!(uri_to_path("not-a-uri"), None);
    }
}
