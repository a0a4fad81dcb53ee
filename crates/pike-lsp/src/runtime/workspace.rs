//! Workspace configuration and folder lifecycle.

use super::LspServer;
use super::lifecycle::uri_to_path;
use serde_json::Value;

impl LspServer {
    /// Handle workspace/didChangeConfiguration.
    ///
    /// Analyzer-affecting settings (executable, script, module paths,
    /// timeout) are pushed to the bridge; when the subprocess command line
    /// changed, the running analyzer is stopped so the next operation
    /// restarts it under the new settings.
    pub(crate) async fn handle_did_change_configuration(&mut self, params: Option<Value>) {
        let Some(settings) = params.as_ref().and_then(|p| p.get("settings")) else { return };

        let (old, new) = {
            let mut config = self.config.lock();
            let old = config.clone();
            config.update_from_value(settings);
            (old, config.clone())
        };

        let analyzer_changed = old.analyzer_executable != new.analyzer_executable
            || old.analyzer_script != new.analyzer_script
            || old.module_paths != new.module_paths;

        self.bridge.reconfigure(new.bridge_config());
        if analyzer_changed {
            tracing::info!("analyzer configuration changed; restarting subprocess lazily");
            self.bridge.stop().await;
        }
    }

    /// Handle workspace/didChangeWorkspaceFolders.
    pub(crate) fn handle_did_change_workspace_folders(&mut self, params: Option<Value>) {
        let Some(event) = params.as_ref().and_then(|p| p.get("event")) else { return };

        for folder in event.get("added").and_then(|v| v.as_array()).unwrap_or(&Vec::new()) {
            if let Some(path) = folder.get("uri").and_then(|v| v.as_str()).and_then(uri_to_path) {
                let summary = self.scanner.add_folder(&path);
                tracing::info!(path = %path.display(), files = summary.files, "workspace folder added");
                self.workspace_folders.push(path);
            }
        }
        for folder in event.get("removed").and_then(|v| v.as_array()).unwrap_or(&Vec::new()) {
            if let Some(path) = folder.get("uri").and_then(|v| v.as_str()).and_then(uri_to_path) {
                self.scanner.remove_folder(&path);
                self.workspace_folders.retain(|existing| existing != &path);
                tracing::info!(path = %path.display(), "workspace folder removed");
            }
        }
    }
}
