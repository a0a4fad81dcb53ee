//! Server configuration management
//!
//! Runtime configuration for the LSP server: analyzer subprocess location,
//! module search paths, validation debounce, and diagnostic limits.
//! Updated dynamically via `workspace/didChangeConfiguration`.

use pike_bridge::BridgeConfig;
use std::time::Duration;

/// Server configuration
///
/// All settings arrive through the editor's configuration channel under
/// the `pike` section; there is no on-disk state.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Pike interpreter executable used to run the analyzer.
    pub analyzer_executable: String,
    /// Path to the analyzer script handed to the interpreter.
    pub analyzer_script: Option<String>,
    /// Extra module search paths passed as `-M` arguments.
    pub module_paths: Vec<String>,
    /// Debounce delay between a change notification and validation.
    pub diagnostic_delay_ms: u64,
    /// Cap on diagnostics published per document.
    pub max_number_of_problems: usize,
    /// Analyzer request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            analyzer_executable: "pike".to_string(),
            analyzer_script: None,
            module_paths: Vec::new(),
            diagnostic_delay_ms: 200,
            max_number_of_problems: 100,
            request_timeout_secs: 15,
        }
    }
}

impl ServerConfig {
    /// Update configuration from LSP settings
    pub fn update_from_value(&mut self, settings: &serde_json::Value) {
        let Some(pike) = settings.get("pike") else { return };

        if let Some(executable) = pike.get("analyzerPath").and_then(|v| v.as_str()) {
            if !executable.is_empty() {
                self.analyzer_executable = executable.to_string();
            }
        }
        if let Some(script) = pike.get("analyzerScript").and_then(|v| v.as_str()) {
            self.analyzer_script =
                if script.is_empty() { None } else { Some(script.to_string()) };
        }
        if let Some(paths) = pike.get("modulePaths").and_then(|v| v.as_array()) {
            self.module_paths =
                paths.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        }
        if let Some(delay) = pike.get("diagnosticDelay").and_then(|v| v.as_u64()) {
            self.diagnostic_delay_ms = delay;
        }
        if let Some(max) = pike.get("maxNumberOfProblems").and_then(|v| v.as_u64()) {
            self.max_number_of_problems = max as usize;
        }
        if let Some(timeout) = pike.get("requestTimeout").and_then(|v| v.as_u64()) {
            self.request_timeout_secs = timeout.max(1);
        }
    }

    /// Debounce delay as a `Duration`.
    pub fn diagnostic_delay(&self) -> Duration {
        Duration::from_millis(self.diagnostic_delay_ms)
    }

    /// Derive the subprocess configuration for the bridge.
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut args = Vec::new();
        for path in &self.module_paths {
            args.push("-M".to_string());
            args.push(path.clone());
        }
        if let Some(script) = &self.analyzer_script {
            args.push(script.clone());
        }
        BridgeConfig {
            executable: self.analyzer_executable.clone(),
            args,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..BridgeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_from_value_reads_pike_section() {
        let mut config = ServerConfig::default();
        config.update_from_value(&json!({
            "pike": {
                "analyzerPath": "/opt/pike/bin/pike",
                "analyzerScript": "/opt/pike-lsp/analyzer.pike",
                "modulePaths": ["/src/modules"],
                "diagnosticDelay": 350,
                "maxNumberOfProblems": 25,
            }
        }));

        assert_eq!(config.analyzer_executable, "/opt/pike/bin/pike");
        assert_eq!(config.analyzer_script.as_deref(), Some("/opt/pike-lsp/analyzer.pike"));
        assert_eq!(config.module_paths, vec!["/src/modules".to_string()]);
        assert_eq!(config.diagnostic_delay_ms, 350);
        assert_eq!(config.max_number_of_problems, 25);
    }

    #[test]
    fn test_missing_section_changes_nothing() {
        let mut config = ServerConfig::default();
        config.update_from_value(&json!({"other": {"diagnosticDelay": 5}}));
        assert_eq!(config.diagnostic_delay_ms, 200);
    }

    #[test]
    fn test_bridge_config_carries_module_paths() {
        let config = ServerConfig {
            module_paths: vec!["/a".into(), "/b".into()],
            analyzer_script: Some("analyzer.pike".into()),
            ..Default::default()
        };
        let bridge = config.bridge_config();
        assert_eq!(
            bridge.args,
            vec!["-M", "/a", "-M", "/b", "analyzer.pike"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_script_clears_setting() {
        let mut config = ServerConfig {
            analyzer_script: Some("old.pike".into()),
            ..Default::default()
        };
        config.update_from_value(&json!({"pike": {"analyzerScript": ""}}));
        assert!(config.analyzer_script.is_none());
    }
}
