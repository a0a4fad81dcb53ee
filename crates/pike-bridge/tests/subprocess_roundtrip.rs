//! End-to-end bridge tests against a real subprocess.
//!
//! A tiny shell script stands in for the Pike analyzer: it answers every
//! request line with a canned parse result, and exits abruptly when asked
//! to, which exercises crash detection and lazy restart.

#![cfg(unix)]

use pike_bridge::{AnalyzeOp, BridgeConfig, BridgeError, PikeBridge};
use serde_json::json;
use std::time::Duration;

const FAKE_ANALYZER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *crash_now*) echo "simulated analyzer crash" >&2; exit 3 ;;
  esac
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  printf '{"id":%s,"result":{"result":{"parse":{"symbols":[{"name":"main","kind":"function","line":0,"character":4}],"diagnostics":[]}},"_perf":{"cache_hit":false,"cache_key":"LSP:1"}}}\n' "$id"
done
"#;

fn shell_config() -> BridgeConfig {
    BridgeConfig {
        executable: "sh".to_string(),
        args: vec!["-c".to_string(), FAKE_ANALYZER.to_string()],
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_start_analyze_stop_roundtrip() -> Result<(), BridgeError> {
    let bridge = PikeBridge::new(shell_config());
    bridge.start().await?;

    let response = bridge.analyze("int main() {}", &AnalyzeOp::ALL, "a.pike", 1).await?;
    let parse = response.parse.unwrap_or_default();
    assert_eq!(parse.symbols.len(), 1);
    assert_eq!(parse.symbols[0].name, "main");
    assert_eq!(bridge.status().state, "running");

    bridge.stop().await;
    assert_eq!(bridge.status().state, "not-started");
    Ok(())
}

#[tokio::test]
async fn test_first_call_starts_lazily() -> Result<(), BridgeError> {
    let bridge = PikeBridge::new(shell_config());
    // No explicit start: the first operation spawns the subprocess.
    let response = bridge.analyze("int x;", &[AnalyzeOp::Parse], "b.pike", 1).await?;
    assert!(response.parse.ok().is_some());
    Ok(())
}

#[tokio::test]
async fn test_crash_rejects_inflight_and_restarts_lazily() -> Result<(), BridgeError> {
    let bridge = PikeBridge::new(shell_config());
    bridge.start().await?;

    // This request makes the fake analyzer exit mid-request.
    let result = bridge.request("crash_now", json!({})).await;
    assert!(matches!(result, Err(BridgeError::SubprocessExited { .. })));

    // Give the event pump a moment to observe the exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(bridge.status().state, "crashed");

    // The next call restarts the subprocess without operator action.
    let response = bridge.analyze("int y;", &[AnalyzeOp::Parse], "c.pike", 2).await?;
    assert!(response.parse.ok().is_some());
    assert_eq!(bridge.status().state, "running");
    assert!(bridge.status().restarts >= 1);
    Ok(())
}

#[tokio::test]
async fn test_crash_stderr_is_retained_for_diagnosis() -> Result<(), BridgeError> {
    let bridge = PikeBridge::new(shell_config());
    bridge.start().await?;

    let _ = bridge.request("crash_now", json!({})).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = bridge.status();
    assert!(
        status.stderr_tail.iter().any(|line| line.contains("simulated analyzer crash")),
        "stderr tail should retain the crash message, got {:?}",
        status.stderr_tail
    );
    Ok(())
}
