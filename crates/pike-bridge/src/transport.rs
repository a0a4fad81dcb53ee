//! Line-delimited JSON-RPC framing to the analyzer subprocess.
//!
//! One JSON object per line on stdin and stdout. Partial lines are
//! buffered by the line reader until a newline arrives; lines that do not
//! parse as JSON are logged and skipped without aborting the connection.
//! Responses correlate to requests by integer id.

use crate::error::TransportError;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

/// Events the transport surfaces alongside request/response traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One line of subprocess stderr
    Stderr(String),
    /// The subprocess's stdout closed (exit code, when known)
    Exit(Option<i32>),
}

type PendingSender = oneshot::Sender<Result<Value, TransportError>>;

struct Shared {
    pending: Mutex<HashMap<u64, PendingSender>>,
    alive: AtomicBool,
}

impl Shared {
    /// Reject every pending future and refuse new sends.
    fn shut_down(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut pending = self.pending.lock();
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(TransportError::SubprocessExited));
        }
    }
}

/// JSON-RPC client endpoint over the analyzer's stdio.
///
/// Generic over the byte streams so tests can drive it through an
/// in-memory duplex instead of a real child process.
pub struct AnalyzerTransport {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl AnalyzerTransport {
    /// Build a transport over the subprocess's stdin/stdout and spawn the
    /// reader task. `events` receives an [`TransportEvent::Exit`] when
    /// stdout closes.
    pub fn new<W, R>(stdin: W, stdout: R, events: mpsc::UnboundedSender<TransportEvent>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
        });

        tokio::spawn(read_loop(stdout, Arc::clone(&shared), events));

        Self {
            writer: tokio::sync::Mutex::new(Box::new(stdin)),
            shared,
            next_id: AtomicU64::new(0),
        }
    }

    /// Forward a stderr stream into the event channel, line by line.
    pub fn attach_stderr<R>(stderr: R, events: mpsc::UnboundedSender<TransportEvent>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if events.send(TransportEvent::Stderr(line)).is_err() {
                    break;
                }
            }
        });
    }

    /// Whether the subprocess connection is still usable.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Send one request and await the matching response object.
    ///
    /// The returned value is the whole `{id, result}` / `{id, error}`
    /// message; the bridge splits result from error.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::SubprocessExited);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        let mut line = serde_json::to_string(&json!({
            "id": id,
            "method": method,
            "params": params,
        }))
        .map_err(|e| TransportError::Io(e.to_string()))?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                self.shared.pending.lock().remove(&id);
                self.shared.shut_down();
                return Err(TransportError::Io(e.to_string()));
            }
            if let Err(e) = writer.flush().await {
                self.shared.pending.lock().remove(&id);
                self.shared.shut_down();
                return Err(TransportError::Io(e.to_string()));
            }
        }

        match rx.await {
            Ok(result) => result,
            // Sender dropped without a value: the reader shut down.
            Err(_) => Err(TransportError::SubprocessExited),
        }
    }
}

async fn read_loop<R>(
    stdout: R,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<TransportEvent>,
) where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let message: Value = match serde_json::from_str(trimmed) {
                    Ok(value) => value,
                    Err(e) => {
                        // Free-form output on stdout is the analyzer's
                        // problem, not a reason to drop the connection.
                        tracing::warn!(error = %e, line = %truncate(trimmed, 120),
                            "skipping non-JSON line from analyzer");
                        continue;
                    }
                };
                dispatch(&shared, message);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "analyzer stdout read failed");
                break;
            }
        }
    }
    shared.shut_down();
    let _ = events.send(TransportEvent::Exit(None));
}

fn dispatch(shared: &Shared, message: Value) {
    let Some(id) = message.get("id").and_then(Value::as_u64) else {
        tracing::warn!("analyzer message without id; dropped");
        return;
    };
    let sender = shared.pending.lock().remove(&id);
    match sender {
        Some(sender) => {
            let _ = sender.send(Ok(message));
        }
        None => {
            // A response nobody is waiting for: log and drop.
            tracing::warn!(id, "analyzer response with no matching request; dropped");
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// In-memory analyzer stub: reads request lines, maps them through `f`.
    fn scripted_analyzer<F>(
        f: F,
    ) -> (AnalyzerTransport, mpsc::UnboundedReceiver<TransportEvent>)
    where
        F: Fn(Value) -> Option<String> + Send + 'static,
    {
        let (stdin_theirs, stdin_ours) = tokio::io::duplex(64 * 1024);
        let (stdout_ours, mut stdout_theirs) = tokio::io::duplex(64 * 1024);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdin_theirs).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(request) = serde_json::from_str::<Value>(&line) else { continue };
                if let Some(mut reply) = f(request) {
                    reply.push('\n');
                    if stdout_theirs.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        });

        (AnalyzerTransport::new(stdin_ours, stdout_ours, event_tx), event_rx)
    }

    fn echo_result(request: Value) -> Option<String> {
        let id = request.get("id").and_then(Value::as_u64)?;
        let method = request.get("method").and_then(Value::as_str)?.to_string();
        Some(json!({"id": id, "result": {"method": method}}).to_string())
    }

    #[tokio::test]
    async fn test_send_correlates_by_id() -> Result<(), TransportError> {
        let (transport, _events) = scripted_analyzer(echo_result);

        let a = transport.send("parse", json!({"code": "int x;"})).await?;
        let b = transport.send("tokenize", json!({"code": "int x;"})).await?;

        assert_eq!(a["result"]["method"], "parse");
        assert_eq!(b["result"]["method"], "tokenize");
        assert_eq!(a["id"], 1);
        assert_eq!(b["id"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_json_lines_are_skipped() -> Result<(), TransportError> {
        let (transport, _events) = scripted_analyzer(|request| {
            let id = request.get("id").and_then(Value::as_u64)?;
            // Garbage first, then the real response on the next line.
            Some(format!("Pike v9.0 release 7 running\n{}", json!({"id": id, "result": 1})))
        });

        let response = transport.send("version", json!({})).await?;
        assert_eq!(response["result"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unmatched_response_id_is_dropped() -> Result<(), TransportError> {
        let (transport, _events) = scripted_analyzer(|request| {
            let id = request.get("id").and_then(Value::as_u64)?;
            // A stray id nobody asked for, then the real answer.
            Some(format!("{}\n{}", json!({"id": 999, "result": 0}), json!({"id": id, "result": 2})))
        });

        let response = transport.send("parse", json!({})).await?;
        assert_eq!(response["result"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_exit_rejects_pending_and_future_sends() {
        let (transport, mut events) = scripted_analyzer(|_request| None);

        // The stub never answers; drop its stdout by closing our handle on
        // the conversation: send once, then shut the stub down by dropping
        // the transport's peer (the scripted task ends when stdin closes).
        let pending = transport.send("analyze", json!({"code": ""}));

        // Closing the write side: dropping the transport writer is not
        // possible here, so end the stub instead by sending a line it
        // cannot answer and then closing stdin via task shutdown. Instead,
        // emulate death by shutting the shared state down directly.
        transport.shared.shut_down();

        let result = pending.await;
        assert!(matches!(result, Err(TransportError::SubprocessExited)));

        let result = transport.send("parse", json!({})).await;
        assert!(matches!(result, Err(TransportError::SubprocessExited)));

        // No Exit event was emitted for the synthetic shutdown; the reader
        // loop emits one when the stream really closes.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_eof_emits_exit_event() {
        let (stdin_theirs, stdin_ours) = tokio::io::duplex(1024);
        let (stdout_ours, stdout_theirs) = tokio::io::duplex(1024);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let transport = AnalyzerTransport::new(stdin_ours, stdout_ours, event_tx);
        drop(stdout_theirs); // subprocess "exits"
        drop(stdin_theirs);

        let event = event_rx.recv().await;
        assert_eq!(event, Some(TransportEvent::Exit(None)));
        assert!(!transport.is_alive());
    }

    #[tokio::test]
    async fn test_stderr_lines_become_events() {
        let (mut stderr_theirs, stderr_ours) = tokio::io::duplex(1024);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        AnalyzerTransport::attach_stderr(stderr_ours, event_tx);
        stderr_theirs.write_all(b"compile: warning on line 3\n").await.ok();

        let event = event_rx.recv().await;
        assert_eq!(event, Some(TransportEvent::Stderr("compile: warning on line 3".into())));
    }
}
