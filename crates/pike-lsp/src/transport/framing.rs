//! Message framing for LSP Base Protocol
//!
//! Implements Content-Length based message framing as specified in
//! the LSP Base Protocol.

use pike_lsp_protocol::{JsonRpcRequest, JsonRpcResponse};
use std::collections::HashMap;
use std::io::{self, BufRead, Read, Write};

/// Read the next LSP message from a buffered reader
///
/// Returns `Ok(None)` on EOF. Malformed frames are logged, skipped, and
/// reading continues with the next frame. Returns `Err` only on I/O
/// errors (non-recoverable).
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<JsonRpcRequest>> {
    loop {
        let mut headers = HashMap::new();

        // Read headers
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None); // EOF
            }

            let line = line.trim_end();
            if line.is_empty() {
                break; // End of headers
            }

            if let Some((key, value)) = line.split_once(": ") {
                headers.insert(key.to_string(), value.to_string());
            }
        }

        // Read content
        let Some(length) =
            headers.get("Content-Length").and_then(|v| v.parse::<usize>().ok())
        else {
            tracing::warn!("frame without Content-Length; skipped");
            continue;
        };

        let mut content = vec![0u8; length];
        let mut bytes_read = 0;

        // Read content in chunks to handle partial reads
        while bytes_read < length {
            match reader.read(&mut content[bytes_read..])? {
                0 => return Ok(None), // Unexpected EOF
                n => bytes_read += n,
            }
        }

        match serde_json::from_slice(&content) {
            Ok(request) => return Ok(Some(request)),
            Err(e) => {
                // Malformed frames must not take the server down.
                tracing::warn!(error = %e, "malformed LSP frame; skipped");
                continue;
            }
        }
    }
}

/// Write an LSP message to a writer with proper framing
pub fn write_message<W: Write>(writer: &mut W, response: &JsonRpcResponse) -> io::Result<()> {
    let content = serde_json::to_string(response)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", content.len(), content)?;
    writer.flush()
}

/// Write an LSP notification to a writer
pub fn write_notification<W: Write>(
    writer: &mut W,
    method: &str,
    params: serde_json::Value,
) -> io::Result<()> {
    let notification = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    });

    let content = serde_json::to_string(&notification)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", content.len(), content)?;
    writer.flush()
}
