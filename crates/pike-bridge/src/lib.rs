//! Analyzer subprocess ownership for the Pike LSP mediator.
//!
//! The mediator drives one long-lived Pike interpreter subprocess ("the
//! analyzer") that performs real parsing, compilation, and introspection.
//! This crate owns that relationship end to end:
//!
//! - [`AnalyzerTransport`] frames line-delimited JSON-RPC over the child's
//!   stdio and correlates responses to requests by integer id
//! - [`PikeBridge`] owns the subprocess lifecycle (lazy restart on crash),
//!   deduplicates identical concurrent requests, enforces per-request
//!   timeouts, and exposes typed operations - `analyze` being the workhorse
//! - [`decode`] turns the analyzer's untrusted JSON into typed structures
//!   without ever panicking on shape mismatches
//!
//! A misbehaving analyzer must not crash the mediator: malformed lines are
//! logged and skipped, unknown response ids are dropped, and a subprocess
//! exit rejects pending futures and arms a restart on the next call.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
pub mod decode;
mod error;
mod protocol;
mod transport;

pub use bridge::{BridgeConfig, BridgeStatus, PikeBridge};
pub use error::{BridgeError, TransportError};
pub use protocol::{
    AnalyzeOp, AnalyzeResponse, AnalyzerCacheStats, CompletionContext, InheritedTypes,
    IntrospectResult, OpOutcome, ParseResult, PerfInfo, ResolveOutcome, WireDiagnostic,
    WireSeverity, WireToken,
};
pub use transport::{AnalyzerTransport, TransportEvent};
