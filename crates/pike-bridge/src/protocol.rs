//! Typed views of the analyzer's RPC dialect.
//!
//! Every request is a single-line JSON object `{id, method, params}`;
//! every response `{id, result}` or `{id, error}`. The structures here are
//! what [`decode`](crate::decode) produces from the untrusted wire form.

use pike_symbol_types::{InheritEdge, PikeSymbol};

/// Operations the unified `analyze` call can bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzeOp {
    /// Source-level symbol extraction; succeeds on recoverable errors
    Parse,
    /// Compiled-program introspection: types, modifiers, inheritance
    Introspect,
    /// Compilation diagnostics
    Diagnostics,
    /// Token stream for position-accurate reference indexing
    Tokenize,
}

impl AnalyzeOp {
    /// Wire name of the operation.
    pub const fn as_str(self) -> &'static str {
        match self {
            AnalyzeOp::Parse => "parse",
            AnalyzeOp::Introspect => "introspect",
            AnalyzeOp::Diagnostics => "diagnostics",
            AnalyzeOp::Tokenize => "tokenize",
        }
    }

    /// The full set, in canonical order.
    pub const ALL: [AnalyzeOp; 4] =
        [AnalyzeOp::Parse, AnalyzeOp::Introspect, AnalyzeOp::Diagnostics, AnalyzeOp::Tokenize];
}

/// Outcome of one operation inside an `analyze` response.
///
/// The analyzer reports per-operation results and failures independently; a
/// failed `introspect` must not take parse diagnostics down with it.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome<T> {
    /// The operation ran and produced a result
    Ok(T),
    /// The operation ran and failed; carries the analyzer's message
    Failed(String),
    /// The operation was not requested or not reported
    Absent,
}

impl<T> OpOutcome<T> {
    /// The result, if the operation succeeded.
    pub fn ok(self) -> Option<T> {
        match self {
            OpOutcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// The result, or a default for failed/absent operations (the
    /// "substitute an empty default" rule of the validation pipeline).
    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        match self {
            OpOutcome::Ok(value) => value,
            _ => T::default(),
        }
    }

    /// True when the operation ran and failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, OpOutcome::Failed(_))
    }
}

/// Diagnostic severity on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireSeverity {
    /// Error
    Error,
    /// Warning
    Warning,
    /// Informational
    Information,
}

/// One diagnostic as the analyzer reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct WireDiagnostic {
    /// Severity class
    pub severity: WireSeverity,
    /// Message text
    pub message: String,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column; negative when unknown
    pub character: i32,
    /// Stable diagnostic code (`syntax-error`, `uninitialized-var`, ...)
    pub code: Option<String>,
}

/// One token from `tokenize` or `find_occurrences`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireToken {
    /// Token text
    pub text: String,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column; negative when unknown
    pub character: i32,
}

/// Result of the `parse` operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    /// Hierarchical symbol tree with source positions
    pub symbols: Vec<PikeSymbol>,
    /// Parse diagnostics
    pub diagnostics: Vec<WireDiagnostic>,
}

/// Result of the `introspect` operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntrospectResult {
    /// Symbols with types, modifiers, and documentation
    pub symbols: Vec<PikeSymbol>,
    /// Inheritance edges the program declares
    pub inherits: Vec<InheritEdge>,
    /// Introspection diagnostics (module resolution noise included; the
    /// orchestrator filters before publishing)
    pub diagnostics: Vec<WireDiagnostic>,
}

/// The `_perf` block of an analyze response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerfInfo {
    /// Whether the analyzer's compilation cache answered
    pub cache_hit: bool,
    /// Rendered cache key the analyzer used
    pub cache_key: String,
}

/// Decoded unified `analyze` response.
#[derive(Debug, Clone)]
pub struct AnalyzeResponse {
    /// Parse outcome
    pub parse: OpOutcome<ParseResult>,
    /// Introspection outcome
    pub introspect: OpOutcome<IntrospectResult>,
    /// Compilation diagnostics outcome
    pub diagnostics: OpOutcome<Vec<WireDiagnostic>>,
    /// Tokenization outcome
    pub tokenize: OpOutcome<Vec<WireToken>>,
    /// Performance block
    pub perf: PerfInfo,
}

/// Result of `get_completion_context`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionContext {
    /// Kind of completion site (`member`, `module`, `toplevel`, ...)
    pub context_kind: String,
    /// Receiver expression for member completion
    pub object_name: Option<String>,
    /// Identifier prefix already typed
    pub prefix: String,
    /// Access operator at the site (`->`, `.`, `::`)
    pub operator: Option<String>,
}

/// Result of `resolve` (module path resolution).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveOutcome {
    /// Resolved filesystem path, when found
    pub path: Option<String>,
    /// Whether the resolved path exists
    pub exists: bool,
}

/// Result of `get_inherited` (type hierarchy probe).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritedTypes {
    /// Programs the class inherits from, nearest first
    pub supertypes: Vec<String>,
    /// Known programs inheriting from the class
    pub subtypes: Vec<String>,
}

/// Analyzer-side compilation cache statistics (`get_cache_stats`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerCacheStats {
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Evicted entries
    pub evictions: u64,
    /// Distinct cached paths
    pub size: u64,
    /// Configured path cap
    pub max_files: u64,
}
