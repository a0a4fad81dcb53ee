//! Shaping analyzer diagnostics for the editor.
//!
//! Parse, compilation, and introspection diagnostics are merged in that
//! order, module-resolution noise is filtered from the introspection set,
//! deprecation tags are attached by cross-referencing introspection
//! symbols, and the total is capped at the configured maximum.

use lsp_types::{Diagnostic, DiagnosticSeverity, DiagnosticTag, NumberOrString, Position, Range};
use once_cell::sync::Lazy;
use pike_bridge::{WireDiagnostic, WireSeverity};
use regex::Regex;
use rustc_hash::FxHashSet;

/// Introspection messages matching this blocklist are dropped before
/// publication: module-resolution chatter is not actionable in the editor.
static RESOLUTION_NOISE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)] // static pattern, validated by tests
    Regex::new(r"(?i)(failed to resolve module|module .{1,80} not found|resolving .{1,80} failed)")
        .unwrap()
});

/// Convert one wire diagnostic.
pub fn to_lsp(diag: &WireDiagnostic, deprecated_names: &FxHashSet<String>) -> Diagnostic {
    let character = diag.character.max(0) as u32;
    let start = Position::new(diag.line, character);
    let severity = match diag.severity {
        WireSeverity::Error => DiagnosticSeverity::ERROR,
        WireSeverity::Warning => DiagnosticSeverity::WARNING,
        WireSeverity::Information => DiagnosticSeverity::INFORMATION,
    };

    let tags = if mentions_deprecated(&diag.message, deprecated_names) {
        Some(vec![DiagnosticTag::DEPRECATED])
    } else {
        None
    };

    Diagnostic {
        range: Range::new(start, start),
        severity: Some(severity),
        code: diag.code.clone().map(NumberOrString::String),
        code_description: None,
        source: Some("pike".to_string()),
        message: diag.message.clone(),
        related_information: None,
        tags,
        data: None,
    }
}

/// Merge all diagnostic sources for one document, in publication order.
pub fn build_diagnostics(
    parse: &[WireDiagnostic],
    compile: &[WireDiagnostic],
    introspect: &[WireDiagnostic],
    deprecated_names: &FxHashSet<String>,
    max_problems: usize,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for diag in parse.iter().chain(compile) {
        out.push(to_lsp(diag, deprecated_names));
    }
    for diag in introspect {
        if RESOLUTION_NOISE.is_match(&diag.message) {
            continue;
        }
        out.push(to_lsp(diag, deprecated_names));
    }
    out.truncate(max_problems);
    out
}

/// Whether `message` names any deprecated identifier as a whole word.
fn mentions_deprecated(message: &str, deprecated_names: &FxHashSet<String>) -> bool {
    if deprecated_names.is_empty() {
        return false;
    }
    message
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| !word.is_empty() && deprecated_names.contains(word))
}
