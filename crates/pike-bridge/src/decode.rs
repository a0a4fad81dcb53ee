//! Defensive decoding of analyzer JSON.
//!
//! The analyzer is a separate process speaking dynamically-typed JSON; a
//! misbehaving analyzer must not crash the mediator. Every accessor here
//! validates before use and falls back to an empty default instead of
//! failing: a symbol without a name is skipped, a diagnostic without a
//! message becomes an empty-message diagnostic, a missing array reads as
//! empty.

use crate::protocol::{
    AnalyzeResponse, AnalyzerCacheStats, CompletionContext, IntrospectResult, OpOutcome,
    ParseResult, PerfInfo, ResolveOutcome, WireDiagnostic, WireSeverity, WireToken,
};
use pike_symbol_types::{
    InheritEdge, InheritKind, PikeSymbol, PikeSymbolKind, SymbolModifier, WirePosition,
};
use serde_json::Value;

/// Array field, empty when missing or mistyped.
pub fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// String field with a default.
pub fn string_or<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Optional string field.
pub fn string_opt(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Unsigned integer field with a default.
pub fn u64_or(value: &Value, key: &str, default: u64) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Signed integer field with a default.
pub fn i64_or(value: &Value, key: &str, default: i64) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Boolean field with a default.
pub fn bool_or(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn line_of(value: &Value) -> u32 {
    i64_or(value, "line", 0).clamp(0, u32::MAX as i64) as u32
}

fn character_of(value: &Value) -> i32 {
    i64_or(value, "character", -1).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Decode one symbol; `None` when it has no usable name.
pub fn symbol(value: &Value) -> Option<PikeSymbol> {
    let name = value.get("name").and_then(Value::as_str)?;
    if name.is_empty() {
        return None;
    }
    let mut symbol =
        PikeSymbol::new(name, PikeSymbolKind::from_wire(string_or(value, "kind", "")));

    if value.get("line").is_some() {
        symbol.position = Some(WirePosition::new(line_of(value), character_of(value)));
    }
    symbol.parent = string_opt(value, "parent");
    symbol.pike_type = string_opt(value, "type");
    symbol.documentation = string_opt(value, "documentation");
    symbol.modifiers = array(value, "modifiers")
        .iter()
        .filter_map(Value::as_str)
        .filter_map(SymbolModifier::from_wire)
        .collect();
    symbol.children = symbols(array(value, "children"));
    Some(symbol)
}

/// Decode a symbol array, skipping malformed entries.
pub fn symbols(values: &[Value]) -> Vec<PikeSymbol> {
    values.iter().filter_map(symbol).collect()
}

/// Decode one diagnostic. Tolerates missing fields; an entirely
/// non-object value yields `None`.
pub fn diagnostic(value: &Value) -> Option<WireDiagnostic> {
    if !value.is_object() {
        return None;
    }
    let severity = match string_or(value, "severity", "error") {
        "warning" => WireSeverity::Warning,
        "info" | "information" | "hint" => WireSeverity::Information,
        _ => WireSeverity::Error,
    };
    Some(WireDiagnostic {
        severity,
        message: string_or(value, "message", "").to_string(),
        line: line_of(value),
        character: character_of(value),
        code: string_opt(value, "code"),
    })
}

/// Decode a diagnostics array.
pub fn diagnostics(values: &[Value]) -> Vec<WireDiagnostic> {
    values.iter().filter_map(diagnostic).collect()
}

/// Decode one token; `None` without text.
pub fn token(value: &Value) -> Option<WireToken> {
    let text = value.get("text").and_then(Value::as_str)?;
    Some(WireToken { text: text.to_string(), line: line_of(value), character: character_of(value) })
}

/// Decode a token array.
pub fn tokens(values: &[Value]) -> Vec<WireToken> {
    values.iter().filter_map(token).collect()
}

/// Decode one inheritance edge.
pub fn inherit_edge(value: &Value) -> Option<InheritEdge> {
    let child = value.get("child").and_then(Value::as_str)?;
    let parent = value.get("parent").and_then(Value::as_str)?;
    let kind = match string_or(value, "kind", "inherit") {
        "import" => InheritKind::Import,
        "include" => InheritKind::Include,
        _ => InheritKind::Inherit,
    };
    Some(InheritEdge { child: child.to_string(), parent: parent.to_string(), kind })
}

/// Decode a `parse` result payload.
pub fn parse_result(value: &Value) -> ParseResult {
    ParseResult {
        symbols: symbols(array(value, "symbols")),
        diagnostics: diagnostics(array(value, "diagnostics")),
    }
}

/// Decode an `introspect` result payload.
pub fn introspect_result(value: &Value) -> IntrospectResult {
    IntrospectResult {
        symbols: symbols(array(value, "symbols")),
        inherits: array(value, "inherits").iter().filter_map(inherit_edge).collect(),
        diagnostics: diagnostics(array(value, "diagnostics")),
    }
}

/// Split one operation out of an analyze response: a `failures` entry wins
/// over a missing result; a present result decodes with `f`.
fn op_outcome<T>(response: &Value, op: &str, f: impl FnOnce(&Value) -> T) -> OpOutcome<T> {
    if let Some(failure) = response.get("failures").and_then(|v| v.get(op)) {
        let message = failure.as_str().unwrap_or("operation failed").to_string();
        return OpOutcome::Failed(message);
    }
    match response.get("result").and_then(|v| v.get(op)) {
        Some(value) => OpOutcome::Ok(f(value)),
        None => OpOutcome::Absent,
    }
}

/// Decode the unified `analyze` response.
pub fn analyze_response(response: &Value) -> AnalyzeResponse {
    let perf = response.get("_perf").map(|p| PerfInfo {
        cache_hit: bool_or(p, "cache_hit", false),
        cache_key: string_or(p, "cache_key", "").to_string(),
    });

    AnalyzeResponse {
        parse: op_outcome(response, "parse", parse_result),
        introspect: op_outcome(response, "introspect", introspect_result),
        diagnostics: op_outcome(response, "diagnostics", |v| {
            diagnostics(v.as_array().map(Vec::as_slice).unwrap_or(&[]))
        }),
        tokenize: op_outcome(response, "tokenize", |v| {
            let list = v
                .get("tokens")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_else(|| v.as_array().map(Vec::as_slice).unwrap_or(&[]));
            tokens(list)
        }),
        perf: perf.unwrap_or_default(),
    }
}

/// Decode a `get_completion_context` result.
pub fn completion_context(value: &Value) -> CompletionContext {
    CompletionContext {
        context_kind: string_or(value, "contextKind", "toplevel").to_string(),
        object_name: string_opt(value, "objectName"),
        prefix: string_or(value, "prefix", "").to_string(),
        operator: string_opt(value, "operator"),
    }
}

/// Decode a `resolve` result.
pub fn resolve_outcome(value: &Value) -> ResolveOutcome {
    ResolveOutcome { path: string_opt(value, "path"), exists: bool_or(value, "exists", false) }
}

/// Decode a `batch_parse` result: one entry per submitted file, malformed
/// entries decoding to empty results so indices stay aligned.
pub fn batch_parse_results(value: &Value) -> Vec<ParseResult> {
    array(value, "results").iter().map(parse_result).collect()
}

/// Decode a `get_inherited` result.
pub fn inherited_types(value: &Value) -> crate::protocol::InheritedTypes {
    let names = |key: &str| -> Vec<String> {
        array(value, key)
            .iter()
            .filter_map(|v| v.as_str().or_else(|| v.get("name").and_then(Value::as_str)))
            .map(str::to_string)
            .collect()
    };
    crate::protocol::InheritedTypes { supertypes: names("supertypes"), subtypes: names("subtypes") }
}

/// Decode a `get_cache_stats` result.
pub fn cache_stats(value: &Value) -> AnalyzerCacheStats {
    AnalyzerCacheStats {
        hits: u64_or(value, "hits", 0),
        misses: u64_or(value, "misses", 0),
        evictions: u64_or(value, "evictions", 0),
        size: u64_or(value, "size", 0),
        max_files: u64_or(value, "max_files", 0),
    }
}
