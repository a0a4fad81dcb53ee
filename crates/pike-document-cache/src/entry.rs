//! The per-document analysis snapshot.

use lsp_types::{Diagnostic, Position};
use pike_symbol_types::{InheritEdge, PikeSymbol, flatten_symbols};
use rustc_hash::{FxHashMap, FxHashSet};

/// The mediator's analysis snapshot for one document.
///
/// Replaced atomically on each successful analysis; deleted on close or on
/// supersession by a newer version. `symbols` keeps the hierarchical tree
/// the analyzer reported (class members retain their parent relationship
/// for outline views); `symbol_names` indexes the flattened form for O(1)
/// hover and completion prefilters.
#[derive(Debug, Clone, Default)]
pub struct DocumentCacheEntry {
    /// Document version this snapshot corresponds to
    pub version: i32,
    /// Hierarchical symbol tree
    pub symbols: Vec<PikeSymbol>,
    /// Editor-facing diagnostics published for this version
    pub diagnostics: Vec<Diagnostic>,
    /// Reference occurrences per identifier (definitions excluded)
    pub symbol_positions: FxHashMap<String, Vec<Position>>,
    /// All declared symbol names, flattened
    pub symbol_names: FxHashSet<String>,
    /// md5 hex digest of the full document text
    pub content_hash: String,
    /// Per-line hashes of the normalized text
    pub line_hashes: Vec<u64>,
    /// Introspection symbol list (types, modifiers, documentation), when
    /// the introspect operation succeeded
    pub introspection: Option<Vec<PikeSymbol>>,
    /// Inheritance edges declared by this document
    pub inherits: Vec<InheritEdge>,
}

impl DocumentCacheEntry {
    /// Populate `symbol_names` from the hierarchical tree.
    pub fn index_symbol_names(&mut self) {
        self.symbol_names = flatten_symbols(&self.symbols).into_iter().map(|s| s.name).collect();
    }

    /// True if `name` is declared anywhere in this document.
    pub fn declares(&self, name: &str) -> bool {
        self.symbol_names.contains(name)
    }

    /// Reference positions recorded for `name`.
    pub fn references(&self, name: &str) -> &[Position] {
        self.symbol_positions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
