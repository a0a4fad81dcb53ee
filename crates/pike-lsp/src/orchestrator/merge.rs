//! Merging parse and introspection symbol trees.
//!
//! Parse symbols carry source positions; introspection symbols carry
//! types, modifiers, and documentation. The merge is by name, level by
//! level: position wins from parse, type and modifiers from
//! introspection, and introspection-only symbols (inherited members the
//! parse pass never sees) are appended.

use pike_symbol_types::PikeSymbol;
use rustc_hash::FxHashMap;

/// Merge the two symbol trees the analyzer reports.
pub fn merge_symbols(parse: Vec<PikeSymbol>, introspect: Vec<PikeSymbol>) -> Vec<PikeSymbol> {
    let mut by_name: FxHashMap<String, PikeSymbol> = FxHashMap::default();
    let mut order: Vec<String> = Vec::new();
    for symbol in introspect {
        if !by_name.contains_key(&symbol.name) {
            order.push(symbol.name.clone());
        }
        by_name.insert(symbol.name.clone(), symbol);
    }

    let mut merged = Vec::new();
    for mut symbol in parse {
        if let Some(info) = by_name.remove(&symbol.name) {
            enrich(&mut symbol, info);
        }
        merged.push(symbol);
    }

    // Introspection-only symbols, in the order introspection reported them.
    for name in order {
        if let Some(symbol) = by_name.remove(&name) {
            merged.push(symbol);
        }
    }
    merged
}

/// Copy type, modifiers, and documentation onto a parse symbol; recurse
/// into children.
fn enrich(target: &mut PikeSymbol, info: PikeSymbol) {
    if target.pike_type.is_none() {
        target.pike_type = info.pike_type;
    }
    if target.modifiers.is_empty() {
        target.modifiers = info.modifiers;
    }
    if target.documentation.is_none() {
        target.documentation = info.documentation;
    }
    if target.position.is_none() {
        target.position = info.position;
    }
    if !info.children.is_empty() {
        let children = std::mem::take(&mut target.children);
        target.children = merge_symbols(children, info.children);
    }
}
