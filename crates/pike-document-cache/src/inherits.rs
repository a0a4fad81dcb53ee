//! Mediator-side inheritance table.
//!
//! Mirrors the inheritance edges introspection reports per document so
//! type-hierarchy features can answer supertype/subtype queries without a
//! round-trip to the analyzer. Updated by the validation pipeline only.

use parking_lot::Mutex;
use pike_symbol_types::{InheritEdge, InheritKind};
use rustc_hash::FxHashMap;

/// All inheritance edges declared by open (or recently analyzed)
/// documents, indexed for both directions of the hierarchy.
#[derive(Debug, Default)]
pub struct InheritanceTable {
    /// uri → edges declared in that document
    by_uri: Mutex<FxHashMap<String, Vec<InheritEdge>>>,
}

impl InheritanceTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the edges recorded for one document.
    pub fn update(&self, uri: &str, edges: Vec<InheritEdge>) {
        let mut by_uri = self.by_uri.lock();
        if edges.is_empty() {
            by_uri.remove(uri);
        } else {
            by_uri.insert(uri.to_string(), edges);
        }
    }

    /// Drop everything recorded for one document.
    pub fn remove(&self, uri: &str) {
        self.by_uri.lock().remove(uri);
    }

    /// Direct parents of `child`, restricted to `inherit` edges.
    pub fn supertypes_of(&self, child: &str) -> Vec<String> {
        self.by_uri
            .lock()
            .values()
            .flatten()
            .filter(|edge| edge.kind == InheritKind::Inherit && edge.child == child)
            .map(|edge| edge.parent.clone())
            .collect()
    }

    /// Direct children of `parent`, restricted to `inherit` edges, with
    /// the URI that declares each edge.
    pub fn subtypes_of(&self, parent: &str) -> Vec<(String, String)> {
        self.by_uri
            .lock()
            .iter()
            .flat_map(|(uri, edges)| {
                edges
                    .iter()
                    .filter(|edge| edge.kind == InheritKind::Inherit && edge.parent == parent)
                    .map(|edge| (edge.child.clone(), uri.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Edges declared by one document.
    pub fn edges_of(&self, uri: &str) -> Vec<InheritEdge> {
        self.by_uri.lock().get(uri).cloned().unwrap_or_default()
    }

    /// Number of documents with recorded edges.
    pub fn len(&self) -> usize {
        self.by_uri.lock().len()
    }

    /// True when no edges are recorded.
    pub fn is_empty(&self) -> bool {
        self.by_uri.lock().is_empty()
    }
}
