//! Unified Pike symbol taxonomy for LSP tooling.
//!
//! This crate provides a single, authoritative definition of Pike symbol
//! kinds used across the analyzer bridge, document cache, workspace index,
//! and LSP providers.
//!
//! # Design Goals
//!
//! - **Single source of truth**: all symbol classification flows through this crate
//! - **Wire tolerance**: kinds decode from untrusted analyzer JSON without panicking
//! - **LSP compatibility**: direct mapping to LSP protocol symbol kinds

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// Unified Pike symbol classification.
///
/// Represents every symbol shape the analyzer reports. Unknown wire strings
/// decode to [`PikeSymbolKind::Unknown`] rather than failing the whole
/// response - a misbehaving analyzer must never crash the mediator.
///
/// # LSP Protocol Mapping
///
/// | Variant | LSP Kind | Number |
/// |---------|----------|--------|
/// | `Module` | Module | 2 |
/// | `Class` | Class | 5 |
/// | `Method` | Method | 6 |
/// | `Function` | Function | 12 |
/// | `Variable` | Variable | 13 |
/// | `Constant` | Constant | 14 |
/// | `Typedef` | TypeParameter | 26 |
/// | `Enum` | Enum | 10 |
/// | `EnumValue` | EnumMember | 22 |
/// | `Inherit` | Interface | 8 |
/// | `Import` | Module | 2 |
/// | `Unknown` | Variable | 13 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PikeSymbolKind {
    /// Module-level program (`.pmod` member or nested module)
    Module,
    /// Class declaration (`class Foo { }`)
    Class,
    /// Method inside a class body
    Method,
    /// Top-level function
    Function,
    /// Variable declaration (`int x;`, `string name;`)
    Variable,
    /// Constant definition (`constant FOO = 1;`)
    Constant,
    /// Type alias (`typedef int|string mixed_id;`)
    Typedef,
    /// Enum declaration (`enum Color { ... }`)
    Enum,
    /// Enum member
    #[serde(rename = "enum_value")]
    EnumValue,
    /// Inherit declaration (`inherit "base.pike";`)
    Inherit,
    /// Import declaration (`import Stdio;`)
    Import,
    /// Anything the analyzer reports that we do not classify
    Unknown,
}

impl PikeSymbolKind {
    /// Decode a kind from the analyzer's wire string.
    ///
    /// Never fails; unrecognized strings map to `Unknown`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "module" | "program" => PikeSymbolKind::Module,
            "class" => PikeSymbolKind::Class,
            "method" => PikeSymbolKind::Method,
            "function" => PikeSymbolKind::Function,
            "variable" => PikeSymbolKind::Variable,
            "constant" => PikeSymbolKind::Constant,
            "typedef" => PikeSymbolKind::Typedef,
            "enum" => PikeSymbolKind::Enum,
            "enum_value" | "enum_constant" => PikeSymbolKind::EnumValue,
            "inherit" => PikeSymbolKind::Inherit,
            "import" => PikeSymbolKind::Import,
            _ => PikeSymbolKind::Unknown,
        }
    }

    /// Convert to LSP-compliant symbol kind number.
    #[inline]
    pub const fn to_lsp_kind(self) -> u32 {
        match self {
            PikeSymbolKind::Module => 2,
            PikeSymbolKind::Class => 5,
            PikeSymbolKind::Method => 6,
            PikeSymbolKind::Function => 12,
            PikeSymbolKind::Variable => 13,
            PikeSymbolKind::Constant => 14,
            PikeSymbolKind::Typedef => 26,
            PikeSymbolKind::Enum => 10,
            PikeSymbolKind::EnumValue => 22,
            PikeSymbolKind::Inherit => 8,
            PikeSymbolKind::Import => 2,
            PikeSymbolKind::Unknown => 13,
        }
    }

    /// True for kinds that declare a callable.
    #[inline]
    pub const fn is_callable(self) -> bool {
        matches!(self, PikeSymbolKind::Function | PikeSymbolKind::Method)
    }

    /// True for kinds that open a scope containing child symbols.
    #[inline]
    pub const fn is_container(self) -> bool {
        matches!(self, PikeSymbolKind::Module | PikeSymbolKind::Class | PikeSymbolKind::Enum)
    }
}

/// Pike declaration modifiers.
///
/// Decoded from the analyzer's modifier strings; unknown modifiers are
/// dropped by [`SymbolModifier::from_wire`] returning `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolModifier {
    /// `static` - not visible through external indexing
    Static,
    /// `private` - not inherited
    Private,
    /// `protected` - inherited but not externally visible
    Protected,
    /// `public` - explicitly public
    Public,
    /// `final` - cannot be overridden
    Final,
    /// `optional` - predef may be absent
    Optional,
    /// `variant` - overloaded on argument types
    Variant,
    /// `local` - non-virtual resolution
    Local,
    /// `inline` - inline into call sites
    Inline,
    /// Marked deprecated via attribute or documentation
    Deprecated,
}

impl SymbolModifier {
    /// Decode a modifier from its wire string, dropping unknown values.
    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "static" => SymbolModifier::Static,
            "private" => SymbolModifier::Private,
            "protected" => SymbolModifier::Protected,
            "public" => SymbolModifier::Public,
            "final" => SymbolModifier::Final,
            "optional" => SymbolModifier::Optional,
            "variant" => SymbolModifier::Variant,
            "local" => SymbolModifier::Local,
            "inline" => SymbolModifier::Inline,
            "deprecated" => SymbolModifier::Deprecated,
            _ => return None,
        })
    }
}

/// A position in a document, zero-based.
///
/// `character` is signed because the analyzer reports `-1` for symbols
/// whose column could not be recovered; consumers must filter negatives
/// before building editor-facing positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct WirePosition {
    /// Zero-based line
    pub line: u32,
    /// Zero-based column; negative when unknown
    pub character: i32,
}

impl WirePosition {
    /// Construct a position.
    pub const fn new(line: u32, character: i32) -> Self {
        Self { line, character }
    }

    /// True when the column is usable.
    #[inline]
    pub const fn has_character(self) -> bool {
        self.character >= 0
    }
}

/// One symbol in the analyzer's symbol tree.
///
/// Parse symbols carry positions; introspection symbols carry types and
/// modifiers. The orchestrator merges the two by name, so every field except
/// `name` and `kind` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PikeSymbol {
    /// Declared name
    pub name: String,
    /// Symbol classification
    pub kind: PikeSymbolKind,
    /// Declaration position, if the parse recovered one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<WirePosition>,
    /// Enclosing container name (class or module), if nested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Pike type expression, from introspection
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub pike_type: Option<String>,
    /// Declaration modifiers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<SymbolModifier>,
    /// Child symbols (class members, enum values)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PikeSymbol>,
    /// Extracted documentation comment, from introspection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl PikeSymbol {
    /// Construct a minimal symbol with just a name and kind.
    pub fn new(name: impl Into<String>, kind: PikeSymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            position: None,
            parent: None,
            pike_type: None,
            modifiers: Vec::new(),
            children: Vec::new(),
            documentation: None,
        }
    }

    /// True if the symbol carries the `Deprecated` modifier.
    pub fn is_deprecated(&self) -> bool {
        self.modifiers.contains(&SymbolModifier::Deprecated)
    }

    /// Declaration line, if known.
    pub fn line(&self) -> Option<u32> {
        self.position.map(|p| p.line)
    }
}

/// An inheritance edge declared by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritEdge {
    /// Inheriting program (class name or file path)
    pub child: String,
    /// Inherited program
    pub parent: String,
    /// Edge kind: `inherit`, `import`, or `include`
    pub kind: InheritKind,
}

/// How one program pulls in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InheritKind {
    /// `inherit "base.pike";`
    Inherit,
    /// `import Module;`
    Import,
    /// `#include "file.h"`
    Include,
}

/// Flatten a symbol tree into a single list, recording parent names.
///
/// Nested class members are lifted to the top level so cross-file lookups
/// can find them by bare name; the hierarchical form stays untouched on the
/// cache entry for outline views.
pub fn flatten_symbols(symbols: &[PikeSymbol]) -> Vec<PikeSymbol> {
    let mut flat = Vec::new();
    for symbol in symbols {
        flatten_into(symbol, None, &mut flat);
    }
    flat
}

fn flatten_into(symbol: &PikeSymbol, parent: Option<&str>, out: &mut Vec<PikeSymbol>) {
    let mut top = symbol.clone();
    top.children = Vec::new();
    if top.parent.is_none() {
        top.parent = parent.map(str::to_string);
    }
    out.push(top);
    for child in &symbol.children {
        flatten_into(child, Some(&symbol.name), out);
    }
}
