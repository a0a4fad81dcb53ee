//! Reference-position indexing.
//!
//! Builds the `symbol name → reference positions` map feature handlers use
//! to answer references and rename without re-invoking the analyzer. The
//! canonical path consumes the analyzer's token stream; a regex scanner
//! covers analyses where token data was unavailable.
//!
//! The identifier rule is deliberately conservative: a position is indexed
//! only when the characters on either side are not word characters (no
//! partial-identifier matches), and tokens on a symbol's declaration line
//! are excluded so the index holds *references*, not definitions.

use lsp_types::Position;
use pike_symbol_types::PikeSymbol;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

/// One token from the analyzer's `tokenize` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text
    pub text: String,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column; negative when the analyzer could not recover it
    pub character: i32,
}

/// Build the reference index from a token stream.
///
/// `declared` is the flattened symbol list; `text` is the document the
/// tokens were lexed from (needed for the word-boundary check).
pub fn build_reference_index(
    text: &str,
    declared: &[PikeSymbol],
    tokens: &[Token],
) -> FxHashMap<String, Vec<Position>> {
    let names = declared_names(declared);
    let decl_lines = declaration_lines(declared);
    let lines: Vec<&str> = text.split('\n').collect();

    let mut index: FxHashMap<String, Vec<Position>> = FxHashMap::default();
    for token in tokens {
        if token.character < 0 || !names.contains(token.text.as_str()) {
            continue;
        }
        if is_declaration_line(&decl_lines, &token.text, token.line) {
            continue;
        }
        let Some(line_text) = lines.get(token.line as usize) else { continue };
        let start = token.character as usize;
        if !has_word_boundaries(line_text, start, token.text.len()) {
            continue;
        }
        index
            .entry(token.text.clone())
            .or_default()
            .push(Position::new(token.line, token.character as u32));
    }
    index
}

/// Regex fallback used when the analyzer returned no token stream.
///
/// Replicates the word-boundary and definition-exclusion rules and
/// additionally skips positions inside line or block comments (the token
/// path never sees comments; the scanner has to mask them itself).
pub fn scan_reference_index(
    text: &str,
    declared: &[PikeSymbol],
) -> FxHashMap<String, Vec<Position>> {
    let decl_lines = declaration_lines(declared);
    let masked = mask_comments(text);

    let mut index: FxHashMap<String, Vec<Position>> = FxHashMap::default();
    for name in declared_names(declared) {
        let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
            continue;
        };
        let mut positions = Vec::new();
        for (line_no, line) in masked.split('\n').enumerate() {
            let line_no = line_no as u32;
            if is_declaration_line(&decl_lines, name, line_no) {
                continue;
            }
            for found in pattern.find_iter(line) {
                positions.push(Position::new(line_no, found.start() as u32));
            }
        }
        if !positions.is_empty() {
            index.insert(name.to_string(), positions);
        }
    }
    index
}

fn declared_names(declared: &[PikeSymbol]) -> FxHashSet<&str> {
    declared.iter().map(|s| s.name.as_str()).collect()
}

/// `name → set of declaration lines` for definition exclusion.
fn declaration_lines(declared: &[PikeSymbol]) -> FxHashMap<&str, FxHashSet<u32>> {
    let mut map: FxHashMap<&str, FxHashSet<u32>> = FxHashMap::default();
    for symbol in declared {
        if let Some(line) = symbol.line() {
            map.entry(symbol.name.as_str()).or_default().insert(line);
        }
    }
    map
}

fn is_declaration_line(
    decl_lines: &FxHashMap<&str, FxHashSet<u32>>,
    name: &str,
    line: u32,
) -> bool {
    decl_lines.get(name).is_some_and(|lines| lines.contains(&line))
}

/// Neither neighbor of `[start, start+len)` may be a word character.
fn has_word_boundaries(line: &str, start: usize, len: usize) -> bool {
    let bytes = line.as_bytes();
    if start > 0 && is_word_byte(bytes.get(start - 1).copied()) {
        return false;
    }
    if is_word_byte(bytes.get(start + len).copied()) {
        return false;
    }
    true
}

fn is_word_byte(b: Option<u8>) -> bool {
    matches!(b, Some(b) if b == b'_' || b.is_ascii_alphanumeric())
}

/// Blank out `//` line comments and `/* */` block comments, preserving
/// every byte position (comment bytes become spaces, newlines survive).
/// Double-quoted strings are honored so `"//"` stays content.
pub fn mask_comments(text: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Str,
        Line,
        Block,
    }

    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = State::Code;
    let mut i = 0;

    while i < bytes.len() {
        match state {
            State::Code => match bytes[i] {
                b'"' => state = State::Str,
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    state = State::Line;
                    out[i] = b' ';
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    state = State::Block;
                    out[i] = b' ';
                }
                _ => {}
            },
            State::Str => match bytes[i] {
                b'\\' => {
                    i += 1; // escaped byte stays content
                }
                b'"' | b'\n' => state = State::Code,
                _ => {}
            },
            State::Line => {
                if bytes[i] == b'\n' {
                    state = State::Code;
                } else {
                    out[i] = b' ';
                }
            }
            State::Block => {
                if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                    state = State::Code;
                } else if bytes[i] != b'\n' {
                    out[i] = b' ';
                }
            }
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
