//! Content and per-line hashing.
//!
//! The full-document hash is an md5 hex digest of the raw text. Per-line
//! hashes are cheap 64-bit hashes of *normalized* lines: `//` comments
//! stripped (string-aware) and trailing whitespace trimmed, so edits that
//! only touch comments or padding hash identically.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Stable hash of the full document text.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text))
}

/// Per-line hashes of the normalized document text.
///
/// Always yields at least one hash (the empty document hashes its single
/// empty line), satisfying `line_hashes.len() >= line count`.
pub fn line_hashes(text: &str) -> Vec<u64> {
    text.split('\n').map(|line| hash_line(&normalize_line(line))).collect()
}

fn hash_line(line: &str) -> u64 {
    let mut hasher = FxHasher::default();
    line.hash(&mut hasher);
    hasher.finish()
}

/// Strip a trailing `//` comment and right-trim.
///
/// A `//` inside a double-quoted string does not start a comment; the scan
/// tracks string state with backslash escapes. Block comments are left for
/// the full-document masker in [`positions`](crate::positions) - a line
/// hash only needs to be insensitive to same-line noise.
pub fn normalize_line(line: &str) -> String {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    let mut cut = line.len();

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => {
                i += 1; // skip the escaped byte
            }
            b'"' => in_string = !in_string,
            b'/' if !in_string && i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                cut = i;
                break;
            }
            _ => {}
        }
        i += 1;
    }

    line[..cut].trim_end().to_string()
}
