//! The incremental change classifier.
//!
//! Given the previous snapshot and the current text, decides whether
//! re-running analysis can be skipped. Skipping is only safe when the
//! normalized content of the edited lines is unchanged - whitespace and
//! comment edits qualify, anything that moves line boundaries does not.

use crate::entry::DocumentCacheEntry;
use crate::hashing;

/// Why the classifier decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyReason {
    /// No prior snapshot exists; analysis is mandatory
    NoCache,
    /// Edited lines hash identically after normalization
    SemanticUnchanged,
    /// Edited lines differ semantically
    SemanticChanged,
    /// Full-document replacement with identical content
    ContentUnchanged,
    /// Full-document replacement with different content
    FullReplacement,
}

/// Classifier verdict plus the freshly computed hashes.
///
/// When `can_skip` is true the orchestrator refreshes the hashes and
/// version on the existing entry without a reparse; when false the hashes
/// are threaded into the analyze pipeline so they are not recomputed.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Whether re-analysis can be skipped
    pub can_skip: bool,
    /// Decision rationale
    pub reason: ClassifyReason,
    /// md5 hex digest of the current text
    pub content_hash: String,
    /// Per-line hashes of the current text
    pub line_hashes: Vec<u64>,
}

/// Decide whether the edit described by `changed_lines` (inclusive
/// zero-based line range from the change notification, `None` for a
/// full-document replacement) requires re-analysis.
pub fn classify(
    previous: Option<&DocumentCacheEntry>,
    text: &str,
    changed_lines: Option<(u32, u32)>,
) -> Classification {
    let content_hash = hashing::content_hash(text);
    let line_hashes = hashing::line_hashes(text);

    let Some(previous) = previous else {
        return Classification {
            can_skip: false,
            reason: ClassifyReason::NoCache,
            content_hash,
            line_hashes,
        };
    };

    match changed_lines {
        Some((start, end)) if !previous.line_hashes.is_empty() => {
            let unchanged = line_count_stable(previous, &line_hashes)
                && range_hashes_equal(&previous.line_hashes, &line_hashes, start, end);
            let reason = if unchanged {
                ClassifyReason::SemanticUnchanged
            } else {
                ClassifyReason::SemanticChanged
            };
            Classification { can_skip: unchanged, reason, content_hash, line_hashes }
        }
        _ => {
            if previous.content_hash == content_hash {
                Classification {
                    can_skip: true,
                    reason: ClassifyReason::ContentUnchanged,
                    content_hash,
                    line_hashes,
                }
            } else {
                Classification {
                    can_skip: false,
                    reason: ClassifyReason::FullReplacement,
                    content_hash,
                    line_hashes,
                }
            }
        }
    }
}

/// An edit that inserts or removes a newline shifts every following line;
/// ranged comparison is only meaningful while the line count holds.
fn line_count_stable(previous: &DocumentCacheEntry, new_hashes: &[u64]) -> bool {
    previous.line_hashes.len() == new_hashes.len()
}

fn range_hashes_equal(old: &[u64], new: &[u64], start: u32, end: u32) -> bool {
    let start = start as usize;
    let end = (end as usize).min(old.len().saturating_sub(1));
    for line in start..=end {
        match (old.get(line), new.get(line)) {
            (Some(a), Some(b)) if a == b => {}
            _ => return false,
        }
    }
    true
}
