//! Workspace file enumeration and cross-file symbol lookup.
//!
//! Scans configured workspace roots for Pike source files (`.pike`,
//! `.pmod` by default), tracks `{uri, path, lastModified}` per file, and
//! answers "which files might declare this name" for cross-file features.
//! Files whose symbols have not been cached yet are conservatively
//! included in lookups so a deeper search can complete the answer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod scanner;

pub use scanner::{ScanOptions, ScanSummary, WorkspaceFile, WorkspaceScanner};
