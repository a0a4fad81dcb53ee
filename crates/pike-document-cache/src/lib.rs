//! Analyzed-document snapshots and the incremental change classifier.
//!
//! The mediator keeps one [`DocumentCacheEntry`] per open document: the
//! symbol tree, diagnostics, a reference-position index, and hashes of the
//! text it was built from. Feature handlers answer hover, references, and
//! rename from these snapshots without re-invoking the analyzer; the
//! [`classifier`] decides whether an edit can skip re-analysis entirely.
//!
//! Writes come from the validation pipeline only; everything else reads.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
mod entry;
pub mod hashing;
mod inherits;
pub mod positions;
mod store;

pub use classifier::{Classification, ClassifyReason, classify};
pub use entry::DocumentCacheEntry;
pub use inherits::InheritanceTable;
pub use store::{DocumentCache, ValidationGuard};
