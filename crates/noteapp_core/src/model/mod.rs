//! Note domain model and its document representation.
//!
//! # Responsibility
//! - Define the `Note` value record and `Importance` levels.
//! - Translate notes to and from schemaless store documents.
//!
//! # Invariants
//! - Notes are replaced whole; there are no partial field updates.
//! - Note ids come from the repository, not from the store.

pub mod codec;
pub mod note;
pub mod samples;
