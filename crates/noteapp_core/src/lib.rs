//! Core note logic for NoteApp.
//! This crate owns the note model, the store contract and the cache policy.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::codec::{note_to_fields, parse_note_lenient, parse_note_strict, NoteParseError};
pub use model::note::{
    document_key, now_millis, Importance, Note, NoteId, UnknownImportance, DEFAULT_CONTENT,
    DEFAULT_TITLE,
};
pub use model::samples::sample_notes;
pub use repo::note_repo::{
    CachedNote, LiveSubscription, NoteRepository, RepositoryOptions, SyncState, NOTES_COLLECTION,
};
pub use store::{
    Completion, Document, DocumentStore, FieldFilter, Fields, ListenerRegistration, Snapshot,
    SnapshotListener, SnapshotQuery, SqliteDocumentStore, StoreError, StoreResult,
};

/// Minimal health-check API for front-end wiring.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
