//! Document store contract consumed by the note repository.
//!
//! # Responsibility
//! - Describe the remote document database as a capability: keyed
//!   put/delete, whole-collection reads and filtered live subscriptions.
//! - Keep store transport details out of repository policy code.
//!
//! # Invariants
//! - Every operation reports its outcome exactly once through its completion.
//! - Completions may run synchronously or later, on any thread.
//! - A subscription pushes an initial snapshot and then one snapshot per
//!   change to its collection until the registration is removed or dropped.
//! - Implementations never invoke callbacks while holding internal locks.

use crate::db::DbError;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteDocumentStore;

/// Schemaless field map of one document.
pub type Fields = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// One-shot completion for a store operation.
pub type Completion<T> = Box<dyn FnOnce(StoreResult<T>) + Send + 'static>;

/// Standing receiver of subscription snapshots.
pub type SnapshotListener = Box<dyn Fn(StoreResult<Snapshot>) + Send + Sync + 'static>;

/// Remote-operation failure, surfaced verbatim to callers.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Serialization(serde_json::Error),
    InvalidQuery(String),
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::InvalidQuery(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// One keyed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(key: impl Into<String>, fields: Fields) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }
}

/// Point-in-time result set pushed by a subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

/// Equality filter on one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// Live subscription query: optional equality filter, optional ascending
/// order field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotQuery {
    pub filter: Option<FieldFilter>,
    pub order_by: Option<String>,
}

impl SnapshotQuery {
    /// Restricts results to documents whose `field` equals `value`.
    pub fn where_equal(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Orders results ascending by `field`.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Checks that every referenced field name is a plain identifier.
    pub fn validate(&self) -> StoreResult<()> {
        let filter_field = self.filter.as_ref().map(|filter| filter.field.as_str());
        for field in filter_field.into_iter().chain(self.order_by.as_deref()) {
            if !is_valid_field_name(field) {
                return Err(StoreError::InvalidQuery(format!(
                    "field name `{field}` must match [A-Za-z0-9_]+"
                )));
            }
        }
        if let Some(filter) = &self.filter {
            if filter.value.is_array() || filter.value.is_object() {
                return Err(StoreError::InvalidQuery(format!(
                    "filter on `{}` must compare against a scalar",
                    filter.field
                )));
            }
        }
        Ok(())
    }
}

/// Handle that keeps a subscription listener registered.
///
/// Dropping the handle removes the listener.
pub struct ListenerRegistration {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ListenerRegistration {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Registration with nothing to release.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Removes the listener now.
    pub fn remove(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

/// Remote document database capability.
pub trait DocumentStore: Send + Sync {
    /// Writes `fields` as the full content of document `key`.
    fn put(&self, collection: &str, key: &str, fields: Fields, done: Completion<()>);
    /// Reads every document in `collection`.
    fn get_all(&self, collection: &str, done: Completion<Vec<Document>>);
    /// Deletes document `key`; deleting an absent document succeeds.
    fn delete(&self, collection: &str, key: &str, done: Completion<()>);
    /// Registers a live listener for `query` over `collection`.
    fn subscribe(
        &self,
        collection: &str,
        query: SnapshotQuery,
        listener: SnapshotListener,
    ) -> ListenerRegistration;
}

fn is_valid_field_name(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::{ListenerRegistration, SnapshotQuery, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn query_validation_rejects_path_like_fields() {
        let query = SnapshotQuery::default().order_by("timestamp); DROP");
        assert!(matches!(
            query.validate().unwrap_err(),
            StoreError::InvalidQuery(_)
        ));

        let ok = SnapshotQuery::default()
            .where_equal("importance", "URGENT")
            .order_by("timestamp");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn query_validation_rejects_composite_filter_values() {
        let query = SnapshotQuery::default().where_equal("tags", serde_json::json!(["a"]));
        assert!(query.validate().is_err());
    }

    #[test]
    fn registration_releases_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registration = ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registration.remove();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&calls);
        {
            let _registration = ListenerRegistration::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
