//! SQLite-backed `DocumentStore`.
//!
//! # Responsibility
//! - Persist schemaless documents as JSON text keyed by `(collection, key)`.
//! - Evaluate subscription filters/ordering with SQLite JSON1 functions.
//! - Fan out fresh snapshots to listeners after every committed change.
//!
//! # Invariants
//! - `put` replaces the whole document, never merges fields.
//! - Numeric document keys list in numeric order, ahead of other keys.
//! - Completions run synchronously, after listeners have been notified.
//! - Each listener receives snapshots one at a time and never one older than
//!   a snapshot it already received, whichever thread wrote.
//! - No lock is held while a completion or listener runs, so callbacks may
//!   re-enter the store.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::note::now_millis;
use crate::store::{
    Completion, Document, DocumentStore, Fields, ListenerRegistration, Snapshot, SnapshotListener,
    SnapshotQuery, StoreError, StoreResult,
};
use log::{debug, error, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type SharedListener = Arc<dyn Fn(StoreResult<Snapshot>) + Send + Sync + 'static>;

const KEY_ORDER_SQL: &str = "CASE WHEN doc_key NOT GLOB '*[^0-9]*' THEN 0 ELSE 1 END ASC,
    CAST(doc_key AS INTEGER) ASC,
    doc_key ASC";

/// Snapshot tagged with the store revision it was read at.
type Revisioned = (u64, StoreResult<Snapshot>);

#[derive(Default)]
struct DeliveryState {
    delivering: bool,
    pending: Option<Revisioned>,
    delivered_revision: u64,
}

/// One listener plus its single-flight delivery queue.
///
/// Whoever finds the queue idle drains it; concurrent or re-entrant offers
/// only replace the pending snapshot with a newer one.
struct ListenerSlot {
    listener: SharedListener,
    delivery: Mutex<DeliveryState>,
}

impl ListenerSlot {
    fn new(listener: SharedListener) -> Self {
        Self {
            listener,
            delivery: Mutex::new(DeliveryState::default()),
        }
    }

    fn lock_delivery(&self) -> MutexGuard<'_, DeliveryState> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn offer(&self, revision: u64, snapshot: StoreResult<Snapshot>) {
        {
            let mut state = self.lock_delivery();
            let newest_seen = state
                .pending
                .as_ref()
                .map_or(state.delivered_revision, |(pending, _)| *pending);
            if revision < newest_seen {
                return;
            }
            state.pending = Some((revision, snapshot));
            if state.delivering {
                return;
            }
            state.delivering = true;
        }

        loop {
            let next = {
                let mut state = self.lock_delivery();
                match state.pending.take() {
                    Some((revision, snapshot)) => {
                        state.delivered_revision = revision;
                        snapshot
                    }
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            (self.listener)(next);
        }
    }
}

struct ListenerEntry {
    collection: String,
    query: SnapshotQuery,
    slot: Arc<ListenerSlot>,
}

struct StoreInner {
    conn: Mutex<Connection>,
    /// Bumped under the connection lock by every committed write.
    revision: AtomicU64,
    listeners: Mutex<BTreeMap<u64, ListenerEntry>>,
    next_listener_id: AtomicU64,
}

/// Document store persisted in a local SQLite database.
///
/// Cloning yields another handle to the same database and listener set.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    inner: Arc<StoreInner>,
}

impl SqliteDocumentStore {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                revision: AtomicU64::new(0),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a file-backed store, applying migrations.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        open_db(path).map(Self::new)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> DbResult<Self> {
        open_db_in_memory().map(Self::new)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.lock_listeners().len()
    }

    fn write_and_notify(
        &self,
        collection: &str,
        operation: &str,
        key: &str,
        result: StoreResult<()>,
    ) -> StoreResult<()> {
        match &result {
            Ok(()) => {
                debug!(
                    "event=store_write module=store status=ok op={operation} collection={collection} key={key}"
                );
                self.inner.notify(collection);
            }
            Err(err) => error!(
                "event=store_write module=store status=error op={operation} collection={collection} key={key} error={err}"
            ),
        }
        result
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn put(&self, collection: &str, key: &str, fields: Fields, done: Completion<()>) {
        let result = self.inner.put_document(collection, key, fields);
        done(self.write_and_notify(collection, "put", key, result));
    }

    fn get_all(&self, collection: &str, done: Completion<Vec<Document>>) {
        let (_, result) = self.inner.query(collection, &SnapshotQuery::default());
        done(result);
    }

    fn delete(&self, collection: &str, key: &str, done: Completion<()>) {
        let result = self.inner.delete_document(collection, key);
        done(self.write_and_notify(collection, "delete", key, result));
    }

    fn subscribe(
        &self,
        collection: &str,
        query: SnapshotQuery,
        listener: SnapshotListener,
    ) -> ListenerRegistration {
        let listener: SharedListener = Arc::from(listener);
        if let Err(err) = query.validate() {
            warn!("event=store_subscribe module=store status=error collection={collection} error={err}");
            listener(Err(err));
            return ListenerRegistration::detached();
        }

        let slot = Arc::new(ListenerSlot::new(listener));
        let listener_id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock_listeners().insert(
            listener_id,
            ListenerEntry {
                collection: collection.to_string(),
                query: query.clone(),
                slot: Arc::clone(&slot),
            },
        );
        debug!(
            "event=store_subscribe module=store status=ok collection={collection} listener_id={listener_id}"
        );

        let (revision, documents) = self.inner.query(collection, &query);
        slot.offer(revision, documents.map(|documents| Snapshot { documents }));

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock_listeners().remove(&listener_id);
                debug!("event=store_unsubscribe module=store status=ok listener_id={listener_id}");
            }
        })
    }
}

impl StoreInner {
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, BTreeMap<u64, ListenerEntry>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put_document(&self, collection: &str, key: &str, fields: Fields) -> StoreResult<()> {
        validate_location(collection, key)?;
        let text = serde_json::to_string(&Value::Object(fields))?;
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO documents (collection, doc_key, fields, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (collection, doc_key) DO UPDATE SET
                fields = excluded.fields,
                updated_at = excluded.updated_at;",
            params![collection, key, text, now_millis()],
        )?;
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_document(&self, collection: &str, key: &str) -> StoreResult<()> {
        validate_location(collection, key)?;
        let conn = self.lock_conn();
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_key = ?2;",
            params![collection, key],
        )?;
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Runs `query` and returns the revision the result reflects.
    fn query(&self, collection: &str, query: &SnapshotQuery) -> (u64, StoreResult<Vec<Document>>) {
        if let Err(err) = query.validate() {
            return (self.revision.load(Ordering::SeqCst), Err(err));
        }

        let mut sql =
            String::from("SELECT doc_key, fields FROM documents WHERE collection = ?");
        let mut bind_values = vec![SqlValue::Text(collection.to_string())];

        if let Some(filter) = &query.filter {
            sql.push_str(" AND json_extract(fields, ?) = ?");
            bind_values.push(SqlValue::Text(json_path(&filter.field)));
            bind_values.push(scalar_to_sql(&filter.value));
        }

        sql.push_str(" ORDER BY ");
        if let Some(field) = &query.order_by {
            sql.push_str("json_extract(fields, ?) ASC, ");
            bind_values.push(SqlValue::Text(json_path(field)));
        }
        sql.push_str(KEY_ORDER_SQL);

        let conn = self.lock_conn();
        let revision = self.revision.load(Ordering::SeqCst);
        (revision, read_documents(&conn, &sql, bind_values))
    }

    fn notify(&self, collection: &str) {
        let targets: Vec<(SnapshotQuery, Arc<ListenerSlot>)> = self
            .lock_listeners()
            .values()
            .filter(|entry| entry.collection == collection)
            .map(|entry| (entry.query.clone(), Arc::clone(&entry.slot)))
            .collect();

        for (query, slot) in targets {
            let (revision, documents) = self.query(collection, &query);
            slot.offer(revision, documents.map(|documents| Snapshot { documents }));
        }
    }
}

fn read_documents(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<SqlValue>,
) -> StoreResult<Vec<Document>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let text: String = row.get(1)?;
        let fields: Fields = serde_json::from_str(&text)?;
        documents.push(Document { key, fields });
    }
    Ok(documents)
}

fn validate_location(collection: &str, key: &str) -> StoreResult<()> {
    if collection.trim().is_empty() {
        return Err(StoreError::InvalidQuery(
            "collection name cannot be empty".to_string(),
        ));
    }
    if key.is_empty() || key.contains('/') {
        return Err(StoreError::InvalidQuery(format!(
            "document key `{key}` must be non-empty and contain no `/`"
        )));
    }
    Ok(())
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

// json_extract yields SQL scalars: JSON booleans come back as 0/1.
fn scalar_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ListenerSlot, SqliteDocumentStore};
    use crate::store::{DocumentStore, Fields, Snapshot, SnapshotQuery, StoreError, StoreResult};
    use serde_json::json;
    use std::sync::{mpsc, Arc, Mutex};

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn put_sync(store: &SqliteDocumentStore, key: &str, value: serde_json::Value) {
        let (tx, rx) = mpsc::channel();
        store.put(
            "notes",
            key,
            fields(value),
            Box::new(move |result| tx.send(result).unwrap()),
        );
        rx.recv().unwrap().unwrap();
    }

    #[test]
    fn put_replaces_whole_document() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        put_sync(&store, "1", json!({"title": "a", "content": "b"}));
        put_sync(&store, "1", json!({"title": "c"}));

        let (tx, rx) = mpsc::channel();
        store.get_all("notes", Box::new(move |result| tx.send(result).unwrap()));
        let documents = rx.recv().unwrap().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(serde_json::Value::Object(documents[0].fields.clone()), json!({"title": "c"}));
    }

    #[test]
    fn empty_key_is_rejected() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let (tx, rx) = mpsc::channel::<StoreResult<()>>();
        store.delete("notes", "", Box::new(move |result| tx.send(result).unwrap()));
        assert!(matches!(
            rx.recv().unwrap().unwrap_err(),
            StoreError::InvalidQuery(_)
        ));
    }

    #[test]
    fn filter_matches_booleans_and_numbers() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        put_sync(&store, "1", json!({"pinned": true, "rank": 3}));
        put_sync(&store, "2", json!({"pinned": false, "rank": 1}));

        let (tx, rx) = mpsc::channel();
        let _registration = store.subscribe(
            "notes",
            SnapshotQuery::default().where_equal("pinned", true),
            Box::new(move |snapshot| {
                let _ = tx.send(snapshot);
            }),
        );
        let snapshot = rx.recv().unwrap().unwrap();
        assert_eq!(snapshot.documents.len(), 1);
        assert_eq!(snapshot.documents[0].key, "1");
    }

    #[test]
    fn numeric_keys_list_in_numeric_order() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for key in ["10", "2", "draft", "1"] {
            put_sync(&store, key, json!({"rank": 1}));
        }

        let (tx, rx) = mpsc::channel();
        store.get_all("notes", Box::new(move |result| tx.send(result).unwrap()));
        let keys: Vec<String> = rx
            .recv()
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|document| document.key)
            .collect();
        assert_eq!(keys, vec!["1", "2", "10", "draft"]);

        let (tx, rx) = mpsc::channel();
        let _registration = store.subscribe(
            "notes",
            SnapshotQuery::default().order_by("rank"),
            Box::new(move |snapshot| {
                let _ = tx.send(snapshot);
            }),
        );
        let keys: Vec<String> = rx
            .recv()
            .unwrap()
            .unwrap()
            .documents
            .into_iter()
            .map(|document| document.key)
            .collect();
        assert_eq!(keys, vec!["1", "2", "10", "draft"]);
    }

    #[test]
    fn listener_slot_drops_snapshots_older_than_delivered() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let slot = ListenerSlot::new(Arc::new(move |snapshot: StoreResult<Snapshot>| {
            sink.lock().unwrap().push(snapshot.unwrap().documents.len());
        }));
        let snapshot_of = |count: usize| -> StoreResult<Snapshot> {
            let documents = (0..count)
                .map(|index| crate::store::Document::new(index.to_string(), Fields::new()))
                .collect();
            Ok(Snapshot { documents })
        };

        slot.offer(2, snapshot_of(2));
        slot.offer(1, snapshot_of(1));
        slot.offer(3, snapshot_of(3));
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }
}
