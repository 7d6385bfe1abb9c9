#![allow(dead_code)]

use noteapp_core::{
    Completion, Document, DocumentStore, Fields, ListenerRegistration, Snapshot, SnapshotListener,
    SnapshotQuery, StoreResult,
};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

type SharedListener = Arc<dyn Fn(StoreResult<Snapshot>) + Send + Sync>;

/// Store double that parks every completion until the test resolves it.
#[derive(Default)]
pub struct ScriptedStore {
    puts: Mutex<VecDeque<(String, Fields, Completion<()>)>>,
    deletes: Mutex<VecDeque<(String, Completion<()>)>>,
    gets: Mutex<VecDeque<Completion<Vec<Document>>>>,
    listeners: Arc<Mutex<BTreeMap<u64, SharedListener>>>,
    queries: Mutex<Vec<(String, SnapshotQuery)>>,
    next_listener_id: Mutex<u64>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending_puts(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    /// Resolves the oldest parked put and returns its key and fields.
    pub fn complete_put(&self, result: StoreResult<()>) -> (String, Fields) {
        let (key, fields, done) = self
            .puts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pending put");
        done(result);
        (key, fields)
    }

    pub fn complete_delete(&self, result: StoreResult<()>) -> String {
        let (key, done) = self
            .deletes
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pending delete");
        done(result);
        key
    }

    pub fn complete_get(&self, result: StoreResult<Vec<Document>>) {
        let done = self
            .gets
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pending get");
        done(result);
    }

    /// Delivers one snapshot result to every registered listener.
    pub fn push(&self, result: impl Fn() -> StoreResult<Snapshot>) {
        let listeners: Vec<SharedListener> =
            self.listeners.lock().unwrap().values().cloned().collect();
        for listener in listeners {
            listener(result());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<(String, SnapshotQuery)> {
        self.queries.lock().unwrap().clone()
    }
}

impl DocumentStore for ScriptedStore {
    fn put(&self, _collection: &str, key: &str, fields: Fields, done: Completion<()>) {
        self.puts
            .lock()
            .unwrap()
            .push_back((key.to_string(), fields, done));
    }

    fn get_all(&self, _collection: &str, done: Completion<Vec<Document>>) {
        self.gets.lock().unwrap().push_back(done);
    }

    fn delete(&self, _collection: &str, key: &str, done: Completion<()>) {
        self.deletes
            .lock()
            .unwrap()
            .push_back((key.to_string(), done));
    }

    fn subscribe(
        &self,
        collection: &str,
        query: SnapshotQuery,
        listener: SnapshotListener,
    ) -> ListenerRegistration {
        self.queries
            .lock()
            .unwrap()
            .push((collection.to_string(), query));
        let listener_id = {
            let mut next = self.next_listener_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.listeners
            .lock()
            .unwrap()
            .insert(listener_id, Arc::from(listener));

        let listeners = Arc::clone(&self.listeners);
        ListenerRegistration::new(move || {
            listeners.lock().unwrap().remove(&listener_id);
        })
    }
}

/// Builds a document from a JSON object literal.
pub fn doc(key: &str, value: Value) -> Document {
    match value {
        Value::Object(fields) => Document::new(key, fields),
        other => panic!("document must be a JSON object, got {other}"),
    }
}
