//! Note repository: in-process cache plus CRUD mediation over a
//! `DocumentStore`.
//!
//! # Responsibility
//! - Allocate note ids and stamp write times.
//! - Mirror notes into a process-lifetime cache and keep it reconciled with
//!   store outcomes.
//! - Expose one-shot and live reads to front ends through callbacks.
//!
//! # Invariants
//! - Id allocation and the optimistic insert happen under one cache lock.
//!   A new id exceeds every id this repository has cached or handed out,
//!   even after a live snapshot or delete dropped those notes, so an add
//!   never overwrites an existing document.
//! - An optimistic insert stays `Pending` until its write completes; a failed
//!   write removes it again.
//! - Update and delete touch the cache only after the store confirms.
//! - A live snapshot replaces the whole cache, newest `timestamp` first.
//! - No callback runs while the cache lock is held.

use crate::model::codec::{
    note_to_fields, parse_note_lenient, parse_note_strict, FIELD_IMPORTANCE, FIELD_TIMESTAMP,
};
use crate::model::note::{document_key, now_millis, Importance, Note, NoteId};
use crate::model::samples::sample_notes;
use crate::store::{DocumentStore, ListenerRegistration, SnapshotQuery, StoreError};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Collection holding note documents.
pub const NOTES_COLLECTION: &str = "notes";

/// Composition-root settings for a repository instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Store collection holding note documents.
    pub collection: String,
    /// Importance level the live subscription is filtered to.
    pub live_importance: Importance,
    /// Field the store orders live snapshots by (ascending).
    pub live_order_field: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            collection: NOTES_COLLECTION.to_string(),
            live_importance: Importance::Urgent,
            live_order_field: FIELD_TIMESTAMP.to_string(),
        }
    }
}

/// Reconciliation state of one cached note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Inserted locally; the store write has not completed yet.
    Pending,
    /// Matches a confirmed store write or a pushed/fetched document.
    Confirmed,
    /// Demonstration data that was never written to the store.
    LocalOnly,
}

/// Cache entry: one note plus its reconciliation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedNote {
    pub note: Note,
    pub state: SyncState,
}

struct RepoState {
    cache: Mutex<Vec<CachedNote>>,
    /// Highest id ever cached or allocated.
    highest_id: AtomicI64,
    live_subscriptions: AtomicUsize,
}

impl RepoState {
    fn lock_cache(&self) -> MutexGuard<'_, Vec<CachedNote>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe_ids<'a>(&self, notes: impl IntoIterator<Item = &'a Note>) {
        if let Some(max) = notes.into_iter().map(|note| note.id).max() {
            self.highest_id.fetch_max(max, Ordering::SeqCst);
        }
    }

    /// Picks the next id; the caller holds the cache lock.
    fn allocate_id(&self, cache: &[CachedNote]) -> NoteId {
        let after_high_water = self
            .highest_id
            .load(Ordering::SeqCst)
            .saturating_add(1)
            .max(1);
        let note_id = next_note_id(cache).max(after_high_water);
        self.highest_id.fetch_max(note_id, Ordering::SeqCst);
        note_id
    }

    fn snapshot(&self) -> Vec<Note> {
        collect_notes(&self.lock_cache())
    }

    fn mark_confirmed(&self, note_id: NoteId) {
        for entry in self
            .lock_cache()
            .iter_mut()
            .filter(|entry| entry.note.id == note_id && entry.state == SyncState::Pending)
        {
            entry.state = SyncState::Confirmed;
        }
    }

    fn discard_pending(&self, note_id: NoteId) -> usize {
        let mut cache = self.lock_cache();
        let before = cache.len();
        cache.retain(|entry| !(entry.note.id == note_id && entry.state == SyncState::Pending));
        before - cache.len()
    }

    fn remove(&self, note_id: NoteId) -> usize {
        let mut cache = self.lock_cache();
        let before = cache.len();
        cache.retain(|entry| entry.note.id != note_id);
        before - cache.len()
    }

    fn upsert_confirmed(&self, note: Note) {
        let mut cache = self.lock_cache();
        let note_id = note.id;
        self.observe_ids([&note]);
        match cache.iter().position(|entry| entry.note.id == note_id) {
            Some(index) => {
                cache[index] = CachedNote {
                    note,
                    state: SyncState::Confirmed,
                };
                let mut seen = false;
                cache.retain(|entry| {
                    if entry.note.id != note_id {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => cache.push(CachedNote {
                note,
                state: SyncState::Confirmed,
            }),
        }
    }

    fn replace_confirmed(&self, fetched: Vec<Note>) -> Vec<Note> {
        let fetched_ids: BTreeSet<NoteId> = fetched.iter().map(|note| note.id).collect();
        let mut cache = self.lock_cache();
        self.observe_ids(&fetched);
        let pending: Vec<CachedNote> = cache
            .drain(..)
            .filter(|entry| {
                entry.state == SyncState::Pending && !fetched_ids.contains(&entry.note.id)
            })
            .collect();
        cache.extend(fetched.into_iter().map(|note| CachedNote {
            note,
            state: SyncState::Confirmed,
        }));
        cache.extend(pending);
        collect_notes(&cache)
    }

    fn replace_all(&self, notes: &[Note]) {
        let mut cache = self.lock_cache();
        self.observe_ids(notes);
        cache.clear();
        cache.extend(notes.iter().cloned().map(|note| CachedNote {
            note,
            state: SyncState::Confirmed,
        }));
    }
}

/// Shared handle to one note cache and its backing store.
///
/// Clones share the same cache; create one per composition root and pass
/// it to every consumer.
#[derive(Clone)]
pub struct NoteRepository {
    store: Arc<dyn DocumentStore>,
    options: Arc<RepositoryOptions>,
    state: Arc<RepoState>,
}

impl NoteRepository {
    /// Creates a repository over `store` with default options.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_options(store, RepositoryOptions::default())
    }

    pub fn with_options(store: Arc<dyn DocumentStore>, options: RepositoryOptions) -> Self {
        Self {
            store,
            options: Arc::new(options),
            state: Arc::new(RepoState {
                cache: Mutex::new(Vec::new()),
                highest_id: AtomicI64::new(0),
                live_subscriptions: AtomicUsize::new(0),
            }),
        }
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Creates a note, caches it immediately and writes it to the store.
    ///
    /// Returns the allocated id. The write outcome is only logged; a failed
    /// write drops the optimistic cache entry again.
    pub fn add_note(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        importance: Importance,
    ) -> NoteId {
        let note = {
            let mut cache = self.state.lock_cache();
            let note = Note::new(self.state.allocate_id(&cache), title, content, importance);
            cache.push(CachedNote {
                note: note.clone(),
                state: SyncState::Pending,
            });
            note
        };
        let note_id = note.id;
        debug!("event=note_add module=repo status=start note_id={note_id}");

        let state = Arc::clone(&self.state);
        self.store.put(
            &self.options.collection,
            &note.document_key(),
            note_to_fields(&note),
            Box::new(move |result| match result {
                Ok(()) => {
                    state.mark_confirmed(note_id);
                    info!("event=note_add module=repo status=ok note_id={note_id}");
                }
                Err(err) => {
                    let dropped = state.discard_pending(note_id);
                    error!(
                        "event=note_add module=repo status=error note_id={note_id} rolled_back={dropped} error={err}"
                    );
                }
            }),
        );
        note_id
    }

    /// Reads every stored note once.
    ///
    /// Documents that fail strict parsing are skipped. Confirmed cache
    /// contents are replaced by the fetched set; pending local inserts that
    /// were not fetched are kept. `on_success` receives the resulting cache.
    pub fn fetch_notes(
        &self,
        on_success: impl FnOnce(Vec<Note>) + Send + 'static,
        on_failure: impl FnOnce(StoreError) + Send + 'static,
    ) {
        debug!("event=notes_fetch module=repo status=start");
        let state = Arc::clone(&self.state);
        self.store.get_all(
            &self.options.collection,
            Box::new(move |result| match result {
                Ok(documents) => {
                    let total = documents.len();
                    let parsed: Vec<Note> = documents
                        .iter()
                        .filter_map(|document| match parse_note_strict(document) {
                            Ok(note) => Some(note),
                            Err(err) => {
                                warn!(
                                    "event=note_parse module=repo status=error mode=strict key={} error={err}",
                                    document.key
                                );
                                None
                            }
                        })
                        .collect();
                    let skipped = total - parsed.len();
                    let notes = state.replace_confirmed(parsed);
                    info!(
                        "event=notes_fetch module=repo status=ok documents={total} skipped={skipped} cached={}",
                        notes.len()
                    );
                    on_success(notes);
                }
                Err(err) => {
                    error!("event=notes_fetch module=repo status=error error={err}");
                    on_failure(err);
                }
            }),
        );
    }

    /// Opens the live subscription over notes at the configured importance.
    ///
    /// Every pushed snapshot replaces the whole cache, sorted newest first,
    /// and is then handed to `on_update`. Subscription errors go to
    /// `on_failure` and leave the cache untouched. The subscription stays
    /// open until the returned handle is cancelled or dropped.
    pub fn fetch_notes_realtime(
        &self,
        on_update: impl Fn(Vec<Note>) + Send + Sync + 'static,
        on_failure: impl Fn(StoreError) + Send + Sync + 'static,
    ) -> LiveSubscription {
        let active = self.state.live_subscriptions.fetch_add(1, Ordering::SeqCst);
        if active > 0 {
            warn!(
                "event=notes_live module=repo status=warn active_subscriptions={} reason=duplicate_subscription",
                active + 1
            );
        }

        let query = SnapshotQuery::default()
            .where_equal(FIELD_IMPORTANCE, self.options.live_importance.as_str())
            .order_by(self.options.live_order_field.as_str());
        let state = Arc::clone(&self.state);
        let registration = self.store.subscribe(
            &self.options.collection,
            query,
            Box::new(move |result| match result {
                Ok(snapshot) => {
                    let now = now_millis();
                    let mut notes: Vec<Note> = snapshot
                        .documents
                        .iter()
                        .map(|document| parse_note_lenient(document, now))
                        .collect();
                    notes.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
                    state.replace_all(&notes);
                    debug!(
                        "event=notes_live module=repo status=ok notes={}",
                        notes.len()
                    );
                    on_update(notes);
                }
                Err(err) => {
                    warn!("event=notes_live module=repo status=error error={err}");
                    on_failure(err);
                }
            }),
        );

        LiveSubscription {
            registration: Some(registration),
            state: Arc::clone(&self.state),
        }
    }

    /// Deletes a note from the store, then from the cache.
    pub fn delete_note(
        &self,
        note_id: NoteId,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(StoreError) + Send + 'static,
    ) {
        debug!("event=note_delete module=repo status=start note_id={note_id}");
        let state = Arc::clone(&self.state);
        self.store.delete(
            &self.options.collection,
            &document_key(note_id),
            Box::new(move |result| match result {
                Ok(()) => {
                    let removed = state.remove(note_id);
                    info!(
                        "event=note_delete module=repo status=ok note_id={note_id} removed={removed}"
                    );
                    on_success();
                }
                Err(err) => {
                    error!("event=note_delete module=repo status=error note_id={note_id} error={err}");
                    on_failure(err);
                }
            }),
        );
    }

    /// Replaces a note in full, restamping its timestamp.
    ///
    /// After the store confirms, the cache holds exactly one entry with
    /// `note_id` carrying the new fields.
    pub fn update_note(
        &self,
        note_id: NoteId,
        title: impl Into<String>,
        content: impl Into<String>,
        importance: Importance,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(StoreError) + Send + 'static,
    ) {
        self.put_note(
            Note::new(note_id, title, content, importance),
            on_success,
            on_failure,
        );
    }

    /// Writes `note` exactly as given, timestamp included.
    ///
    /// Same cache outcome as [`NoteRepository::update_note`]; used to import
    /// notes whose timestamps must survive, such as the demonstration set.
    pub fn put_note(
        &self,
        note: Note,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(StoreError) + Send + 'static,
    ) {
        let note_id = note.id;
        debug!("event=note_put module=repo status=start note_id={note_id}");
        let state = Arc::clone(&self.state);
        let fields = note_to_fields(&note);
        self.store.put(
            &self.options.collection,
            &note.document_key(),
            fields,
            Box::new(move |result| match result {
                Ok(()) => {
                    state.upsert_confirmed(note);
                    info!("event=note_put module=repo status=ok note_id={note_id}");
                    on_success();
                }
                Err(err) => {
                    error!("event=note_put module=repo status=error note_id={note_id} error={err}");
                    on_failure(err);
                }
            }),
        );
    }

    /// Current cache contents in cache order. Never touches the store.
    pub fn get_all_notes(&self) -> Vec<Note> {
        self.state.snapshot()
    }

    /// Current cache entries with their reconciliation state.
    pub fn cached_entries(&self) -> Vec<CachedNote> {
        self.state.lock_cache().clone()
    }

    /// Reconciliation state of the first cache entry with `note_id`.
    pub fn sync_state(&self, note_id: NoteId) -> Option<SyncState> {
        self.state
            .lock_cache()
            .iter()
            .find(|entry| entry.note.id == note_id)
            .map(|entry| entry.state)
    }

    /// Seeds the cache with demonstration notes when it is empty.
    ///
    /// Returns whether seeding happened. Seeded notes are not written to
    /// the store.
    pub fn initialize_notes(&self) -> bool {
        let mut cache = self.state.lock_cache();
        if !cache.is_empty() {
            return false;
        }
        let samples = sample_notes();
        self.state.observe_ids(&samples);
        cache.extend(samples.into_iter().map(|note| CachedNote {
            note,
            state: SyncState::LocalOnly,
        }));
        info!(
            "event=notes_seed module=repo status=ok notes={}",
            cache.len()
        );
        true
    }
}

/// Handle keeping a live note subscription open.
///
/// Dropping the handle cancels the subscription.
pub struct LiveSubscription {
    registration: Option<ListenerRegistration>,
    state: Arc<RepoState>,
}

impl LiveSubscription {
    /// Stops receiving snapshots.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.remove();
            self.state.live_subscriptions.fetch_sub(1, Ordering::SeqCst);
            debug!("event=notes_live module=repo status=cancelled");
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

fn next_note_id(cache: &[CachedNote]) -> NoteId {
    cache
        .iter()
        .map(|entry| entry.note.id)
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

fn collect_notes(cache: &[CachedNote]) -> Vec<Note> {
    cache.iter().map(|entry| entry.note.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::{next_note_id, CachedNote, SyncState};
    use crate::model::note::{Importance, Note};

    fn entry(id: i64) -> CachedNote {
        CachedNote {
            note: Note::new(id, "t", "c", Importance::Low),
            state: SyncState::Confirmed,
        }
    }

    #[test]
    fn next_id_starts_at_one_and_follows_max() {
        assert_eq!(next_note_id(&[]), 1);
        assert_eq!(next_note_id(&[entry(3), entry(9), entry(4)]), 10);
    }
}
