//! Repository layer: the single access point for note CRUD.
//!
//! # Responsibility
//! - Bridge front-end intents to `DocumentStore` persistence.
//! - Own the in-process note cache and its reconciliation policy.
//!
//! # Invariants
//! - Store outcomes reach callers only through completion callbacks.
//! - There are no retries, timeouts or backoff at this layer.

pub mod note_repo;
