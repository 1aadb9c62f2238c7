//! Local key/value storage consumed by the overlay.
//!
//! The overlay never looks inside values. It only needs single-key CRUD,
//! a bulk export/import pair for ownership handoff, and the two callbacks
//! that keep its key index in step with what the store holds.

pub mod memory;

use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::Arc;

pub use memory::MemoryStore;

/// Values are arbitrary JSON documents.
pub type Value = serde_json::Value;

/// Bulk handoff payload: key to JSON-encoded value.
pub type TransferPayload = HashMap<String, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Updated,
}

/// Callbacks the overlay registers with the store.
/// Invoked synchronously while the store still holds its write lock, so
/// callbacks observe changes in the order they were applied. An observer
/// must not call back into the store.
pub trait KeyObserver: Send + Sync {
    fn on_key_stored(&self, key: &str);
    fn on_key_removed(&self, key: &str);
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Value, StorageError>;

    /// Fires `on_key_stored` only when the key did not exist before.
    fn put(&self, key: &str, value: Value) -> PutOutcome;

    /// Fires `on_key_removed` when a key was deleted.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Encodes the listed keys for handoff. Keys that vanished meanwhile are skipped.
    fn export_for_transfer(&self, keys: &[String]) -> Result<TransferPayload, StorageError>;

    /// Decodes and stores a handoff payload, all or nothing. Returns the imported keys.
    /// Does not fire callbacks; the caller registers the batch itself.
    fn import_from_transfer(&self, payload: &TransferPayload) -> Result<Vec<String>, StorageError>;

    /// Drops keys that were handed to another node, without firing callbacks.
    fn evict(&self, keys: &[String]);

    fn set_observer(&self, observer: Arc<dyn KeyObserver>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
