use crate::error::StorageError;
use crate::storage::{KeyObserver, KeyValueStore, PutOutcome, TransferPayload, Value};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// In-memory store. Values live in a map behind one reader/writer lock.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
    observer: RwLock<Option<Arc<dyn KeyObserver>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn observer(&self) -> Option<Arc<dyn KeyObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Value, StorageError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let value = entries.get(key).cloned().ok_or(StorageError::KeyNotFound)?;
        debug!("GET key: {}, value: {}", key, value);
        Ok(value)
    }

    fn put(&self, key: &str, value: Value) -> PutOutcome {
        info!("PUT key: {}, value: {}", key, value);
        let observer = self.observer();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.insert(key.to_string(), value).is_some() {
            return PutOutcome::Updated;
        }
        // Notify under the write guard so a racing delete cannot reorder the callbacks
        if let Some(observer) = observer {
            observer.on_key_stored(key);
        }
        PutOutcome::Created
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let observer = self.observer();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let value = entries.remove(key).ok_or(StorageError::KeyNotFound)?;
        info!("DEL key: {}, value: {}", key, value);
        if let Some(observer) = observer {
            observer.on_key_removed(key);
        }
        Ok(())
    }

    fn export_for_transfer(&self, keys: &[String]) -> Result<TransferPayload, StorageError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut payload = TransferPayload::with_capacity(keys.len());

        for key in keys {
            let Some(value) = entries.get(key) else {
                continue;
            };
            let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Encode {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            payload.insert(key.clone(), bytes);
        }

        Ok(payload)
    }

    fn import_from_transfer(&self, payload: &TransferPayload) -> Result<Vec<String>, StorageError> {
        // Decode everything before touching the map so a bad entry leaves no trace
        let decoded = payload
            .iter()
            .map(|(key, bytes)| {
                serde_json::from_slice::<Value>(bytes)
                    .map(|value| (key.clone(), value))
                    .map_err(|e| StorageError::Decode {
                        key: key.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut keys = Vec::with_capacity(decoded.len());
        for (key, value) in decoded {
            entries.insert(key.clone(), value);
            keys.push(key);
        }
        Ok(keys)
    }

    fn evict(&self, keys: &[String]) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(key);
        }
    }

    fn set_observer(&self, observer: Arc<dyn KeyObserver>) {
        let mut slot = self.observer.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Replacing an already registered key observer");
        }
        *slot = Some(observer);
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Barrier, Mutex};
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl KeyObserver for Recorder {
        fn on_key_stored(&self, key: &str) {
            self.events.lock().unwrap().push(format!("+{}", key));
        }
        fn on_key_removed(&self, key: &str) {
            self.events.lock().unwrap().push(format!("-{}", key));
        }
    }

    #[test]
    fn test_callbacks_fire_on_create_and_delete_only() {
        let store = MemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        store.set_observer(recorder.clone());

        assert_eq!(store.put("foo", json!({"Val": 1})), PutOutcome::Created);
        assert_eq!(store.put("foo", json!({"Val": 2})), PutOutcome::Updated);
        assert_eq!(store.get("foo").unwrap(), json!({"Val": 2}));
        store.delete("foo").unwrap();
        assert_eq!(store.delete("foo"), Err(StorageError::KeyNotFound));
        assert_eq!(store.get("foo"), Err(StorageError::KeyNotFound));

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["+foo".to_string(), "-foo".to_string()]);
    }

    #[test]
    fn test_export_import_between_stores() {
        let source = MemoryStore::new();
        source.put("a", json!("alpha"));
        source.put("b", json!([1, 2, 3]));

        let payload = source
            .export_for_transfer(&["a".into(), "b".into(), "gone".into()])
            .unwrap();
        assert_eq!(payload.len(), 2);

        let target = MemoryStore::new();
        let mut imported = target.import_from_transfer(&payload).unwrap();
        imported.sort();
        assert_eq!(imported, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(target.get("b").unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_malformed_import_changes_nothing() {
        let store = MemoryStore::new();
        store.put("keep", json!(true));

        let mut payload = TransferPayload::new();
        payload.insert("good".into(), b"42".to_vec());
        payload.insert("bad".into(), b"{not json".to_vec());

        let err = store.import_from_transfer(&payload).unwrap_err();
        assert!(matches!(err, StorageError::Decode { ref key, .. } if key == "bad"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("good"), Err(StorageError::KeyNotFound));
    }

    #[test]
    fn test_callbacks_follow_store_order_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        store.set_observer(recorder.clone());

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            store.put("k", json!(i));
                        } else {
                            let _ = store.delete("k");
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Creates and removes must alternate, ending on whatever the store holds
        let events = recorder.events.lock().unwrap().clone();
        for pair in events.windows(2) {
            assert_ne!(pair[0], pair[1], "callbacks out of order: {:?}", pair);
        }
        let last_stored = events.last().map(|e| e == "+k").unwrap_or(false);
        assert_eq!(store.get("k").is_ok(), last_stored);
    }

    #[test]
    fn test_evict_skips_callbacks() {
        let store = MemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        store.put("x", json!(1));
        store.set_observer(recorder.clone());

        store.evict(&["x".to_string()]);
        assert!(store.is_empty());
        assert!(recorder.events.lock().unwrap().is_empty());
    }
}
