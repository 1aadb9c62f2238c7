use crate::chord::types::{Identifier, Ring};
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Included, Unbounded};

/// Ordered index of the keys held in the local store, keyed by their ring identifier.
///
/// Used to answer "which keys must I hand off" when ownership boundaries move.
/// Several keys may share an identifier, so each slot holds a set of keys.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    slots: BTreeMap<Identifier, BTreeSet<String>>,
    len: usize,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, key: &str, hash: Identifier) -> bool {
        self.slots.get(&hash).is_some_and(|keys| keys.contains(key))
    }

    /// Registers a key. Returns false (and logs) if the pair was already present.
    pub fn insert(&mut self, key: &str, hash: Identifier) -> bool {
        let inserted = self.slots.entry(hash).or_default().insert(key.to_string());
        if inserted {
            self.len += 1;
        } else {
            warn!(
                "Tried to insert duplicate key {} ({}) into the key index",
                key, hash
            );
        }
        inserted
    }

    /// Removes a key. Absent keys are a no-op returning false.
    pub fn delete(&mut self, key: &str, hash: Identifier) -> bool {
        let Some(keys) = self.slots.get_mut(&hash) else {
            return false;
        };
        if !keys.remove(key) {
            return false;
        }
        if keys.is_empty() {
            self.slots.remove(&hash);
        }
        self.len -= 1;
        true
    }

    /// Hashes and inserts a batch of keys, returning how many were new.
    pub fn bulk_insert<I, F>(&mut self, keys: I, hash_fn: F) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: Fn(&str) -> Identifier,
    {
        let mut batch: Vec<(Identifier, String)> = keys
            .into_iter()
            .map(|k| (hash_fn(k.as_ref()), k.as_ref().to_string()))
            .collect();
        batch.sort_unstable();

        let mut added = 0;
        for (hash, key) in batch {
            if self.insert(&key, hash) {
                added += 1;
            }
        }
        added
    }

    /// Keys whose identifier lies in (start, end] on the ring.
    ///
    /// A wrapped range is scanned as "greater than start" followed by "at most end".
    /// `start == end` selects only the keys hashed exactly to `end`.
    pub fn keys_in_range(&self, start: Identifier, end: Identifier) -> Vec<String> {
        if start < end {
            self.collect(self.slots.range((Excluded(start), Included(end))))
        } else if start > end {
            let mut keys = self.keys_greater_than(start);
            keys.extend(self.keys_at_most(end));
            keys
        } else {
            self.slots
                .get(&end)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default()
        }
    }

    /// Keys that move to `new_hash` when it joins between `pred_hash` and `self_hash`.
    ///
    /// An unknown predecessor is passed as `pred_hash == self_hash`, meaning this node
    /// currently owns the whole ring. Returns nothing if the new node is not strictly
    /// inside (pred, self), since it then takes none of this node's range.
    pub fn keys_to_transfer(
        &self,
        ring: &Ring,
        pred_hash: Identifier,
        new_hash: Identifier,
        self_hash: Identifier,
    ) -> Vec<String> {
        if !ring.is_strictly_between(new_hash, pred_hash, self_hash) {
            return Vec::new();
        }

        if pred_hash < new_hash {
            self.keys_in_range(pred_hash, new_hash)
        } else {
            // (pred, new] wraps past zero
            let mut keys = self.keys_greater_than(pred_hash);
            keys.extend(self.keys_at_most(new_hash));
            keys
        }
    }

    pub fn all_keys(&self) -> Vec<String> {
        self.collect(self.slots.iter())
    }

    fn keys_greater_than(&self, lower: Identifier) -> Vec<String> {
        self.collect(self.slots.range((Excluded(lower), Unbounded)))
    }

    fn keys_at_most(&self, upper: Identifier) -> Vec<String> {
        self.collect(self.slots.range(..=upper))
    }

    fn collect<'a>(
        &'a self,
        slots: impl Iterator<Item = (&'a Identifier, &'a BTreeSet<String>)>,
    ) -> Vec<String> {
        slots.flat_map(|(_, keys)| keys.iter().cloned()).collect()
    }
}
