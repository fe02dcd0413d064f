// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{UserKey, UserValue, Value};
use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// A capacity-bounded, key-ordered in-memory run
///
/// Inserting an existing key overwrites its value, so a run never
/// holds more than one entry per key.
///
/// The lowest and highest key ever written are tracked to cheaply skip
/// the run during point and range reads.
pub struct MemoryRun {
    items: SkipMap<UserKey, UserValue>,

    /// Maximum amount of distinct keys
    capacity: usize,

    min_key: AtomicI64,
    max_key: AtomicI64,
}

impl MemoryRun {
    /// Creates an empty run that holds up to `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: SkipMap::new(),
            capacity,
            min_key: AtomicI64::new(UserKey::MAX),
            max_key: AtomicI64::new(UserKey::MIN),
        }
    }

    /// Inserts an item into the run, replacing an older value of the same key.
    pub fn insert(&self, item: Value) {
        self.min_key.fetch_min(item.key, Ordering::AcqRel);
        self.max_key.fetch_max(item.key, Ordering::AcqRel);
        self.items.insert(item.key, item.value);
    }

    /// Returns the stored value (which may be a tombstone) if the key exists.
    pub fn get(&self, key: UserKey) -> Option<UserValue> {
        if !self.key_range_contains(key) {
            return None;
        }
        self.items.get(&key).map(|entry| *entry.value())
    }

    /// Materializes all entries in `[lo, hi)`, including tombstones.
    pub fn range(&self, lo: UserKey, hi: UserKey) -> Vec<Value> {
        if hi <= lo || self.is_empty() {
            return Vec::new();
        }
        if lo > self.max_key() || hi <= self.min_key() {
            return Vec::new();
        }

        self.items
            .range(lo..hi)
            .map(|entry| Value::new(*entry.key(), *entry.value()))
            .collect()
    }

    /// Iterates over every entry in key order, including tombstones.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.items
            .iter()
            .map(|entry| Value::new(*entry.key(), *entry.value()))
    }

    /// Materializes every entry in key order, including tombstones.
    pub fn entries(&self) -> Vec<Value> {
        self.iter().collect()
    }

    /// Count the amount of items in the run
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the run is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if no further keys may be added
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn min_key(&self) -> UserKey {
        self.min_key.load(Ordering::Acquire)
    }

    pub fn max_key(&self) -> UserKey {
        self.max_key.load(Ordering::Acquire)
    }

    fn key_range_contains(&self, key: UserKey) -> bool {
        key >= self.min_key() && key <= self.max_key()
    }
}
