// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{memtable::MemoryRun, UserKey, UserValue, Value};
use std::sync::Arc;

/// The in-memory component (C0) of the tree
///
/// An ordered sequence of [`MemoryRun`] slots, of which exactly one accepts inserts.
/// When the active run fills up, the next slot becomes active. When all slots are
/// exhausted, the oldest `merge_count` slots are evicted to be compacted to disk,
/// and fresh slots are appended.
///
/// Slot order is recency order: a higher slot index holds newer writes.
pub struct Buffer {
    runs: Vec<Arc<MemoryRun>>,

    /// Index of the slot that accepts inserts
    active_run: usize,

    run_capacity: usize,
    run_count: usize,
    merge_count: usize,
}

impl Buffer {
    /// Creates a buffer of `run_count` empty slots.
    ///
    /// # Panics
    ///
    /// Panics if `merge_count` is 0 or larger than `run_count`.
    pub fn new(run_capacity: usize, run_count: usize, merge_count: usize) -> Self {
        assert!(run_count > 0, "buffer needs at least one run");
        assert!(
            merge_count > 0 && merge_count <= run_count,
            "merge count should be in 1..=run_count"
        );

        Self {
            runs: (0..run_count)
                .map(|_| Arc::new(MemoryRun::new(run_capacity)))
                .collect(),
            active_run: 0,
            run_capacity,
            run_count,
            merge_count,
        }
    }

    fn active(&self) -> &MemoryRun {
        // NOTE: active_run < run_count == runs.len() after every rotation
        #[allow(clippy::expect_used)]
        self.runs.get(self.active_run).expect("active run should exist")
    }

    /// Makes sure the active run has room for another key.
    ///
    /// Advances the active slot if the current one is full. If that exhausts
    /// all slots, the oldest `merge_count` runs are evicted and returned so the
    /// caller can hand them to a compaction, *before* the next key is written.
    pub fn rotate(&mut self) -> Option<Vec<Arc<MemoryRun>>> {
        if self.active().is_full() {
            self.active_run += 1;
            log::trace!("buffer: rotated to run {}", self.active_run);
        }

        if self.active_run >= self.run_count {
            return Some(self.evict());
        }

        None
    }

    fn evict(&mut self) -> Vec<Arc<MemoryRun>> {
        let evicted = self.runs.drain(..self.merge_count).collect::<Vec<_>>();
        assert_eq!(evicted.len(), self.merge_count, "eviction count mismatch");

        self.active_run -= self.merge_count;

        while self.runs.len() < self.run_count {
            self.runs.push(Arc::new(MemoryRun::new(self.run_capacity)));
        }

        log::debug!(
            "buffer: evicted {} runs, active run is now {}",
            evicted.len(),
            self.active_run
        );

        evicted
    }

    /// Writes into the active run.
    ///
    /// [`Buffer::rotate`] needs to be called first.
    pub fn insert(&self, item: Value) {
        self.active().insert(item);
    }

    /// Runs that may hold data, newest first
    fn live_runs(&self) -> impl Iterator<Item = &Arc<MemoryRun>> {
        self.runs.iter().take(self.active_run + 1).rev()
    }

    /// Returns the newest stored value for the key (which may be a tombstone).
    pub fn get(&self, key: UserKey) -> Option<UserValue> {
        self.live_runs().find_map(|run| run.get(key))
    }

    /// Collects `[lo, hi)` per run, newest run first.
    pub fn range(&self, lo: UserKey, hi: UserKey) -> Vec<Vec<Value>> {
        self.live_runs()
            .map(|run| run.range(lo, hi))
            .filter(|items| !items.is_empty())
            .collect()
    }

    /// Entries of every live run, in slot order (oldest first).
    pub fn entries(&self) -> Vec<Vec<Value>> {
        self.runs
            .iter()
            .take(self.active_run + 1)
            .map(|run| run.entries())
            .collect()
    }

    /// Amount of items in the buffer, including tombstones
    pub fn len(&self) -> usize {
        self.live_runs().map(|run| run.len()).sum()
    }

    pub fn active_run(&self) -> usize {
        self.active_run
    }
}
