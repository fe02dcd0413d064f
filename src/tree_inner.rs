// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    buffer::Buffer, compaction::CompactionHandle, levels::Levels, poison_dart::PoisonSignal,
    stats::CompactionCounters, Config, UserKey, UserValue,
};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, RwLock};
use xxhash_rust::xxh3::Xxh3Builder;

/// Live key-value mapping, kept next to the tree to serve snapshots
pub type SideLog = DashMap<UserKey, UserValue, Xxh3Builder>;

pub struct TreeInner {
    /// Tree configuration
    pub(crate) config: Config,

    /// In-memory component (C0)
    pub(crate) buffer: RwLock<Buffer>,

    /// Disk levels, locking them is the merge lock
    pub(crate) levels: Arc<Mutex<Levels>>,

    /// In-flight compaction, if any
    pub(crate) compaction: Mutex<Option<CompactionHandle>>,

    pub(crate) counters: Arc<CompactionCounters>,

    /// Set if a compaction failed, after which the tree refuses all operations
    pub(crate) poison: PoisonSignal,

    /// Live mapping, tombstoned keys are removed
    pub(crate) side_log: SideLog,
}

impl Drop for TreeInner {
    fn drop(&mut self) {
        log::debug!("Dropping TreeInner");

        let handle = match self.compaction.get_mut() {
            Ok(handle) => handle.take(),
            Err(e) => e.into_inner().take(),
        };

        if let Some(handle) = handle {
            log::debug!("Waiting for in-flight compaction");

            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Compaction failed during shutdown: {e:?}"),
                Err(_) => log::error!("Compaction panicked during shutdown"),
            }
        }
    }
}
