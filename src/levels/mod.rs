// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod level;

use self::level::{DiskLevel, Options as LevelOptions};
use crate::{Config, UserKey, UserValue, Value};
use std::path::PathBuf;

/// Represents the disk levels of the tree.
///
/// Level 1 receives the runs flushed from the buffer. Whenever a level
/// is full, its oldest runs are merged into one run of the next level,
/// which in turn may need to make room first.
pub struct Levels {
    folder: PathBuf,

    page_size: usize,
    bloom_fp_rate: Option<f64>,

    /// Run slots of every level
    disk_runs_per_level: usize,

    /// Amount of runs consumed per level merge
    level_merge_count: usize,

    levels: Vec<DiskLevel>,
}

impl Levels {
    /// Creates the first disk level, sized to hold the runs evicted by one buffer flush.
    pub fn new(config: &Config) -> Self {
        let first_level = DiskLevel::new(LevelOptions {
            folder: config.runs_folder(),
            level: 1,
            run_size: config.merge_count() * config.buffer_run_capacity,
            num_runs: config.disk_runs_per_level,
            merge_size: config.level_merge_count(),
            page_size: config.page_size,
            bloom_fp_rate: config.bloom_fp_rate,
        });

        Self {
            folder: config.runs_folder(),
            page_size: config.page_size,
            bloom_fp_rate: config.bloom_fp_rate,
            disk_runs_per_level: config.disk_runs_per_level,
            level_merge_count: config.level_merge_count(),
            levels: vec![first_level],
        }
    }

    /// Amount of levels
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Amount of entries in all levels, including tombstones
    pub fn len(&self) -> usize {
        self.levels.iter().map(DiskLevel::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiskLevel> {
        self.levels.iter()
    }

    fn first_level(&mut self) -> &mut DiskLevel {
        // NOTE: Level 1 is created in the constructor and never removed
        #[allow(clippy::expect_used)]
        self.levels.first_mut().expect("first level should exist")
    }

    /// Appends a new, empty level below the deepest one.
    ///
    /// Its runs are large enough to hold one merge of the level above.
    fn allocate_level(&mut self) {
        // NOTE: Level 1 is created in the constructor and never removed
        #[allow(clippy::expect_used)]
        let deepest = self.levels.last().expect("first level should exist");

        let opts = LevelOptions {
            folder: self.folder.clone(),
            level: deepest.level() + 1,
            run_size: deepest.run_size() * deepest.merge_size(),
            num_runs: self.disk_runs_per_level,
            merge_size: self.level_merge_count,
            page_size: self.page_size,
            bloom_fp_rate: self.bloom_fp_rate,
        };

        log::debug!(
            "Allocating disk level {} with {} runs of {} entries",
            opts.level,
            opts.num_runs,
            opts.run_size
        );

        self.levels.push(DiskLevel::new(opts));
    }

    /// Writes a sorted, deduplicated array (one buffer flush) as a new level 1 run,
    /// cascading merges down the hierarchy first if level 1 is full.
    pub fn flush(&mut self, items: &[Value]) -> crate::Result<()> {
        if self.first_level().is_full() {
            self.make_room(1)?;
        }

        self.first_level().add_run_from_sorted(items)
    }

    /// Frees slots in the level at position `idx` by merging the oldest runs of the
    /// level above into it, making room in it first if needed.
    ///
    /// Walks down to the first level that has a free slot (or allocates a new one),
    /// then merges upwards level by level.
    fn make_room(&mut self, idx: usize) -> crate::Result<()> {
        let mut deepest = idx;

        loop {
            match self.levels.get(deepest) {
                None => {
                    self.allocate_level();
                    break;
                }
                Some(level) if level.is_full() => deepest += 1,
                Some(_) => break,
            }
        }

        log::debug!("Cascading merges from level {} to level {}", idx, deepest + 1);

        for target in (idx..=deepest).rev() {
            self.merge_into(target)?;
        }

        Ok(())
    }

    /// Merges the oldest runs of the level at `target - 1` into the level at `target`.
    fn merge_into(&mut self, target: usize) -> crate::Result<()> {
        assert!(target > 0, "nothing to merge into level 1");

        // Tombstones can only be dropped if there is nothing older they could shadow
        let is_last_level = target == self.levels.len() - 1
            && self.levels.get(target).is_some_and(DiskLevel::is_empty);

        let (upper, lower) = self.levels.split_at_mut(target);

        // NOTE: 0 < target < levels.len(), so both halves are non-empty
        #[allow(clippy::expect_used)]
        let source = upper.last_mut().expect("source level should exist");

        #[allow(clippy::expect_used)]
        let destination = lower.first_mut().expect("destination level should exist");

        destination.add_runs(source.runs_to_merge(), is_last_level)?;
        source.free_merged_runs()?;

        Ok(())
    }

    /// Returns the newest stored value (which may be a tombstone) of the key.
    ///
    /// Levels are searched top-down, runs newest first.
    pub fn get(&self, key: UserKey) -> crate::Result<Option<UserValue>> {
        for level in &self.levels {
            if let Some(value) = level.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Collects `[lo, hi)` per run, newest run first.
    pub fn range(&self, lo: UserKey, hi: UserKey) -> crate::Result<Vec<Vec<Value>>> {
        let mut output = Vec::new();
        for level in &self.levels {
            output.extend(level.range(lo, hi)?);
        }
        Ok(output)
    }
}
