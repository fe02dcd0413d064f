// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    file::run_file_path,
    merge::{BoxedIterator, MergeIterator},
    run::{
        writer::{Options as WriterOptions, Writer},
        DiskRun,
    },
    UserKey, UserValue, Value,
};
use std::path::PathBuf;

/// Shape of a level
#[derive(Clone, Debug)]
pub struct Options {
    /// Folder of the run files
    pub folder: PathBuf,

    /// Distance from the buffer (1-indexed)
    pub level: usize,

    /// Maximum amount of entries per run
    pub run_size: usize,

    /// Amount of run slots
    pub num_runs: usize,

    /// Amount of (oldest) runs consumed per merge into the next level
    pub merge_size: usize,

    /// Entries per fence pointer page
    pub page_size: usize,

    pub bloom_fp_rate: Option<f64>,
}

/// One tier of the disk hierarchy
///
/// Holds up to `num_runs` runs. Occupied slots are always the lowest ordinals,
/// and a higher ordinal means a more recently written run.
///
/// Free slots have no backing file; a run (and its file) is created
/// when its slot is written.
pub struct DiskLevel {
    opts: Options,

    /// Occupied slots, ordinal == position
    runs: Vec<DiskRun>,
}

impl DiskLevel {
    /// Creates an empty level.
    ///
    /// # Panics
    ///
    /// Panics if the merge size is 0 or larger than the amount of slots.
    pub fn new(opts: Options) -> Self {
        assert!(opts.num_runs > 0, "level needs at least one run slot");
        assert!(
            opts.merge_size > 0 && opts.merge_size <= opts.num_runs,
            "merge size should be in 1..=num_runs"
        );
        assert!(opts.run_size > 0, "run size should be > 0");

        Self {
            runs: Vec::with_capacity(opts.num_runs),
            opts,
        }
    }

    pub fn level(&self) -> usize {
        self.opts.level
    }

    pub fn run_size(&self) -> usize {
        self.opts.run_size
    }

    pub fn merge_size(&self) -> usize {
        self.opts.merge_size
    }

    pub fn num_runs(&self) -> usize {
        self.opts.num_runs
    }

    /// Amount of occupied slots
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn is_full(&self) -> bool {
        self.runs.len() == self.opts.num_runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Amount of entries in all runs, including tombstones
    pub fn len(&self) -> usize {
        self.runs.iter().map(DiskRun::len).sum()
    }

    fn create_writer(&self, capacity: usize) -> crate::Result<Writer> {
        let ordinal = self.runs.len();

        Writer::new(WriterOptions {
            path: run_file_path(&self.opts.folder, self.opts.level, ordinal),
            level: self.opts.level,
            ordinal,
            capacity,
            page_size: self.opts.page_size,
            bloom_fp_rate: self.opts.bloom_fp_rate,
        })
    }

    fn push_run(&mut self, run: Option<DiskRun>) {
        if let Some(run) = run {
            log::debug!("level {}: added {run:?}", self.opts.level);
            self.runs.push(run);
        } else {
            log::debug!(
                "level {}: merge produced no entries, slot stays free",
                self.opts.level
            );
        }
    }

    /// Writes a pre-sorted array into the next free slot.
    ///
    /// # Panics
    ///
    /// Panics if the level is full or the array exceeds the run size.
    pub fn add_run_from_sorted(&mut self, items: &[Value]) -> crate::Result<()> {
        assert!(!self.is_full(), "level {} is full", self.opts.level);
        assert!(
            items.len() <= self.opts.run_size,
            "run of {} items exceeds run size {}",
            items.len(),
            self.opts.run_size
        );

        if items.is_empty() {
            return Ok(());
        }

        let mut writer = self.create_writer(items.len())?;
        writer.write_sorted(items)?;
        let run = writer.finish()?;
        self.push_run(run);

        Ok(())
    }

    /// Returns the oldest `merge_size` runs, which are the next to be merged into the following level.
    ///
    /// # Panics
    ///
    /// Panics if fewer runs are occupied.
    pub fn runs_to_merge(&self) -> &[DiskRun] {
        assert!(
            self.runs.len() >= self.opts.merge_size,
            "not enough runs to merge"
        );
        let (to_merge, _) = self.runs.split_at(self.opts.merge_size);
        to_merge
    }

    /// K-way merges the given runs into the next free slot.
    ///
    /// The runs need to be ordered oldest first, see [`MergeIterator`].
    /// Tombstones are dropped if `is_last_level` is set.
    ///
    /// # Panics
    ///
    /// Panics if the level is full, or the merged runs could exceed the run size.
    pub fn add_runs(&mut self, sources: &[DiskRun], is_last_level: bool) -> crate::Result<()> {
        assert!(!self.is_full(), "level {} is full", self.opts.level);

        let capacity = sources.iter().map(DiskRun::len).sum::<usize>();
        assert!(
            capacity <= self.opts.run_size,
            "merged runs may exceed run size of level {}",
            self.opts.level
        );

        log::debug!(
            "level {}: merging {} runs ({capacity} items) into slot {}, evict tombstones: {is_last_level}",
            self.opts.level,
            sources.len(),
            self.runs.len(),
        );

        if capacity == 0 {
            return Ok(());
        }

        let iterators = sources
            .iter()
            .map(|run| Box::new(run.iter()) as BoxedIterator<'_>)
            .collect::<Vec<_>>();

        let merge_iter = MergeIterator::new(iterators).evict_tombstones(is_last_level);

        let mut writer = self.create_writer(capacity)?;
        for item in merge_iter {
            writer.write(item?)?;
        }
        let run = writer.finish()?;
        self.push_run(run);

        Ok(())
    }

    /// Deletes the oldest `merge_size` runs and moves the remaining runs down,
    /// renaming their files to match their new slots.
    pub fn free_merged_runs(&mut self) -> crate::Result<()> {
        assert!(
            self.runs.len() >= self.opts.merge_size,
            "not enough runs to free"
        );

        let freed = self.runs.drain(..self.opts.merge_size).count();
        assert_eq!(freed, self.opts.merge_size, "merge count mismatch");

        for (ordinal, run) in self.runs.iter_mut().enumerate() {
            run.set_ordinal(ordinal)?;
        }

        log::debug!(
            "level {}: freed {freed} runs, {} remain",
            self.opts.level,
            self.runs.len()
        );

        Ok(())
    }

    /// Returns the newest stored value (which may be a tombstone) of the key.
    pub fn get(&self, key: UserKey) -> crate::Result<Option<UserValue>> {
        for run in self.runs.iter().rev() {
            if !run.key_range_contains(key) {
                continue;
            }

            if let Some(value) = run.get(key)? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// Collects `[lo, hi)` per run, newest run first.
    pub fn range(&self, lo: UserKey, hi: UserKey) -> crate::Result<Vec<Vec<Value>>> {
        let mut output = Vec::new();

        for run in self.runs.iter().rev() {
            let span = run.range(lo, hi)?;
            if !span.is_empty() {
                output.push(run.entries(span)?);
            }
        }

        Ok(output)
    }

    /// Entries of every run, in slot order (oldest first).
    pub fn entries(&self) -> crate::Result<Vec<Vec<Value>>> {
        self.runs.iter().map(|run| run.entries(0..run.len())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TOMBSTONE;
    use test_log::test;

    fn opts(folder: &std::path::Path, level: usize, run_size: usize) -> Options {
        Options {
            folder: folder.to_path_buf(),
            level,
            run_size,
            num_runs: 3,
            merge_size: 2,
            page_size: 4,
            bloom_fp_rate: Some(0.01),
        }
    }

    fn sorted(keys: std::ops::Range<i64>, value: i64) -> Vec<Value> {
        keys.map(|k| Value::new(k, value)).collect()
    }

    #[test]
    fn level_fills_slots_in_order() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let mut level = DiskLevel::new(opts(folder.path(), 1, 10));

        assert!(level.is_empty());

        for i in 0..3 {
            level.add_run_from_sorted(&sorted(i * 10..i * 10 + 10, i))?;
        }

        assert!(level.is_full());
        assert_eq!(30, level.len());

        for ordinal in 0..3 {
            assert!(run_file_path(folder.path(), 1, ordinal).try_exists()?);
        }

        Ok(())
    }

    #[test]
    fn level_lookup_newest_run_first() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let mut level = DiskLevel::new(opts(folder.path(), 1, 10));

        level.add_run_from_sorted(&sorted(0..10, 1))?;
        level.add_run_from_sorted(&sorted(5..15, 2))?;

        assert_eq!(Some(1), level.get(0)?);
        assert_eq!(Some(2), level.get(5)?);
        assert_eq!(Some(2), level.get(14)?);
        assert_eq!(None, level.get(15)?);

        Ok(())
    }

    #[test]
    fn level_merge_and_free() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        let mut upper = DiskLevel::new(opts(folder.path(), 1, 10));
        let mut lower = DiskLevel::new(opts(folder.path(), 2, 20));

        upper.add_run_from_sorted(&sorted(0..10, 1))?;
        upper.add_run_from_sorted(&sorted(5..15, 2))?;
        upper.add_run_from_sorted(&sorted(100..110, 3))?;

        lower.add_runs(upper.runs_to_merge(), false)?;
        upper.free_merged_runs()?;

        assert_eq!(1, lower.active_runs());
        assert_eq!(15, lower.len());
        assert_eq!(Some(1), lower.get(4)?);
        assert_eq!(Some(2), lower.get(5)?);

        // The remaining run moved to slot 0
        assert_eq!(1, upper.active_runs());
        assert!(run_file_path(folder.path(), 1, 0).try_exists()?);
        assert!(!run_file_path(folder.path(), 1, 1).try_exists()?);
        assert!(!run_file_path(folder.path(), 1, 2).try_exists()?);
        assert_eq!(Some(3), upper.get(100)?);

        Ok(())
    }

    #[test]
    fn level_merge_drops_tombstones_on_last_level() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        let mut upper = DiskLevel::new(opts(folder.path(), 1, 10));
        let mut lower = DiskLevel::new(opts(folder.path(), 2, 20));

        upper.add_run_from_sorted(&sorted(0..4, 1))?;
        upper.add_run_from_sorted(&[Value::new_tombstone(1), Value::new_tombstone(9)])?;

        lower.add_runs(upper.runs_to_merge(), true)?;
        upper.free_merged_runs()?;

        let entries = lower.entries()?.concat();
        assert!(entries.iter().all(|v| v.value != TOMBSTONE));
        assert_eq!(
            vec![Value::new(0, 1), Value::new(2, 1), Value::new(3, 1)],
            entries
        );

        Ok(())
    }

    #[test]
    fn level_merge_of_only_tombstones_leaves_slot_free() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        let mut upper = DiskLevel::new(opts(folder.path(), 1, 10));
        let mut lower = DiskLevel::new(opts(folder.path(), 2, 20));

        upper.add_run_from_sorted(&[Value::new_tombstone(1)])?;
        upper.add_run_from_sorted(&[Value::new_tombstone(2)])?;

        lower.add_runs(upper.runs_to_merge(), true)?;
        upper.free_merged_runs()?;

        assert!(lower.is_empty());
        assert!(upper.is_empty());
        assert!(!run_file_path(folder.path(), 2, 0).try_exists()?);

        Ok(())
    }

    #[test]
    fn level_range_newest_first() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let mut level = DiskLevel::new(opts(folder.path(), 1, 10));

        level.add_run_from_sorted(&sorted(0..10, 1))?;
        level.add_run_from_sorted(&sorted(8..12, 2))?;

        let ranges = level.range(7, 9)?;
        assert_eq!(
            vec![
                vec![Value::new(8, 2)],
                vec![Value::new(7, 1), Value::new(8, 1)]
            ],
            ranges
        );

        Ok(())
    }

    #[test]
    #[should_panic(expected = "is full")]
    fn level_rejects_write_when_full() {
        let folder = tempfile::tempdir().expect("should create folder");
        let mut level = DiskLevel::new(opts(folder.path(), 1, 10));

        for i in 0..4 {
            level
                .add_run_from_sorted(&sorted(0..1, i))
                .expect("should write");
        }
    }
}
