// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    levels::Levels,
    memtable::MemoryRun,
    merge::{BoxedIterator, MergeIterator},
    poison_dart::{PoisonDart, PoisonSignal},
    stats::CompactionCounters,
    Value,
};
use std::{
    sync::{atomic::Ordering, Arc, Mutex},
    thread::JoinHandle,
    time::Instant,
};

/// Handle of an in-flight compaction
pub type CompactionHandle = JoinHandle<crate::Result<()>>;

/// Compaction options
#[derive(Clone)]
pub struct Options {
    /// Disk levels, the mutex doubles as the merge lock
    pub levels: Arc<Mutex<Levels>>,

    pub counters: Arc<CompactionCounters>,

    /// Set if a compaction fails
    pub poison: PoisonSignal,
}

/// Merges runs evicted from the buffer into one sorted array.
///
/// The runs need to be ordered oldest first. Of duplicate keys, only the newest
/// entry survives. Tombstones are kept, as older versions may still live on disk.
pub fn merge_buffer_runs(runs: &[Arc<MemoryRun>]) -> crate::Result<Vec<Value>> {
    let capacity = runs.iter().map(|run| run.len()).sum();

    let iterators = runs
        .iter()
        .map(|run| Box::new(run.iter().map(Ok)) as BoxedIterator<'_>)
        .collect::<Vec<_>>();

    let mut items = Vec::with_capacity(capacity);
    for item in MergeIterator::new(iterators) {
        items.push(item?);
    }

    Ok(items)
}

/// Flushes evicted buffer runs into level 1, cascading merges through the levels if needed.
///
/// This will block until the merge lock is acquired and all merges are done.
pub fn do_compaction(opts: &Options, runs: &[Arc<MemoryRun>]) -> crate::Result<()> {
    let start = Instant::now();

    let items = merge_buffer_runs(runs)?;

    log::debug!(
        "compactor: merged {} buffer runs into {} items",
        runs.len(),
        items.len()
    );

    log::trace!("compactor: acquiring merge lock");

    #[allow(clippy::expect_used)]
    let mut levels = opts.levels.lock().expect("lock is poisoned");

    let depth_before = levels.depth();
    levels.flush(&items)?;
    let depth_after = levels.depth();

    drop(levels);

    opts.counters
        .levels_allocated
        .fetch_add(depth_after - depth_before, Ordering::Relaxed);

    opts.counters
        .compactions_completed
        .fetch_add(1, Ordering::Relaxed);

    #[allow(clippy::cast_possible_truncation)]
    opts.counters
        .time_compacting_us
        .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);

    log::debug!("compactor: done in {:?}", start.elapsed());

    Ok(())
}

/// Runs the compaction on a background thread.
///
/// The evicted runs are moved into the thread, so the live buffer is never touched.
pub fn spawn(opts: Options, runs: Vec<Arc<MemoryRun>>) -> crate::Result<CompactionHandle> {
    let handle = std::thread::Builder::new()
        .name("compaction".into())
        .spawn(move || {
            let dart = PoisonDart::new("compaction", opts.poison.clone());

            let result = do_compaction(&opts, &runs);

            if let Err(e) = &result {
                log::error!("Compaction failed: {e:?}");
                dart.poison();
            }

            result
        })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, TOMBSTONE};
    use test_log::test;

    fn memory_run(items: &[(i64, i64)]) -> Arc<MemoryRun> {
        let run = MemoryRun::new(items.len());
        for &item in items {
            run.insert(item.into());
        }
        Arc::new(run)
    }

    #[test]
    fn compaction_merge_buffer_runs_dedups() -> crate::Result<()> {
        let runs = vec![
            memory_run(&[(1, 10), (7, 1), (9, 90)]),
            memory_run(&[(2, 20), (7, 2)]),
            memory_run(&[(9, TOMBSTONE)]),
        ];

        let items = merge_buffer_runs(&runs)?;

        assert_eq!(
            vec![
                Value::new(1, 10),
                Value::new(2, 20),
                Value::new(7, 2),
                Value::new_tombstone(9),
            ],
            items
        );

        Ok(())
    }

    #[test]
    fn compaction_background_flush() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let config = Config::new(folder.path())
            .buffer_run_capacity(2)
            .buffer_run_count(2);
        std::fs::create_dir_all(config.runs_folder())?;

        let opts = Options {
            levels: Arc::new(Mutex::new(Levels::new(&config))),
            counters: Arc::default(),
            poison: PoisonSignal::default(),
        };

        let runs = vec![memory_run(&[(1, 1), (2, 2)]), memory_run(&[(3, 3), (1, 4)])];
        let handle = spawn(opts.clone(), runs)?;

        handle.join().expect("should join")?;

        assert_eq!(1, opts.counters.compactions_completed());
        assert_eq!(0, opts.counters.levels_allocated());
        assert!(!opts.poison.load(Ordering::Acquire));

        let levels = opts.levels.lock().expect("lock is poisoned");
        assert_eq!(3, levels.len());
        assert_eq!(Some(4), levels.get(1)?);

        Ok(())
    }
}
