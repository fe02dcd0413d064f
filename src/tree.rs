// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    buffer::Buffer,
    compaction::{self, Options as CompactionOptions},
    file::RUN_FILE_EXTENSION,
    levels::Levels,
    memtable::MemoryRun,
    stats::{Dump, LevelDump, Stats},
    tree_inner::{SideLog, TreeInner},
    Config, Error, UserKey, UserValue, Value, TOMBSTONE,
};
use std::{
    collections::BTreeMap,
    path::Path,
    sync::{atomic::Ordering, Arc, Mutex, RwLock},
};

/// A log-structured merge tree (LSM tree/LSMT) of `i64` keys and values
///
/// Handles are cheap to clone and share the same tree.
#[derive(Clone)]
pub struct Tree(Arc<TreeInner>);

impl std::ops::Deref for Tree {
    type Target = TreeInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Deletes run files left behind by a previous process.
fn remove_stale_runs(folder: &Path) -> crate::Result<()> {
    for dirent in std::fs::read_dir(folder)? {
        let path = dirent?.path();

        if path.extension().is_some_and(|ext| ext == RUN_FILE_EXTENSION) {
            log::debug!("Removing stale run file {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }

    Ok(())
}

/// Resolves per-run results (newest run first) into the live entries, ordered by key.
///
/// The first version seen of a key is the newest one, so it shadows all later ones,
/// and a tombstone hides the key entirely.
fn reconcile(runs: Vec<Vec<Value>>) -> Vec<Value> {
    let mut newest = BTreeMap::new();

    for item in runs.into_iter().flatten() {
        newest.entry(item.key).or_insert(item.value);
    }

    newest
        .into_iter()
        .map(Value::from)
        .filter(|item| !item.is_tombstone())
        .collect()
}

impl Tree {
    /// Opens a tree in the given folder.
    ///
    /// The tree always starts empty: the folder is created if needed,
    /// and run files of a previous process are removed.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open(config: Config) -> crate::Result<Self> {
        log::debug!("Opening tree at {}", config.path.display());

        let runs_folder = config.runs_folder();
        std::fs::create_dir_all(&runs_folder)?;
        remove_stale_runs(&runs_folder)?;

        let buffer = Buffer::new(
            config.buffer_run_capacity,
            config.buffer_run_count,
            config.merge_count(),
        );
        let levels = Levels::new(&config);

        let inner = TreeInner {
            buffer: RwLock::new(buffer),
            levels: Arc::new(Mutex::new(levels)),
            compaction: Mutex::new(None),
            counters: Arc::default(),
            poison: Arc::default(),
            side_log: SideLog::default(),
            config,
        };

        Ok(Self(Arc::new(inner)))
    }

    /// Returns the tree configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn check_poison(&self) -> crate::Result<()> {
        if self.poison.load(Ordering::Acquire) {
            return Err(Error::Poisoned);
        }
        Ok(())
    }

    fn set_poisoned(&self) {
        log::error!("Poisoning tree");
        self.poison.store(true, Ordering::Release);
    }

    /// Inserts a key-value pair into the tree.
    ///
    /// If the key already exists, the item will be overwritten.
    /// Inserting [`TOMBSTONE`] is the same as [`Tree::remove`].
    ///
    /// # Examples
    ///
    /// ```
    /// # let folder = tempfile::tempdir()?;
    /// use tierkv::Config;
    ///
    /// let tree = Config::new(folder).open()?;
    /// tree.insert(5, 100)?;
    /// assert_eq!(Some(100), tree.get(5)?);
    /// #
    /// # Ok::<(), tierkv::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn insert(&self, key: UserKey, value: UserValue) -> crate::Result<()> {
        if value == TOMBSTONE {
            return self.remove(key);
        }

        self.write(Value::new(key, value))
    }

    /// Removes an item from the tree.
    ///
    /// Writes a tombstone that shadows all older versions of the key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn remove(&self, key: UserKey) -> crate::Result<()> {
        self.write(Value::new_tombstone(key))
    }

    /// Buffers an entry and mirrors it into the side log.
    ///
    /// Both happen under the buffer write lock, so concurrent writers
    /// apply them in the same order.
    fn write(&self, item: Value) -> crate::Result<()> {
        self.check_poison()?;

        #[allow(clippy::expect_used)]
        let mut buffer = self.buffer.write().expect("lock is poisoned");

        if let Some(evicted) = buffer.rotate() {
            if let Err(e) = self.start_compaction(evicted) {
                // NOTE: The evicted runs are gone, so the tree cannot stay consistent
                self.set_poisoned();
                return Err(e);
            }
        }

        buffer.insert(item);

        if item.is_tombstone() {
            self.side_log.remove(&item.key);
        } else {
            self.side_log.insert(item.key, item.value);
        }

        Ok(())
    }

    /// Hands evicted buffer runs to a new compaction thread.
    ///
    /// Compactions need to be applied in order, so a previous one is joined first.
    fn start_compaction(&self, evicted: Vec<Arc<MemoryRun>>) -> crate::Result<()> {
        #[allow(clippy::expect_used)]
        let mut compaction = self.compaction.lock().expect("lock is poisoned");

        if let Some(handle) = compaction.take() {
            log::trace!("Joining previous compaction");
            Self::join_compaction(handle)?;
        }

        log::debug!("Starting compaction of {} buffer runs", evicted.len());

        let handle = compaction::spawn(
            CompactionOptions {
                levels: self.levels.clone(),
                counters: self.counters.clone(),
                poison: self.poison.clone(),
            },
            evicted,
        )?;

        *compaction = Some(handle);

        Ok(())
    }

    fn join_compaction(handle: compaction::CompactionHandle) -> crate::Result<()> {
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(Error::CompactionPanicked),
        }
    }

    /// Blocks until the in-flight compaction (if any) is done.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the compaction failed or panicked.
    pub fn wait_for_compaction(&self) -> crate::Result<()> {
        // NOTE: The lock is held while joining, so no other reader
        // can look at the levels before the compaction is applied
        #[allow(clippy::expect_used)]
        let mut compaction = self.compaction.lock().expect("lock is poisoned");

        if let Some(handle) = compaction.take() {
            log::trace!("Waiting for compaction");
            Self::join_compaction(handle)?;
        }

        Ok(())
    }

    /// Returns `true` if a compaction is running.
    #[must_use]
    pub fn is_compacting(&self) -> bool {
        #[allow(clippy::expect_used)]
        self.compaction
            .lock()
            .expect("lock is poisoned")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Retrieves the value of a key.
    ///
    /// Searches the buffer newest run first, then the disk levels top-down.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn get(&self, key: UserKey) -> crate::Result<Option<UserValue>> {
        self.check_poison()?;

        #[allow(clippy::expect_used)]
        let buffer = self.buffer.read().expect("lock is poisoned");

        if let Some(value) = buffer.get(key) {
            return Ok(Some(value).filter(|&v| v != TOMBSTONE));
        }

        self.wait_for_compaction()?;

        #[allow(clippy::expect_used)]
        let levels = self.levels.lock().expect("lock is poisoned");

        let value = levels.get(key)?;
        drop(levels);
        drop(buffer);

        Ok(value.filter(|&v| v != TOMBSTONE))
    }

    /// Returns `true` if the tree contains the specified key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn contains_key(&self, key: UserKey) -> crate::Result<bool> {
        self.get(key).map(|x| x.is_some())
    }

    /// Returns all live items with `lo <= key < hi`, ordered by key.
    ///
    /// Only the newest version of each key is returned.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn range(&self, lo: UserKey, hi: UserKey) -> crate::Result<Vec<Value>> {
        self.check_poison()?;

        if hi <= lo {
            return Ok(Vec::new());
        }

        #[allow(clippy::expect_used)]
        let buffer = self.buffer.read().expect("lock is poisoned");

        let mut runs = buffer.range(lo, hi);

        self.wait_for_compaction()?;

        #[allow(clippy::expect_used)]
        let levels = self.levels.lock().expect("lock is poisoned");

        runs.extend(levels.range(lo, hi)?);
        drop(levels);
        drop(buffer);

        Ok(reconcile(runs))
    }

    /// Counts the amount of live keys in the tree.
    ///
    /// This scans the whole tree.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn len(&self) -> crate::Result<usize> {
        let below_max = self.range(UserKey::MIN, UserKey::MAX)?.len();
        let max = usize::from(self.contains_key(UserKey::MAX)?);
        Ok(below_max + max)
    }

    /// Returns `true` if the tree holds no live keys.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn is_empty(&self) -> crate::Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Amount of entries in the buffer, including tombstones.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.buffer.read().expect("lock is poisoned").len()
    }

    /// Returns the live key-value mapping, without scanning the tree.
    #[must_use]
    pub fn snapshot_mapping(&self) -> BTreeMap<UserKey, UserValue> {
        self.side_log
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Inserts every pair of a snapshot mapping.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn apply_snapshot<I: IntoIterator<Item = (UserKey, UserValue)>>(
        &self,
        mapping: I,
    ) -> crate::Result<()> {
        let mut count = 0;

        for (key, value) in mapping {
            self.insert(key, value)?;
            count += 1;
        }

        log::debug!("Applied snapshot of {count} items");

        Ok(())
    }

    /// Returns a summary of the tree's shape.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn stats(&self) -> crate::Result<Stats> {
        let len = self.len()?;
        let buffer_len = self.buffer_len();

        self.wait_for_compaction()?;

        #[allow(clippy::expect_used)]
        let levels = self.levels.lock().expect("lock is poisoned");

        Ok(Stats {
            len,
            buffer_len,
            level_lens: levels.iter().map(|level| level.len()).collect(),
            compactions_completed: self.counters.compactions_completed(),
            time_compacting_us: self.counters.time_compacting_us(),
            levels_allocated: self.counters.levels_allocated(),
        })
    }

    /// Returns every entry of the tree (including tombstones), tier by tier.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the tree is poisoned.
    pub fn dump(&self) -> crate::Result<Dump> {
        self.check_poison()?;

        #[allow(clippy::expect_used)]
        let buffer = self.buffer.read().expect("lock is poisoned");

        self.wait_for_compaction()?;

        #[allow(clippy::expect_used)]
        let levels = self.levels.lock().expect("lock is poisoned");

        let level_dumps = levels
            .iter()
            .map(|level| -> crate::Result<LevelDump> {
                Ok(LevelDump {
                    level: level.level(),
                    runs: level.entries()?,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Dump {
            buffer: buffer.entries(),
            levels: level_dumps,
        })
    }
}
