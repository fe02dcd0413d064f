// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod fence;
pub mod writer;

use crate::{bloom::BloomFilter, file::run_file_path, UserKey, UserValue, Value};
use fence::FencePointers;
use memmap2::Mmap;
use std::{
    ops::Range,
    path::{Path, PathBuf},
};

/// A freshly sealed, read-only mapping, handed over by the [`writer::Writer`]
pub struct Sealed {
    pub path: PathBuf,
    pub level: usize,
    pub ordinal: usize,
    pub mmap: Mmap,
    pub len: usize,
}

/// An immutable, key-sorted array of fixed-size entries on disk
///
/// The backing file is memory-mapped read-only for the lifetime of the run
/// and deleted when the run is dropped.
///
/// Point reads use the sparse index to select a single page,
/// then binary search inside that page.
#[allow(clippy::module_name_repetitions)]
pub struct DiskRun {
    path: PathBuf,

    /// Level the run lives in (1-indexed)
    level: usize,

    /// Slot inside the level
    ordinal: usize,

    mmap: Mmap,

    /// Amount of entries
    len: usize,

    fence_pointers: FencePointers,
    bloom_filter: Option<BloomFilter>,

    min_key: UserKey,
    max_key: UserKey,
}

impl std::fmt::Debug for DiskRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DiskRun(L{}#{}, {} items, {}..={})",
            self.level, self.ordinal, self.len, self.min_key, self.max_key
        )
    }
}

impl DiskRun {
    pub(crate) fn from_sealed(
        sealed: Sealed,
        page_size: usize,
        bloom_fp_rate: Option<f64>,
    ) -> crate::Result<Self> {
        let mut run = Self {
            path: sealed.path,
            level: sealed.level,
            ordinal: sealed.ordinal,
            mmap: sealed.mmap,
            len: sealed.len,
            fence_pointers: FencePointers::new(page_size),
            bloom_filter: bloom_fp_rate.map(|fp| BloomFilter::with_fp_rate(sealed.len, fp)),
            min_key: UserKey::MIN,
            max_key: UserKey::MIN,
        };
        run.construct_index()?;
        Ok(run)
    }

    /// Walks the run once, sampling fence pointers and filling the bloom filter
    fn construct_index(&mut self) -> crate::Result<()> {
        assert!(self.len > 0, "cannot index an empty run");

        let mut fence_pointers = FencePointers::new(self.fence_pointers.page_size());
        let mut prev: Option<UserKey> = None;

        for idx in 0..self.len {
            let key = self.entry(idx)?.key;

            debug_assert!(prev.map_or(true, |prev| prev < key), "run is not sorted");
            prev = Some(key);

            fence_pointers.observe(idx, key);

            if let Some(bf) = &mut self.bloom_filter {
                bf.insert(key);
            }
        }

        self.fence_pointers = fence_pointers;
        self.min_key = self.entry(0)?.key;
        self.max_key = self.entry(self.len - 1)?.key;

        log::trace!(
            "Indexed {self:?} with {} fence pointers",
            self.fence_pointers.len()
        );

        Ok(())
    }

    /// Decodes the entry at slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn entry(&self, idx: usize) -> crate::Result<Value> {
        assert!(idx < self.len, "entry index out of bounds");

        let offset = idx * Value::ENCODED_SIZE;

        // NOTE: idx < len, and the mapping holds len records
        #[allow(clippy::expect_used)]
        let record = self
            .mmap
            .get(offset..offset + Value::ENCODED_SIZE)
            .expect("record should be in bounds");

        Ok(Value::from_record(record)?)
    }

    /// Binary searches `key` inside `span`.
    ///
    /// Returns `Ok(idx)` if found, or `Err(idx)` with the insertion point.
    fn search(&self, span: Range<usize>, key: UserKey) -> crate::Result<Result<usize, usize>> {
        let (mut lo, mut hi) = (span.start, span.end);

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_key = self.entry(mid)?.key;

            match mid_key.cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Ok(mid)),
            }
        }

        Ok(Err(lo))
    }

    /// Returns the position of the first entry with a key >= `key`.
    fn lower_bound(&self, key: UserKey) -> crate::Result<usize> {
        let span = self.fence_pointers.page_span(key, self.len);
        Ok(self.search(span, key)?.unwrap_or_else(|idx| idx))
    }

    /// Returns the stored value (which may be a tombstone) if the key exists.
    pub fn get(&self, key: UserKey) -> crate::Result<Option<UserValue>> {
        if !self.key_range_contains(key) {
            return Ok(None);
        }

        if let Some(bf) = &self.bloom_filter {
            if !bf.contains(key) {
                return Ok(None);
            }
        }

        let span = self.fence_pointers.page_span(key, self.len);

        match self.search(span, key)? {
            Ok(idx) => Ok(Some(self.entry(idx)?.value)),
            Err(_) => Ok(None),
        }
    }

    /// Returns the half-open slot span of all entries with keys in `[lo, hi)`.
    pub fn range(&self, lo: UserKey, hi: UserKey) -> crate::Result<Range<usize>> {
        if hi <= lo || lo > self.max_key || hi <= self.min_key {
            return Ok(0..0);
        }

        let start = if lo <= self.min_key {
            0
        } else {
            self.lower_bound(lo)?
        };

        let end = if hi > self.max_key {
            self.len
        } else {
            self.lower_bound(hi)?
        };

        Ok(start..end)
    }

    /// Decodes all entries of a slot span.
    pub fn entries(&self, span: Range<usize>) -> crate::Result<Vec<Value>> {
        span.map(|idx| self.entry(idx)).collect()
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = crate::Result<Value>> + '_ {
        (0..self.len).map(|idx| self.entry(idx))
    }

    /// Moves the run to another slot of its level, renaming the backing file.
    pub fn set_ordinal(&mut self, ordinal: usize) -> crate::Result<()> {
        if ordinal == self.ordinal {
            return Ok(());
        }

        let folder = self.path.parent().unwrap_or_else(|| Path::new("."));
        let new_path = run_file_path(folder, self.level, ordinal);

        log::trace!(
            "Renaming run {} to {}",
            self.path.display(),
            new_path.display()
        );
        std::fs::rename(&self.path, &new_path)?;

        self.path = new_path;
        self.ordinal = ordinal;

        Ok(())
    }

    /// Returns `true` if the key lies in the run's [min, max] key range.
    pub fn key_range_contains(&self, key: UserKey) -> bool {
        key >= self.min_key && key <= self.max_key
    }

    /// Amount of entries, including tombstones
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn min_key(&self) -> UserKey {
        self.min_key
    }

    pub fn max_key(&self) -> UserKey {
        self.max_key
    }
}

impl Drop for DiskRun {
    fn drop(&mut self) {
        log::trace!("Removing run file {}", self.path.display());

        if let Err(e) = std::fs::remove_file(&self.path) {
            log::error!("Failed to remove run file {}: {e:?}", self.path.display());
        }
    }
}
