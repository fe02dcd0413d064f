// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::DiskRun;
use crate::{serde::Serializable, UserKey, Value};
use memmap2::{Mmap, MmapMut};
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

/// Options of a run that is about to be written
pub struct Options {
    /// Path of the backing file
    pub path: PathBuf,

    /// Level the run belongs to (1-indexed)
    pub level: usize,

    /// Slot of the run inside its level
    pub ordinal: usize,

    /// Upper bound of entries the run may hold
    pub capacity: usize,

    /// Entries per fence pointer page
    pub page_size: usize,

    /// False positive rate of the run's bloom filter, if any
    pub bloom_fp_rate: Option<f64>,
}

/// Fills the backing file of a new disk run
///
/// The file is stretched to `capacity` records and mapped read-write.
/// Entries need to be appended in strictly ascending key order.
/// [`Writer::finish`] seals the run: the file is truncated to the written length,
/// remapped read-only and indexed.
pub struct Writer {
    opts: Options,
    file: File,
    mmap: MmapMut,

    /// Amount of written records
    cursor: usize,

    last_key: Option<UserKey>,
}

#[allow(unsafe_code)]
fn map_mut(file: &File) -> std::io::Result<MmapMut> {
    // SAFETY: The file was just created by us and is exclusively owned by this run,
    // nothing else truncates or writes it while it is mapped
    unsafe { MmapMut::map_mut(file) }
}

#[allow(unsafe_code)]
fn map(file: &File) -> std::io::Result<Mmap> {
    // SAFETY: Same as above, and the run is never written again once sealed
    unsafe { Mmap::map(file) }
}

fn file_size(records: usize) -> u64 {
    (records * Value::ENCODED_SIZE) as u64
}

impl Writer {
    /// Creates the backing file and maps it.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(opts: Options) -> crate::Result<Self> {
        assert!(opts.capacity > 0, "run capacity should be > 0");

        log::trace!(
            "run writer: creating {} with room for {} entries",
            opts.path.display(),
            opts.capacity
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&opts.path)?;
        file.set_len(file_size(opts.capacity))?;

        let mmap = map_mut(&file)?;

        Ok(Self {
            opts,
            file,
            mmap,
            cursor: 0,
            last_key: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.opts.path
    }

    /// Amount of written entries
    pub fn len(&self) -> usize {
        self.cursor
    }

    /// Appends an entry.
    ///
    /// # Panics
    ///
    /// Panics if the run is full or the key is not greater than the previous one.
    pub fn write(&mut self, item: Value) -> crate::Result<()> {
        assert!(self.cursor < self.opts.capacity, "run is full");

        if let Some(last_key) = self.last_key {
            assert!(item.key > last_key, "runs need to be written in key order");
        }

        let offset = self.cursor * Value::ENCODED_SIZE;

        // NOTE: cursor < capacity, and the mapping holds capacity records
        #[allow(clippy::expect_used)]
        let mut record = self
            .mmap
            .get_mut(offset..offset + Value::ENCODED_SIZE)
            .expect("record should be in bounds");
        item.serialize(&mut record)?;

        self.cursor += 1;
        self.last_key = Some(item.key);

        Ok(())
    }

    /// Copies a pre-sorted slice of entries.
    pub fn write_sorted(&mut self, items: &[Value]) -> crate::Result<()> {
        for item in items {
            self.write(*item)?;
        }
        Ok(())
    }

    /// Seals the run and builds its index.
    ///
    /// Returns `None` (and deletes the backing file) if nothing was written.
    pub fn finish(self) -> crate::Result<Option<DiskRun>> {
        let Self {
            opts,
            file,
            mmap,
            cursor,
            ..
        } = self;

        if cursor == 0 {
            drop(mmap);
            drop(file);

            log::trace!("run writer: nothing written, removing {}", opts.path.display());
            std::fs::remove_file(&opts.path)?;

            return Ok(None);
        }

        mmap.flush()?;
        drop(mmap);

        file.set_len(file_size(cursor))?;
        file.sync_all()?;

        let mmap = map(&file)?;

        let run = DiskRun::from_sealed(
            super::Sealed {
                path: opts.path,
                level: opts.level,
                ordinal: opts.ordinal,
                mmap,
                len: cursor,
            },
            opts.page_size,
            opts.bloom_fp_rate,
        )?;

        Ok(Some(run))
    }
}
