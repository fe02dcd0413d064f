// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Value;
use std::{
    fmt::Write as _,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// Ephemeral, runtime stats of the compaction thread
#[derive(Default)]
pub struct CompactionCounters {
    /// Number of completed compactions
    pub(crate) compactions_completed: AtomicUsize,

    /// Time spent in compactions (in µs)
    pub(crate) time_compacting_us: AtomicU64,

    /// Number of disk levels allocated after level 1
    pub(crate) levels_allocated: AtomicUsize,
}

impl CompactionCounters {
    pub fn compactions_completed(&self) -> usize {
        self.compactions_completed.load(Ordering::Relaxed)
    }

    pub fn time_compacting_us(&self) -> u64 {
        self.time_compacting_us.load(Ordering::Relaxed)
    }

    pub fn levels_allocated(&self) -> usize {
        self.levels_allocated.load(Ordering::Relaxed)
    }
}

/// Point-in-time summary of a tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Amount of live keys
    pub len: usize,

    /// Amount of entries in the buffer, including tombstones
    pub buffer_len: usize,

    /// Amount of entries per disk level, including tombstones
    ///
    /// Index 0 holds level 1. Levels are numbered from 1 everywhere,
    /// including the [`Display`](std::fmt::Display) output and [`Dump`].
    pub level_lens: Vec<usize>,

    /// Number of completed compactions
    pub compactions_completed: usize,

    /// Time spent in compactions (in µs)
    pub time_compacting_us: u64,

    /// Number of disk levels allocated after level 1
    pub levels_allocated: usize,
}

impl Stats {
    /// Amount of disk levels
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.level_lens.len()
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Number of Elements: {}", self.len)?;
        writeln!(
            f,
            "Number of Elements in Buffer (including deletes): {}",
            self.buffer_len
        )?;

        for (idx, len) in self.level_lens.iter().enumerate() {
            writeln!(
                f,
                "Number of Elements in Disk Level {} (including deletes): {len}",
                idx + 1
            )?;
        }

        write!(
            f,
            "Compactions: {} ({} µs)",
            self.compactions_completed, self.time_compacting_us
        )
    }
}

/// Entries of a single disk level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelDump {
    /// Level number (starting at 1)
    pub level: usize,

    /// Entries of every run, in slot order
    pub runs: Vec<Vec<Value>>,
}

/// Full content of a tree, tier by tier, including tombstones
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dump {
    /// Entries of every live buffer run, in slot order
    pub buffer: Vec<Vec<Value>>,

    /// Disk levels, starting at level 1
    pub levels: Vec<LevelDump>,
}

fn write_entries(f: &mut std::fmt::Formatter<'_>, entries: &[Value]) -> std::fmt::Result {
    let mut line = String::new();

    for entry in entries {
        write!(line, "{entry:?} ")?;
    }

    writeln!(f, "{}", line.trim_end())
}

impl std::fmt::Display for Dump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "MEMORY BUFFER")?;

        for (idx, run) in self.buffer.iter().enumerate() {
            writeln!(f, "MEMORY BUFFER RUN {idx}")?;
            write_entries(f, run)?;
        }

        writeln!(f)?;
        writeln!(f, "DISK BUFFER")?;

        for level in &self.levels {
            writeln!(f, "DISK LEVEL {}", level.level)?;

            for (idx, run) in level.runs.iter().enumerate() {
                writeln!(f, "RUN {idx}")?;
                write_entries(f, run)?;
            }
        }

        Ok(())
    }
}
