// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embeddable log-structured merge key-value storage engine built from tiered sorted runs.
//!
//! Writes land in an in-memory buffer made of a fixed number of sorted runs.
//! Once every buffer slot is exhausted, the oldest slots are handed to a background
//! thread that merges them into a memory-mapped disk run at level 1. Each disk level
//! holds a fixed number of runs; when it fills up, its oldest runs are k-way merged
//! into a single, geometrically larger run at the next level (allocated on demand).
//!
//! Disk runs are immutable, contiguous arrays of fixed-size records with a sparse
//! index ("fence pointers") sampling the first key of every page, so a point read is
//! a binary search over fence keys followed by a binary search inside one page.
//!
//! The engine is meant to be driven by a single logical writer, for example a replicated
//! state machine applying a totally ordered operation log. It keeps a side log of the
//! live key-value mapping so a snapshot can be produced without scanning the tree.
//!
//! ```
//! use tierkv::Config;
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! let tree = Config::new(&folder)
//!     .buffer_run_capacity(100)
//!     .buffer_run_count(4)
//!     .open()?;
//!
//! // Write some data
//! tree.insert(1, 100)?;
//! tree.insert(2, 200)?;
//!
//! // And retrieve it
//! assert_eq!(Some(100), tree.get(1)?);
//!
//! // Or remove it again
//! tree.remove(1)?;
//! assert_eq!(None, tree.get(1)?);
//!
//! // Search by half-open range
//! let items = tree.range(0, 10)?;
//! assert_eq!(items.len(), 1);
//! #
//! # Ok::<_, tierkv::Error>(())
//! ```

#![deny(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("compilation is only allowed for 64-bit targets");

mod bloom;
mod buffer;
mod compaction;
mod config;
mod error;

#[doc(hidden)]
pub mod file;

mod levels;
mod memtable;
mod merge;
mod path;
mod poison_dart;
mod run;

#[doc(hidden)]
pub mod serde;

mod stats;
mod tree;
mod tree_inner;
mod value;

pub use {
    config::Config,
    error::{Error, Result},
    serde::{DeserializeError, SerializeError},
    stats::{Dump, LevelDump, Stats},
    tree::Tree,
    value::{UserKey, UserValue, Value, TOMBSTONE},
};
