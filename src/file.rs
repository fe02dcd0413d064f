// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::path::{Path, PathBuf};

/// Subfolder of the tree folder that holds the disk runs
pub const RUNS_FOLDER: &str = "runs";

/// Extension of a disk run file
pub const RUN_FILE_EXTENSION: &str = "run";

/// Returns the name of the file backing a disk run
///
/// A run's identity is derived from its level and its slot in that level,
/// so the file needs to be renamed whenever the slot changes.
#[must_use]
pub fn run_file_name(level: usize, ordinal: usize) -> String {
    format!("C_{level}_{ordinal}.{RUN_FILE_EXTENSION}")
}

/// Returns the path of the file backing a disk run
pub fn run_file_path<P: AsRef<Path>>(folder: P, level: usize, ordinal: usize) -> PathBuf {
    folder.as_ref().join(run_file_name(level, ordinal))
}
