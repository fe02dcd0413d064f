// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

/// Resolves the tree folder against the current working directory,
/// so a later change of directory cannot move the run files.
#[allow(clippy::module_name_repetitions)]
pub fn absolute_path(path: &Path) -> PathBuf {
    // NOTE: Only fails if the current directory cannot be read,
    // not much we can do about it
    #[allow(clippy::expect_used)]
    path.absolutize()
        .expect("should be absolute path")
        .into_owned()
}
