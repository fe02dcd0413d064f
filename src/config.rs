// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{file::RUNS_FOLDER, path::absolute_path, Tree};
use std::path::{Path, PathBuf};

const DEFAULT_FILE_FOLDER: &str = ".tierkv.data";

/// Tree configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Folder path
    ///
    /// Defaults to `./.tierkv.data`
    pub(crate) path: PathBuf,

    /// Maximum amount of keys in a single buffer run
    ///
    /// Defaults to 800
    pub(crate) buffer_run_capacity: usize,

    /// Amount of runs in the buffer
    ///
    /// Defaults to 20
    pub(crate) buffer_run_count: usize,

    /// Fraction of runs that are merged into the next tier once a tier is exhausted
    ///
    /// Defaults to 1.0
    pub(crate) merge_fraction: f64,

    /// Amount of entries per fence pointer page
    ///
    /// Defaults to 512
    pub(crate) page_size: usize,

    /// Amount of run slots of every disk level
    ///
    /// Defaults to 20
    pub(crate) disk_runs_per_level: usize,

    /// False positive rate of the disk run bloom filters, `None` disables them
    ///
    /// Defaults to 1%
    pub(crate) bloom_fp_rate: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: absolute_path(Path::new(DEFAULT_FILE_FOLDER)),
            buffer_run_capacity: 800,
            buffer_run_count: 20,
            merge_fraction: 1.0,
            page_size: 512,
            disk_runs_per_level: 20,
            bloom_fp_rate: Some(0.01),
        }
    }
}

/// `ceil(fraction * runs)`, but at least 1
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn fraction_of(runs: usize, fraction: f64) -> usize {
    ((fraction * runs as f64).ceil() as usize).clamp(1, runs)
}

impl Config {
    /// Initializes a new config
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: absolute_path(path.as_ref()),
            ..Default::default()
        }
    }

    /// Sets the maximum amount of keys per buffer run.
    ///
    /// Defaults to 800.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn buffer_run_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "buffer run capacity should be > 0");

        self.buffer_run_capacity = n;
        self
    }

    /// Sets the amount of runs of the in-memory buffer.
    ///
    /// Defaults to 20.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn buffer_run_count(mut self, n: usize) -> Self {
        assert!(n > 0, "buffer run count should be > 0");

        self.buffer_run_count = n;
        self
    }

    /// Sets the fraction of runs that is merged down once a tier is exhausted.
    ///
    /// With a fraction of 1.0, every run of a full tier is merged at once.
    ///
    /// Defaults to 1.0.
    ///
    /// # Panics
    ///
    /// Panics if the fraction is not in (0, 1].
    #[must_use]
    pub fn merge_fraction(mut self, fraction: f64) -> Self {
        assert!(
            fraction > 0.0 && fraction <= 1.0,
            "merge fraction should be in (0, 1]"
        );

        self.merge_fraction = fraction;
        self
    }

    /// Sets the amount of entries covered by one fence pointer.
    ///
    /// Defaults to 512.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn page_size(mut self, n: usize) -> Self {
        assert!(n > 0, "page size should be > 0");

        self.page_size = n;
        self
    }

    /// Sets the amount of runs per disk level.
    ///
    /// Defaults to 20.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn disk_runs_per_level(mut self, n: usize) -> Self {
        assert!(n > 0, "disk runs per level should be > 0");

        self.disk_runs_per_level = n;
        self
    }

    /// Sets the false positive rate of the per-run bloom filters.
    ///
    /// `None` disables bloom filters, so every point read of a run
    /// that covers the key performs a search.
    ///
    /// Defaults to 1%.
    ///
    /// # Panics
    ///
    /// Panics if the rate is not in (0, 1).
    #[must_use]
    pub fn bloom_fp_rate(mut self, rate: Option<f64>) -> Self {
        if let Some(rate) = rate {
            assert!(rate > 0.0 && rate < 1.0, "bloom fp rate should be in (0, 1)");
        }

        self.bloom_fp_rate = rate;
        self
    }

    /// Amount of buffer runs evicted into level 1 at once
    pub(crate) fn merge_count(&self) -> usize {
        fraction_of(self.buffer_run_count, self.merge_fraction)
    }

    /// Amount of disk runs merged into the next level at once
    pub(crate) fn level_merge_count(&self) -> usize {
        fraction_of(self.disk_runs_per_level, self.merge_fraction)
    }

    /// Returns the folder of the run files.
    #[must_use]
    pub fn runs_folder(&self) -> PathBuf {
        self.path.join(RUNS_FOLDER)
    }

    /// Opens a tree using the config.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open(self) -> crate::Result<Tree> {
        Tree::open(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn config_defaults() {
        let config = Config::new("/tmp/tree");

        assert_eq!(800, config.buffer_run_capacity);
        assert_eq!(20, config.buffer_run_count);
        assert_eq!(20, config.merge_count());
        assert_eq!(20, config.level_merge_count());
        assert_eq!(Path::new("/tmp/tree/runs"), config.runs_folder());
    }

    #[test]
    fn config_merge_counts_round_up() {
        let config = Config::new("/tmp/tree")
            .buffer_run_count(3)
            .disk_runs_per_level(7)
            .merge_fraction(0.5);

        assert_eq!(2, config.merge_count());
        assert_eq!(4, config.level_merge_count());

        let config = Config::new("/tmp/tree")
            .buffer_run_count(20)
            .merge_fraction(0.001);

        assert_eq!(1, config.merge_count());
    }

    #[test]
    #[should_panic(expected = "merge fraction")]
    fn config_rejects_zero_fraction() {
        let _ = Config::new("/tmp/tree").merge_fraction(0.0);
    }

    #[test]
    #[should_panic(expected = "merge fraction")]
    fn config_rejects_large_fraction() {
        let _ = Config::new("/tmp/tree").merge_fraction(1.5);
    }
}
