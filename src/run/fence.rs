// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::UserKey;
use std::ops::Range;

/// Sparse index of a disk run
///
/// Stores the first key of every page (a fixed amount of consecutive entries):
///
/// ```text
/// fence:   [ 0 ]        [ 40 ]       [ 93 ]
/// run:     0 3 7 ... 38 40 41 ... 90 93 95 ... 120
/// page:    |---- 0 ----|---- 1 -----|---- 2 -----|
/// ```
///
/// Searching for 41 yields page 1, because 40 <= 41 < 93.
#[derive(Debug)]
pub struct FencePointers {
    keys: Vec<UserKey>,
    page_size: usize,
}

impl FencePointers {
    pub fn new(page_size: usize) -> Self {
        assert!(page_size > 0, "page size should be > 0");

        Self {
            keys: Vec::new(),
            page_size,
        }
    }

    /// Offers the key at position `idx` of the run.
    ///
    /// Needs to be called for every entry, in order.
    pub fn observe(&mut self, idx: usize, key: UserKey) {
        if idx % self.page_size == 0 {
            self.keys.push(key);
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Amount of recorded pages
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    fn page(&self, page: usize, run_len: usize) -> Range<usize> {
        let start = (page * self.page_size).min(run_len);
        let end = ((page + 1) * self.page_size).min(run_len);
        start..end
    }

    /// Returns the slot range of the page that has to contain `key`, if the run contains it.
    ///
    /// The returned span also bounds the insertion point of `key`.
    pub fn page_span(&self, key: UserKey, run_len: usize) -> Range<usize> {
        let Some((&first, &last)) = self.keys.first().zip(self.keys.last()) else {
            return 0..0;
        };

        if key < first {
            return self.page(0, run_len);
        }

        let last_page = self.keys.len() - 1;

        if key >= last {
            return (last_page * self.page_size).min(run_len)..run_len;
        }

        // first <= key < last, so there is a bracketing pair
        // fence[p] <= key < fence[p + 1]
        let page = self.keys.partition_point(|&fence| fence <= key) - 1;
        self.page(page, run_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn fences(keys: &[UserKey], page_size: usize) -> FencePointers {
        let mut fp = FencePointers::new(page_size);
        for (idx, &key) in keys.iter().enumerate() {
            fp.observe(idx, key);
        }
        fp
    }

    #[test]
    fn fence_samples_first_key_of_page() {
        let keys = (0..10).map(|x| x * 2).collect::<Vec<_>>();
        let fp = fences(&keys, 4);

        assert_eq!(3, fp.len());
        assert_eq!(vec![0, 8, 16], fp.keys);
    }

    #[test]
    fn fence_key_before_first_page() {
        let keys = (10..20).collect::<Vec<_>>();
        let fp = fences(&keys, 4);

        assert_eq!(0..4, fp.page_span(-100, keys.len()));
    }

    #[test]
    fn fence_key_in_last_page() {
        let keys = (10..20).collect::<Vec<_>>();
        let fp = fences(&keys, 4);

        // Last page is only partially filled
        assert_eq!(8..10, fp.page_span(18, keys.len()));
        assert_eq!(8..10, fp.page_span(1_000, keys.len()));
    }

    #[test]
    fn fence_key_in_middle_page() {
        let keys = (0..12).map(|x| x * 10).collect::<Vec<_>>();
        let fp = fences(&keys, 4);

        assert_eq!(0..4, fp.page_span(0, keys.len()));
        assert_eq!(0..4, fp.page_span(35, keys.len()));
        assert_eq!(4..8, fp.page_span(40, keys.len()));
        assert_eq!(4..8, fp.page_span(79, keys.len()));
        assert_eq!(8..12, fp.page_span(80, keys.len()));
    }

    #[test]
    fn fence_single_page() {
        let keys = [1, 2, 3];
        let fp = fences(&keys, 512);

        assert_eq!(0..3, fp.page_span(0, keys.len()));
        assert_eq!(0..3, fp.page_span(2, keys.len()));
        assert_eq!(0..3, fp.page_span(9, keys.len()));
    }

    #[test]
    fn fence_empty() {
        let fp = FencePointers::new(4);
        assert_eq!(0..0, fp.page_span(9, 0));
    }
}
