// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::UserKey;
use bit_vec::BitVec;
use xxhash_rust::xxh3::xxh3_128;

/// Probabilistic set of keys, used to skip disk runs that definitely
/// do not contain a key
///
/// Uses double hashing over the two halves of a 128-bit hash,
/// so only one hash computation is needed per key.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct BloomFilter {
    /// Raw bytes exposed as bit field
    inner: BitVec,

    /// Bit count
    m: usize,

    /// Number of hash functions
    k: usize,
}

impl BloomFilter {
    /// Creates an empty filter sized for `item_count` keys at the given false positive rate.
    ///
    /// # Panics
    ///
    /// Panics if the false positive rate is not in (0, 1).
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn with_fp_rate(item_count: usize, fp_rate: f64) -> Self {
        assert!(fp_rate > 0.0 && fp_rate < 1.0, "fp rate should be in (0, 1)");

        let bits_per_key = -1.44 * fp_rate.log2();

        // NOTE: Some sensible minimum
        let m = (((item_count.max(1) as f64) * bits_per_key).ceil() as usize).max(64);

        let k = ((bits_per_key * std::f64::consts::LN_2).ceil() as usize).max(1);

        Self {
            inner: BitVec::from_elem(m, false),
            m,
            k,
        }
    }

    fn split_hash(key: UserKey) -> (u64, u64) {
        let h = xxh3_128(&key.to_be_bytes());

        // NOTE: Truncation is intended, we split the hash into two halves
        #[allow(clippy::cast_possible_truncation)]
        ((h >> 64) as u64, h as u64)
    }

    fn positions(&self, key: UserKey) -> impl Iterator<Item = usize> {
        let (h1, h2) = Self::split_hash(key);
        let m = self.m as u64;

        (0..self.k as u64).map(move |i| {
            // NOTE: The position is < m, which is a usize
            #[allow(clippy::cast_possible_truncation)]
            {
                (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize
            }
        })
    }

    /// Adds a key to the filter.
    pub fn insert(&mut self, key: UserKey) {
        for idx in self.positions(key) {
            self.inner.set(idx, true);
        }
    }

    /// Returns `false` if the key is definitely not contained.
    ///
    /// Will never have a false negative.
    #[must_use]
    pub fn contains(&self, key: UserKey) -> bool {
        self.positions(key)
            .all(|idx| self.inner.get(idx).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bloom_no_false_negatives() {
        let mut filter = BloomFilter::with_fp_rate(1_000, 0.01);

        for key in 0..1_000 {
            filter.insert(key * 7);
        }

        for key in 0..1_000 {
            assert!(filter.contains(key * 7));
        }
    }

    #[test]
    fn bloom_empty_contains_nothing() {
        let filter = BloomFilter::with_fp_rate(0, 0.01);

        assert_eq!(64, filter.m);
        assert!((-100..100).all(|key| !filter.contains(key)));
    }

    #[test]
    fn bloom_fp_rate_roughly_holds() {
        let mut filter = BloomFilter::with_fp_rate(10_000, 0.01);

        for key in 0..10_000 {
            filter.insert(key);
        }

        let false_positives = (10_000..20_000).filter(|&k| filter.contains(k)).count();

        // 1% target, leave plenty of slack
        assert!(false_positives < 500, "too many false positives: {false_positives}");
    }
}
