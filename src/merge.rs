// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Value;
use min_max_heap::MinMaxHeap;

pub type BoxedIterator<'a> = Box<dyn Iterator<Item = crate::Result<Value>> + 'a>;

/// Position of the source iterator, which doubles as its recency
type SourceIndex = usize;

#[derive(Debug)]
struct HeapItem {
    source: SourceIndex,
    value: Value,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        (self.value.key, self.source) == (other.value.key, other.source)
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Order by key, THEN by source
//
// Entries that share a key are popped oldest source first
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.value.key, self.source).cmp(&(other.value.key, other.source))
    }
}

/// Merges N sorted runs into a single sorted stream using a k-way merge
///
/// The sources need to be passed oldest first: among entries with the same key,
/// the one from the source with the highest index wins. Entries are never
/// timestamped, so this ordering contract is the only thing that preserves
/// "last write wins" across runs.
///
/// Each source must be strictly sorted by key.
#[allow(clippy::module_name_repetitions)]
pub struct MergeIterator<'a> {
    iterators: Vec<BoxedIterator<'a>>,
    heap: MinMaxHeap<HeapItem>,
    initialized: bool,
    evict_tombstones: bool,
}

impl<'a> MergeIterator<'a> {
    /// Initializes a new merge iterator
    pub fn new(iterators: Vec<BoxedIterator<'a>>) -> Self {
        let heap = MinMaxHeap::with_capacity(iterators.len());

        Self {
            iterators,
            heap,
            initialized: false,
            evict_tombstones: false,
        }
    }

    /// Drops winning tombstones from the output.
    ///
    /// Only safe if no older version of any key can exist below the merge target.
    pub fn evict_tombstones(mut self, v: bool) -> Self {
        self.evict_tombstones = v;
        self
    }

    fn advance_iter(&mut self, idx: SourceIndex) -> crate::Result<()> {
        // NOTE: Heap items only ever carry indexes of existing iterators
        #[allow(clippy::expect_used)]
        let iterator = self.iterators.get_mut(idx).expect("iter should exist");

        if let Some(value) = iterator.next() {
            self.heap.push(HeapItem {
                source: idx,
                value: value?,
            });
        }

        Ok(())
    }

    fn initialize(&mut self) -> crate::Result<()> {
        for idx in 0..self.iterators.len() {
            self.advance_iter(idx)?;
        }
        self.initialized = true;
        Ok(())
    }

    fn pop_winner(&mut self) -> crate::Result<Option<Value>> {
        let Some(head) = self.heap.pop_min() else {
            return Ok(None);
        };
        self.advance_iter(head.source)?;

        let mut winner = head;

        // Collapse all versions of the same key
        while self
            .heap
            .peek_min()
            .is_some_and(|next| next.value.key == winner.value.key)
        {
            // NOTE: We just peeked the item
            #[allow(clippy::expect_used)]
            let next = self.heap.pop_min().expect("item should exist");

            debug_assert_ne!(next.source, winner.source, "source is not strictly sorted");
            self.advance_iter(next.source)?;

            if next.source > winner.source {
                winner = next;
            }
        }

        Ok(Some(winner.value))
    }
}

impl<'a> Iterator for MergeIterator<'a> {
    type Item = crate::Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.initialized {
            if let Err(e) = self.initialize() {
                return Some(Err(e));
            }
        }

        loop {
            match self.pop_winner() {
                Ok(Some(item)) => {
                    if self.evict_tombstones && item.is_tombstone() {
                        continue;
                    }
                    return Some(Ok(item));
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TOMBSTONE;
    use test_log::test;

    fn source(items: Vec<Value>) -> BoxedIterator<'static> {
        Box::new(items.into_iter().map(Ok))
    }

    fn values(items: &[(i64, i64)]) -> Vec<Value> {
        items.iter().copied().map(Value::from).collect()
    }

    #[test]
    fn merge_non_overlapping() -> crate::Result<()> {
        let sources = (0..4)
            .map(|s| source((s * 5..(s + 1) * 5).map(|k| Value::new(k, s)).collect()))
            .collect();

        let items = MergeIterator::new(sources).collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(20, items.len());
        for (idx, item) in items.iter().enumerate() {
            assert_eq!(idx as i64, item.key);
        }

        Ok(())
    }

    #[test]
    fn merge_newest_source_wins() -> crate::Result<()> {
        let older = source(values(&[(1, 10), (2, 10), (3, 10)]));
        let newer = source(values(&[(1, 20), (3, 20)]));

        let items = MergeIterator::new(vec![older, newer]).collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(values(&[(1, 20), (2, 10), (3, 20)]), items);

        Ok(())
    }

    #[test]
    fn merge_newest_source_wins_regardless_of_value() -> crate::Result<()> {
        // The winning value sorts lower than the shadowed one
        let older = source(values(&[(7, 1_000)]));
        let middle = source(values(&[(7, 500)]));
        let newer = source(values(&[(7, -1)]));

        let items =
            MergeIterator::new(vec![older, middle, newer]).collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(values(&[(7, -1)]), items);

        Ok(())
    }

    #[test]
    fn merge_keeps_tombstones() -> crate::Result<()> {
        let older = source(values(&[(1, 10), (2, 10)]));
        let newer = source(values(&[(1, TOMBSTONE)]));

        let items = MergeIterator::new(vec![older, newer]).collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(values(&[(1, TOMBSTONE), (2, 10)]), items);

        Ok(())
    }

    #[test]
    fn merge_evicts_tombstones() -> crate::Result<()> {
        let older = source(values(&[(1, 10), (2, 10), (3, TOMBSTONE)]));
        let newer = source(values(&[(1, TOMBSTONE), (2, 20)]));

        let items = MergeIterator::new(vec![older, newer])
            .evict_tombstones(true)
            .collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(values(&[(2, 20)]), items);

        Ok(())
    }

    #[test]
    fn merge_older_tombstone_is_shadowed() -> crate::Result<()> {
        let older = source(values(&[(4, TOMBSTONE)]));
        let newer = source(values(&[(4, 44)]));

        let items = MergeIterator::new(vec![older, newer])
            .evict_tombstones(true)
            .collect::<crate::Result<Vec<_>>>()?;

        assert_eq!(values(&[(4, 44)]), items);

        Ok(())
    }

    #[test]
    fn merge_empty_sources() -> crate::Result<()> {
        let items = MergeIterator::new(vec![source(vec![]), source(vec![])])
            .collect::<crate::Result<Vec<_>>>()?;
        assert!(items.is_empty());

        let items = MergeIterator::new(vec![]).collect::<crate::Result<Vec<_>>>()?;
        assert!(items.is_empty());

        Ok(())
    }
}
