// SPDX-License-Identifier: MPL-2.0

use std::collections::BTreeMap;
use std::ops::Range;

/// Sparse map from timeline position to a value.
///
/// Every structural edit of the timeline must be mirrored here through
/// [`PositionIndex::insert_positions`] or [`PositionIndex::remove_positions`]
/// so that keys keep pointing at the same rows.
#[derive(Debug, Clone)]
pub struct PositionIndex<V> {
    entries: BTreeMap<usize, V>,
}

impl<V> Default for PositionIndex<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> PositionIndex<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&V> {
        self.entries.get(&position)
    }

    pub fn contains(&self, position: usize) -> bool {
        self.entries.contains_key(&position)
    }

    pub fn insert(&mut self, position: usize, value: V) -> Option<V> {
        self.entries.insert(position, value)
    }

    pub fn remove(&mut self, position: usize) -> Option<V> {
        self.entries.remove(&position)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entry with the highest position
    pub fn last(&self) -> Option<(usize, &V)> {
        self.entries.last_key_value().map(|(k, v)| (*k, v))
    }

    /// Entry with the lowest position `>= position`
    pub fn first_at_or_after(&self, position: usize) -> Option<(usize, &V)> {
        self.entries.range(position..).next().map(|(k, v)| (*k, v))
    }

    /// Entry with the highest position `< position`
    pub fn last_before(&self, position: usize) -> Option<(usize, &V)> {
        self.entries.range(..position).next_back().map(|(k, v)| (*k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// `count` rows were inserted at `at`: move every key `>= at` up.
    pub fn insert_positions(&mut self, at: usize, count: usize) {
        if count == 0 {
            return;
        }

        let moved = self.entries.split_off(&at);
        self.entries
            .extend(moved.into_iter().map(|(k, v)| (k + count, v)));
    }

    /// Rows `range` were removed: drop their keys and move every key after
    /// the range down. Returns the dropped values in position order.
    pub fn remove_positions(&mut self, range: Range<usize>) -> Vec<V> {
        if range.is_empty() {
            return Vec::new();
        }

        let count = range.end - range.start;
        let mut tail = self.entries.split_off(&range.start);
        let after = tail.split_off(&range.end);
        let removed = tail.into_values().collect();

        self.entries
            .extend(after.into_iter().map(|(k, v)| (k - count, v)));

        removed
    }
}
