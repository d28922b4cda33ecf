// SPDX-License-Identifier: MPL-2.0

use crate::feed::GapId;
use std::collections::HashMap;
use std::ops::Range;

/// Tracks where every live gap placeholder sits in the timeline
#[derive(Debug)]
pub struct GapRegistry {
    next_id: u64,
    positions: HashMap<GapId, usize>,
}

impl Default for GapRegistry {
    fn default() -> Self {
        Self {
            next_id: 1,
            positions: HashMap::new(),
        }
    }
}

impl GapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh id, never handed out before by this registry
    pub fn allocate(&mut self) -> GapId {
        let id = GapId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn register(&mut self, id: GapId, position: usize) {
        if let Some(old) = self.positions.insert(id, position) {
            tracing::warn!("gap {id} re-registered, was at {old}, now at {position}");
        }
    }

    pub fn position(&self, id: GapId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GapId, usize)> + '_ {
        self.positions.iter().map(|(id, pos)| (*id, *pos))
    }

    /// Forget all gaps. Ids keep counting up so a stale id from before the
    /// reset can never resolve to a new gap.
    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn insert_positions(&mut self, at: usize, count: usize) {
        for pos in self.positions.values_mut() {
            if *pos >= at {
                *pos += count;
            }
        }
    }

    /// Rows `range` were removed. Gaps inside the range are dropped and
    /// returned.
    pub fn remove_positions(&mut self, range: Range<usize>) -> Vec<GapId> {
        if range.is_empty() {
            return Vec::new();
        }

        let count = range.end - range.start;
        let mut dropped = Vec::new();

        self.positions.retain(|id, pos| {
            if range.contains(pos) {
                dropped.push(*id);
                false
            } else {
                if *pos >= range.end {
                    *pos -= count;
                }
                true
            }
        });

        dropped.sort();
        dropped
    }
}
