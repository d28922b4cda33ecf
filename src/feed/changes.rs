// SPDX-License-Identifier: MPL-2.0

use std::sync::mpsc::{Receiver, Sender, channel};

/// Fields of a row that can change without the row being replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostField {
    LikeCount,
    LikeUri,
    RepostCount,
    RepostUri,
    ReplyCount,
    Deleted,
}

/// Range based change notification. Ranges are inclusive and refer to
/// positions after the change was applied (for removals: before).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedChange {
    Inserted { first: usize, last: usize },
    Removed { first: usize, last: usize },
    Changed {
        first: usize,
        last: usize,
        fields: Vec<PostField>,
    },
    /// Everything is gone, observers should drop their view
    Reset,
}

impl FeedChange {
    pub(crate) fn inserted(at: usize, count: usize) -> Option<Self> {
        (count > 0).then(|| FeedChange::Inserted {
            first: at,
            last: at + count - 1,
        })
    }

    pub(crate) fn removed(at: usize, count: usize) -> Option<Self> {
        (count > 0).then(|| FeedChange::Removed {
            first: at,
            last: at + count - 1,
        })
    }
}

/// Fans changes out to every subscriber; receivers that were dropped are
/// forgotten on the next send.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: Vec<Sender<FeedChange>>,
}

impl ChangeNotifier {
    pub fn subscribe(&mut self) -> Receiver<FeedChange> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, change: FeedChange) {
        self.subscribers
            .retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
