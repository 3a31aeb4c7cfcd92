//! Undo snapshots of the loop buffer.

use std::sync::Arc;

use crate::buffers::LoopBuffer;
use crate::error::{Error, Result};

/// A saved copy of the loop. Buffers are immutable so sharing the `Arc`
/// is as good as a deep copy.
pub type Snapshot = Arc<LoopBuffer>;

/// LIFO stack of snapshots, one per overdub, unbounded.
#[derive(Default)]
pub struct UndoHistory {
    snapshots: Vec<Snapshot>,
}

impl UndoHistory {
    pub fn new() -> UndoHistory {
        UndoHistory { snapshots: Vec::new() }
    }

    pub fn push(self: &mut Self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn pop(self: &mut Self) -> Result<Snapshot> {
        self.snapshots.pop().ok_or(Error::NothingToUndo)
    }

    pub fn clear(self: &mut Self) {
        self.snapshots.clear();
    }

    pub fn len(self: &Self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.snapshots.is_empty()
    }
}
