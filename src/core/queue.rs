//! Queue module - the bounded pending-block queue
//!
//! Holds up to three blocks awaiting placement. Insertion order is the only
//! meaningful order; the external collaborator chooses which entry to place.

use arrayvec::ArrayVec;

use crate::types::{PendingBlock, QUEUE_CAPACITY};

/// Queue operation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    QueueFull,
    NotFound,
}

impl QueueError {
    pub fn code(self) -> &'static str {
        match self {
            QueueError::QueueFull => "queue_full",
            QueueError::NotFound => "not_found",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            QueueError::QueueFull => "pending queue already holds 3 blocks",
            QueueError::NotFound => "block is not in the pending queue",
        }
    }
}

/// Bounded holding area for blocks awaiting placement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingQueue {
    blocks: ArrayVec<PendingBlock, QUEUE_CAPACITY>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.blocks.is_full()
    }

    /// The pending blocks in insertion order
    pub fn blocks(&self) -> &[PendingBlock] {
        &self.blocks
    }

    /// Append a block; fails with `QueueFull` at capacity (no state change).
    pub fn enqueue(&mut self, block: PendingBlock) -> Result<(), QueueError> {
        self.blocks
            .try_push(block)
            .map_err(|_| QueueError::QueueFull)
    }

    /// Remove the first entry equal to `block`; `NotFound` if absent.
    pub fn remove(&mut self, block: &PendingBlock) -> Result<(), QueueError> {
        match self.blocks.iter().position(|b| b == block) {
            Some(index) => {
                self.blocks.remove(index);
                Ok(())
            }
            None => Err(QueueError::NotFound),
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
