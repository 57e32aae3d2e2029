//! Game state module - manages the complete session state
//!
//! Ties together the core components: board, pending queue, merge
//! resolution, gravity, and scoring. Every operation runs to completion
//! (including the full merge/gravity/score cascade) before returning.

use crate::core::{gravity, merge, scoring::ScoreTracker, Board, PendingQueue, QueueError};
use crate::types::{is_palette_value, DropEvent, PendingBlock, BOARD_COLS};

/// Drop failure: the target column has no free cell.
///
/// Game-rule failures are local and non-fatal; the board, queue, and scores
/// are left exactly as before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropError {
    ColumnFull,
}

impl DropError {
    pub fn code(self) -> &'static str {
        match self {
            DropError::ColumnFull => "column_full",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DropError::ColumnFull => "column has no free cell",
        }
    }
}

/// Result of a successful drop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropOutcome {
    /// Where the block landed before any cascade (for UI sync).
    pub row: usize,
    pub column: usize,
    /// Number of merges the cascade performed.
    pub merges: u32,
    /// Current score after the board settled.
    pub score: u32,
}

/// Result of placing a pending block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// A numeric block entered the board.
    Placed(DropOutcome),
    /// A miss block was discarded; board and scores untouched.
    Discarded,
}

/// Complete session state
#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    queue: PendingQueue,
    score: ScoreTracker,
    /// Monotonic episode id (increments on restart).
    episode_id: u32,
    /// Monotonic id for completed drops (increments only on success).
    drop_id: u32,
    /// Last completed drop (consumed by observers).
    last_event: Option<DropEvent>,
}

impl GameState {
    /// Create a new session with an empty board and queue
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            queue: PendingQueue::new(),
            score: ScoreTracker::new(),
            episode_id: 0,
            drop_id: 0,
            last_event: None,
        }
    }

    /// Start a fresh session: board, queue, and current score reset, the
    /// high score persists, and the episode id increments.
    pub fn restart(&mut self) {
        self.board.clear_all();
        self.queue.clear();
        self.score.reset();
        self.episode_id = self.episode_id.wrapping_add(1);
        self.drop_id = 0;
        self.last_event = None;
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    #[cfg(test)]
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    /// Pending blocks in insertion order
    pub fn pending_blocks(&self) -> &[PendingBlock] {
        self.queue.blocks()
    }

    pub fn current_score(&self) -> u32 {
        self.score.current()
    }

    pub fn high_score(&self) -> u32 {
        self.score.high()
    }

    pub fn episode_id(&self) -> u32 {
        self.episode_id
    }

    pub fn drop_id(&self) -> u32 {
        self.drop_id
    }

    /// Add a block to the pending queue
    pub fn enqueue(&mut self, block: PendingBlock) -> Result<(), QueueError> {
        self.queue.enqueue(block)
    }

    /// Remove a pending block without placing it
    pub fn discard(&mut self, block: &PendingBlock) -> Result<(), QueueError> {
        self.queue.remove(block)
    }

    /// Drop a palette value into a column: place at the lowest free row,
    /// cascade merges from the landing cell, re-settle, recompute scores.
    ///
    /// `column` and `value` are caller contract (the queue/protocol layer
    /// validates them); violations panic rather than surface as game errors.
    pub fn drop_block(&mut self, column: usize, value: u32) -> Result<DropOutcome, DropError> {
        assert!(column < BOARD_COLS, "column {} out of range", column);
        assert!(is_palette_value(value), "value {} not in palette", value);

        let Some(row) = self.board.lowest_empty_row(column) else {
            return Err(DropError::ColumnFull);
        };

        self.board.set(row, column, value);
        let merges = merge::resolve(&mut self.board, row, column);
        gravity::apply(&mut self.board);
        let score = self.score.recompute(&self.board);
        debug_assert!(self.board.settled(), "board must settle after a drop");

        self.drop_id = self.drop_id.wrapping_add(1);
        let outcome = DropOutcome {
            row,
            column,
            merges,
            score,
        };
        self.last_event = Some(DropEvent {
            row,
            column,
            value,
            merges,
            score,
        });

        Ok(outcome)
    }

    /// Place a pending block into a column.
    ///
    /// A miss block is discarded without touching the board or scores. A
    /// numeric block goes through [`Self::drop_block`] first and leaves the
    /// queue only on success, so a `ColumnFull` failure changes nothing.
    pub fn place_block(
        &mut self,
        block: PendingBlock,
        column: usize,
    ) -> Result<PlaceOutcome, DropError> {
        match block {
            PendingBlock::Miss => {
                // Absent blocks are tolerated: removal is a no-op.
                let _ = self.queue.remove(&block);
                Ok(PlaceOutcome::Discarded)
            }
            PendingBlock::Numeric(value) => {
                let outcome = self.drop_block(column, value)?;
                let _ = self.queue.remove(&block);
                Ok(PlaceOutcome::Placed(outcome))
            }
        }
    }

    /// Take and clear the last drop event.
    pub fn take_last_event(&mut self) -> Option<DropEvent> {
        self.last_event.take()
    }

    pub fn snapshot_into(&self, out: &mut crate::core::snapshot::GameSnapshot) {
        self.board.write_grid(&mut out.board);

        out.pending = [None; crate::types::QUEUE_CAPACITY];
        for (slot, block) in out.pending.iter_mut().zip(self.queue.blocks()) {
            *slot = Some(*block);
        }

        out.episode_id = self.episode_id;
        out.drop_id = self.drop_id;
        out.score = self.score.current();
        out.high_score = self.score.high();
        out.last_event = self.last_event;
    }

    pub fn snapshot(&self) -> crate::core::snapshot::GameSnapshot {
        let mut s = crate::core::snapshot::GameSnapshot::default();
        self.snapshot_into(&mut s);
        s
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
