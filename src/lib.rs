//! Mergefall - a drop-and-merge puzzle engine
//!
//! The core is pure, deterministic, and testable: a 5x5 board accepts
//! power-of-two blocks dropped into columns, cascades equal-neighbor merges
//! by doubling, re-settles under gravity, and derives scores from the board.
//! It has **zero dependencies** on networking or I/O; the TCP control
//! adapter lives in its own module on top.
//!
//! # Module Structure
//!
//! - [`core::board`]: 5x5 grid with bottom-up column scanning
//! - [`core::merge`]: recursive cascade merges from the placement cell
//! - [`core::gravity`]: per-column compaction toward the bottom row
//! - [`core::scoring`]: derived current score and monotonic high score
//! - [`core::queue`]: bounded (3) pending-block queue
//! - [`core::game_state`]: session orchestration (drop, place, restart)
//! - [`adapter`]: line-delimited JSON control protocol over TCP
//! - [`observe`]: read-only observer client for a running engine
//!
//! # Game Rules
//!
//! - Blocks land on the lowest empty row of the chosen column
//! - Equal orthogonal neighbors merge into a doubled block; the scan order
//!   is up, down, left, right, and only the first match merges per step
//! - Each merged block re-checks its neighbors, so chains cascade
//!   depth-first from the drop point
//! - After the cascade, every column compacts so nothing floats
//! - A miss block is discarded on placement and never touches the board
//!
//! # Example
//!
//! ```
//! use mergefall::core::GameState;
//! use mergefall::types::PendingBlock;
//!
//! let mut game = GameState::new();
//!
//! // Stage and place two equal blocks side by side: they merge.
//! game.enqueue(PendingBlock::Numeric(2)).unwrap();
//! game.place_block(PendingBlock::Numeric(2), 0).unwrap();
//! game.enqueue(PendingBlock::Numeric(2)).unwrap();
//! game.place_block(PendingBlock::Numeric(2), 1).unwrap();
//!
//! assert_eq!(game.current_score(), 4);
//! assert_eq!(game.board().get(4, 1), Some(4));
//! ```

pub mod adapter;
pub mod core;
pub mod observe;
pub mod types;

// Re-export commonly used types for convenience
pub use crate::core::{
    board_total, Board, DropError, DropOutcome, GameSnapshot, GameState, PendingQueue,
    PlaceOutcome, QueueError, ScoreTracker,
};
pub use crate::types::{Cell, DropEvent, PendingBlock};
