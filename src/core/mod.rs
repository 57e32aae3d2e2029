//! Core module - pure game logic with no external dependencies
//!
//! This module contains all the game rules and state management.
//! It has zero dependencies on networking or I/O.

pub mod board;
pub mod game_state;
pub mod gravity;
pub mod merge;
pub mod queue;
pub mod scoring;
pub mod snapshot;

// Re-export commonly used types
pub use board::Board;
pub use game_state::{DropError, DropOutcome, GameState, PlaceOutcome};
pub use queue::{PendingQueue, QueueError};
pub use scoring::{board_total, ScoreTracker};
pub use snapshot::GameSnapshot;
