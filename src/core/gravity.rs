//! Gravity module - per-column compaction
//!
//! After merges clear cells, each column is compacted so that no empty cell
//! lies beneath a filled one. Columns do not interact, and a second pass
//! with no intervening mutation is a no-op.

use crate::core::Board;
use crate::types::{BOARD_COLS, BOARD_ROWS};

/// Compact every column toward the bottom, preserving the relative
/// top-to-bottom order of filled cells.
///
/// Uses a bottom-up two-pointer sweep per column with zero allocation.
/// Returns whether any cell moved.
pub fn apply(board: &mut Board) -> bool {
    let mut moved = false;

    for col in 0..BOARD_COLS {
        let mut write_row = BOARD_ROWS;

        // Scan from the bottom row upward; each filled cell drops into the
        // lowest slot not yet written.
        for read_row in (0..BOARD_ROWS).rev() {
            if let Some(value) = board.get(read_row, col) {
                write_row -= 1;
                if write_row != read_row {
                    board.set(write_row, col, value);
                    board.clear(read_row, col);
                    moved = true;
                }
            }
        }
    }

    moved
}
