//! Merge module - cascading merge resolution
//!
//! Given a just-placed cell, merges it with an equal-valued orthogonal
//! neighbor, doubling the value, and cascades depth-first from each newly
//! created cell. The cascade operates on an exclusively-owned board
//! reference so it is testable without any rendering surface.

use crate::core::Board;
use crate::types::{BOARD_COLS, BOARD_ROWS};

/// Neighbor scan order: up, down, left, right.
///
/// When a cell has more than one equal-valued neighbor, only the first match
/// in this order merges; the rest are left alone for that call.
const NEIGHBOR_ORDER: [(i8, i8); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Resolve merges starting from `(row, col)`, returning the number of merges
/// performed along the cascade.
///
/// At most one neighbor merges per call: both cells are cleared, the doubled
/// value is placed at the lowest empty row of the origin's column, and
/// resolution recurses from the new cell. Recursion depth is bounded by the
/// number of cells on the board, so there is no extra termination logic.
pub fn resolve(board: &mut Board, row: usize, col: usize) -> u32 {
    let Some(value) = board.get(row, col) else {
        return 0;
    };

    for (dr, dc) in NEIGHBOR_ORDER {
        let nr = row as i8 + dr;
        let nc = col as i8 + dc;
        if nr < 0 || nr >= BOARD_ROWS as i8 || nc < 0 || nc >= BOARD_COLS as i8 {
            continue;
        }
        let (nr, nc) = (nr as usize, nc as usize);

        if board.get(nr, nc) != Some(value) {
            continue;
        }

        board.clear(row, col);
        board.clear(nr, nc);

        let doubled = value * 2;
        return match board.lowest_empty_row(col) {
            Some(new_row) => {
                board.set(new_row, col, doubled);
                1 + resolve(board, new_row, col)
            }
            // Clearing the origin freed a row in this column, so this arm is
            // unreachable through the engine's own call paths; if it ever
            // fires the doubled value is dropped rather than placed.
            None => 1,
        };
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_on_empty_cell_is_noop() {
        let mut board = Board::new();
        assert_eq!(resolve(&mut board, 4, 0), 0);
        assert!(board.cells().iter().all(|cell| cell.is_none()));
    }

    #[test]
    fn test_no_matching_neighbor_leaves_board_unchanged() {
        let mut board = Board::from_rows([
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [2, 4, 0, 0, 0],
        ]);
        let before = board.clone();
        assert_eq!(resolve(&mut board, 4, 1), 0);
        assert_eq!(board, before);
    }

    #[test]
    fn test_horizontal_merge_lands_in_origin_column() {
        // 2 already at (4,0); a 2 just placed at (4,1) merges left and the
        // doubled value lands in the origin's column, not the neighbor's.
        let mut board = Board::from_rows([
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [2, 2, 0, 0, 0],
        ]);
        assert_eq!(resolve(&mut board, 4, 1), 1);
        assert_eq!(board.get(4, 0), None);
        assert_eq!(board.get(4, 1), Some(4));
    }

    #[test]
    fn test_vertical_merge_doubles_in_place() {
        // 2 at the bottom, 2 just placed on top of it.
        let mut board = Board::from_rows([
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 2, 0, 0],
            [0, 0, 2, 0, 0],
        ]);
        assert_eq!(resolve(&mut board, 3, 2), 1);
        assert_eq!(board.get(4, 2), Some(4));
        assert_eq!(board.get(3, 2), None);
    }

    #[test]
    fn test_merge_priority_up_first() {
        // Both the up and left neighbors hold 4; only up merges.
        let mut board = Board::from_rows([
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 4, 0, 0, 0],
            [4, 4, 0, 0, 0],
            [8, 8, 0, 0, 0],
        ]);
        resolve(&mut board, 3, 1);
        // Up (2,1) merged with origin (3,1): left neighbor (3,0) untouched,
        // doubled 8 landed at (3,1) (row 2 stays empty until gravity)
        // and cascaded with the 8 below into 16.
        assert_eq!(board.get(3, 0), Some(4));
        assert_eq!(board.get(2, 1), None);
        assert_eq!(board.get(4, 1), Some(16));
    }

    #[test]
    fn test_single_merge_per_call() {
        // Equal neighbors on both sides; only the left one (earlier in scan
        // order) merges, the right one survives the call.
        let mut board = Board::from_rows([
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [2, 2, 2, 0, 0],
        ]);
        assert_eq!(resolve(&mut board, 4, 1), 1);
        assert_eq!(board.get(4, 0), None);
        assert_eq!(board.get(4, 1), Some(4));
        assert_eq!(board.get(4, 2), Some(2));
    }

    #[test]
    fn test_cascade_chain_merges_twice() {
        // 4 at (4,0), 2 at (4,1); resolving a 2 placed at (3,1) first merges
        // down (2+2 -> 4 at (4,1)), then the new 4 merges left (4+4 -> 8).
        let mut board = Board::from_rows([
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 2, 0, 0, 0],
            [4, 2, 0, 0, 0],
        ]);
        assert_eq!(resolve(&mut board, 3, 1), 2);
        let mut filled: Vec<u32> = board.cells().iter().flatten().copied().collect();
        filled.sort_unstable();
        assert_eq!(filled, vec![8]);
        assert_eq!(board.get(4, 1), Some(8));
    }

    #[test]
    fn test_cascade_counts_each_doubling() {
        // 2,2 stacked beside 4 beside 8: placing the trigger runs a 3-merge
        // chain 2+2 -> 4, 4+4 -> 8, 8+8 -> 16.
        let mut board = Board::from_rows([
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0],
            [0, 2, 0, 0, 0],
            [4, 2, 8, 0, 0],
        ]);

        // Chain: (3,1)+(4,1) -> 4 at (4,1); + (4,0) -> 8 at (4,1); + (4,2) -> 16.
        assert_eq!(resolve(&mut board, 3, 1), 3);
        assert_eq!(board.get(4, 1), Some(16));
        assert_eq!(board.get(4, 0), None);
        assert_eq!(board.get(4, 2), None);
    }
}
