//! End-to-end engine scenarios through the public API

use mergefall::core::{DropError, GameState, PlaceOutcome, QueueError};
use mergefall::types::PendingBlock;

#[test]
fn test_first_drop_lands_on_bottom_row() {
    let mut state = GameState::new();

    let outcome = state.drop_block(0, 2).unwrap();

    assert_eq!((outcome.row, outcome.column), (4, 0));
    assert_eq!(state.board().get(4, 0), Some(2));
    assert_eq!(state.current_score(), 2);
    assert_eq!(state.high_score(), 2);
}

#[test]
fn test_adjacent_equal_drops_merge() {
    let mut state = GameState::new();
    state.drop_block(0, 2).unwrap();
    state.drop_block(1, 2).unwrap();

    // Both 2s cleared, one 4 on the bottom row, score follows the board.
    let filled: Vec<u32> = state.board().cells().iter().flatten().copied().collect();
    assert_eq!(filled, vec![4]);
    assert_eq!(state.current_score(), 4);
}

#[test]
fn test_stacked_chain_collapses_to_single_cell() {
    // Build a column pair where one more 2 cascades twice: 2+2 -> 4,
    // then the fresh 4 meets the neighboring 4 -> 8.
    let mut state = GameState::new();
    state.drop_block(0, 4).unwrap();
    state.drop_block(1, 2).unwrap();

    let outcome = state.drop_block(1, 2).unwrap();

    assert_eq!(outcome.merges, 2);
    let filled: Vec<u32> = state.board().cells().iter().flatten().copied().collect();
    assert_eq!(filled, vec![8]);
    assert_eq!(state.current_score(), 8);
    assert!(state.board().settled());
}

#[test]
fn test_full_column_rejects_sixth_drop() {
    let mut state = GameState::new();
    for value in [2, 4, 8, 16, 32] {
        state.drop_block(0, value).unwrap();
    }

    let before = state.board().clone();
    assert_eq!(state.drop_block(0, 64), Err(DropError::ColumnFull));
    assert_eq!(state.board(), &before);
    assert_eq!(state.current_score(), 62);
}

#[test]
fn test_queue_holds_at_most_three() {
    let mut state = GameState::new();
    for value in [2, 4, 8] {
        assert!(state.enqueue(PendingBlock::Numeric(value)).is_ok());
    }

    assert_eq!(
        state.enqueue(PendingBlock::Numeric(16)),
        Err(QueueError::QueueFull)
    );
    assert_eq!(
        state.pending_blocks(),
        &[
            PendingBlock::Numeric(2),
            PendingBlock::Numeric(4),
            PendingBlock::Numeric(8),
        ]
    );
}

#[test]
fn test_miss_placement_short_circuits_the_board() {
    let mut state = GameState::new();
    state.drop_block(3, 256).unwrap();
    state.enqueue(PendingBlock::Miss).unwrap();

    let outcome = state.place_block(PendingBlock::Miss, 3).unwrap();

    assert_eq!(outcome, PlaceOutcome::Discarded);
    assert!(state.pending_blocks().is_empty());
    assert_eq!(state.board().get(4, 3), Some(256));
    assert_eq!(state.current_score(), 256);
}

#[test]
fn test_session_restart_preserves_high_score() {
    let mut state = GameState::new();
    state.drop_block(0, 2048).unwrap();
    state.drop_block(1, 2).unwrap();
    assert_eq!(state.high_score(), 2050);

    state.restart();

    assert_eq!(state.episode_id(), 1);
    assert_eq!(state.current_score(), 0);
    assert_eq!(state.high_score(), 2050);
    assert!(state.board().cells().iter().all(|cell| cell.is_none()));

    // A fresh session scores independently but the high water mark stays.
    state.drop_block(2, 8).unwrap();
    assert_eq!(state.current_score(), 8);
    assert_eq!(state.high_score(), 2050);
}

#[test]
fn test_invariants_hold_across_a_long_session() {
    let mut state = GameState::new();
    let moves = [
        (0, 2),
        (0, 2),
        (1, 4),
        (2, 4),
        (1, 2),
        (3, 8),
        (2, 8),
        (0, 16),
        (4, 2),
        (4, 2),
        (3, 4),
        (1, 32),
        (2, 2),
        (0, 2),
    ];

    let mut prev_high = 0;
    for (column, value) in moves {
        let _ = state.drop_block(column, value);

        assert!(state.board().settled(), "no floating blocks after a drop");
        assert_eq!(
            state.current_score(),
            mergefall::core::board_total(state.board()),
            "score always equals the board sum"
        );
        assert!(state.high_score() >= prev_high, "high score never decreases");
        prev_high = state.high_score();
    }
}
