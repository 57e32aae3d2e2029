use crate::types::{DropEvent, PendingBlock, BOARD_COLS, BOARD_ROWS, QUEUE_CAPACITY};

/// Plain-data read model of a whole session, cheap to copy and hand to
/// observers without exposing the live engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSnapshot {
    /// Dense grid, 0 = empty.
    pub board: [[u32; BOARD_COLS]; BOARD_ROWS],
    /// Pending blocks in insertion order; trailing slots are None.
    pub pending: [Option<PendingBlock>; QUEUE_CAPACITY],
    pub episode_id: u32,
    pub drop_id: u32,
    pub score: u32,
    pub high_score: u32,
    pub last_event: Option<DropEvent>,
}

impl GameSnapshot {
    pub fn clear(&mut self) {
        self.board = [[0u32; BOARD_COLS]; BOARD_ROWS];
        self.pending = [None; QUEUE_CAPACITY];
        self.episode_id = 0;
        self.drop_id = 0;
        self.score = 0;
        self.high_score = 0;
        self.last_event = None;
    }

    /// Number of occupied pending slots
    pub fn pending_len(&self) -> usize {
        self.pending.iter().flatten().count()
    }
}

impl Default for GameSnapshot {
    fn default() -> Self {
        let mut s = Self {
            board: [[0u32; BOARD_COLS]; BOARD_ROWS],
            pending: [None; QUEUE_CAPACITY],
            episode_id: 0,
            drop_id: 0,
            score: 0,
            high_score: 0,
            last_event: None,
        };
        s.clear();
        s
    }
}
