use mines_common::models::Pos;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    #[error("Board needs at least one row and one column, got {rows}x{columns}")]
    EmptyBoard { rows: usize, columns: usize },
    #[error("Board of {rows}x{columns} exceeds the limit of {max_cells} cells")]
    TooLarge {
        rows: usize,
        columns: usize,
        max_cells: usize,
    },
    #[error("Too many mines: {mines} requested but the board only has {cells} cells")]
    TooManyMines { mines: usize, cells: usize },
    #[error("Position {0} is outside the board")]
    OutOfBounds(Pos),
    #[error("Mine at {0} listed more than once")]
    DuplicateMine(Pos),
}

pub type Result<T> = std::result::Result<T, BoardError>;
