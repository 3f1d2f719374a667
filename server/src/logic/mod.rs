use rand::Rng;
use tracing::{debug, info, instrument};

use mines_common::{
    models::{CellView, GameParams, MarkState, Neighbours, Pos},
    protocol::{ActionKind, BoardEvent, CellAction, CellUpdate, Phase},
};

use crate::{
    data::Cell,
    error::{BoardError, Result},
};

mod reveal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GameStatus {
    #[default]
    Playing,
    Won,
    Lost,
}

impl GameStatus {
    pub const fn is_over(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }

    pub const fn phase(self) -> Phase {
        match self {
            Self::Playing => Phase::Playing,
            Self::Won => Phase::Won,
            Self::Lost => Phase::Lost,
        }
    }
}

/// Result of applying one action to the board.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Cells whose view changed, in the order they changed.
    pub updates: Vec<CellUpdate>,
    /// Notification for the enclosing application, if any.
    pub event: Option<BoardEvent>,
}

impl Outcome {
    fn event(event: BoardEvent) -> Self {
        Self {
            updates: Vec::new(),
            event: Some(event),
        }
    }

    pub fn has_update(&self) -> bool {
        !self.updates.is_empty() || self.event.is_some()
    }
}

/// In-bounds 8-connected neighbours of `pos`. Edges never wrap.
pub fn neighbours(pos: Pos, rows: usize, columns: usize) -> impl Iterator<Item = Pos> {
    (-1isize..=1)
        .flat_map(|dr| (-1isize..=1).map(move |dc| (dr, dc)))
        .filter(|&(dr, dc)| dr != 0 || dc != 0)
        .filter_map(move |(dr, dc)| {
            let row = pos.row.checked_add_signed(dr)?;
            let column = pos.column.checked_add_signed(dc)?;
            (row < rows && column < columns).then_some(Pos { row, column })
        })
}

/// Largest board any constructor accepts, whatever the caller asks for.
pub const MAX_CELLS: usize = 1 << 20;

/// Checks that `params` describe a playable board of at most `max_cells` cells.
pub fn check_params(params: &GameParams, max_cells: usize) -> Result<()> {
    if params.rows == 0 || params.columns == 0 {
        return Err(BoardError::EmptyBoard {
            rows: params.rows,
            columns: params.columns,
        });
    }

    let too_large = BoardError::TooLarge {
        rows: params.rows,
        columns: params.columns,
        max_cells,
    };
    let cells = params.total_cells().ok_or(too_large)?;
    if cells > max_cells {
        return Err(too_large);
    }

    // rejection sampling never finishes on a full board, and a board with
    // no safe cell cannot be played
    if params.mines >= cells {
        return Err(BoardError::TooManyMines {
            mines: params.mines,
            cells,
        });
    }

    Ok(())
}

fn validate_params(params: &GameParams) -> Result<()> {
    check_params(params, MAX_CELLS)
}

fn empty_grid(params: &GameParams) -> Vec<Vec<Cell>> {
    (0..params.rows)
        .map(|row| {
            (0..params.columns)
                .map(|column| Cell::new(Pos { row, column }))
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Board {
    params: GameParams,
    grid: Vec<Vec<Cell>>,
    unrevealed: usize,
    status: GameStatus,
}

impl Board {
    /// Creates a board with mines placed by the thread-local generator.
    pub fn new(params: GameParams) -> Result<Self> {
        Self::with_rng(params, &mut rand::rng())
    }

    /// Creates a board, sampling mine positions from `rng`.
    #[instrument(level = "trace", skip(rng))]
    pub fn with_rng<R: Rng + ?Sized>(params: GameParams, rng: &mut R) -> Result<Self> {
        validate_params(&params)?;
        let mut grid = empty_grid(&params);

        let mut mines = params.mines;
        while mines > 0 {
            let row = rng.random_range(0..params.rows);
            let column = rng.random_range(0..params.columns);
            let cell = &mut grid[row][column];
            if !cell.mine {
                cell.mine = true;
                mines -= 1;
            }
        }

        Ok(Self::from_grid(params, grid))
    }

    /// Creates a board with mines at exactly `mines`; `params.mines` is ignored.
    pub fn with_mines(params: GameParams, mines: &[Pos]) -> Result<Self> {
        let params = GameParams {
            mines: mines.len(),
            ..params
        };
        validate_params(&params)?;
        let mut grid = empty_grid(&params);

        for &pos in mines {
            let cell = grid
                .get_mut(pos.row)
                .and_then(|row| row.get_mut(pos.column))
                .ok_or(BoardError::OutOfBounds(pos))?;
            if cell.mine {
                return Err(BoardError::DuplicateMine(pos));
            }
            cell.mine = true;
        }

        Ok(Self::from_grid(params, grid))
    }

    fn from_grid(params: GameParams, grid: Vec<Vec<Cell>>) -> Self {
        let unrevealed = grid.iter().map(Vec::len).sum();
        let mut board = Self {
            params,
            grid,
            unrevealed,
            status: GameStatus::Playing,
        };
        board.count_neighbours();
        debug!(
            "Initialized {}x{} board with {} mines",
            params.rows, params.columns, params.mines
        );
        board
    }

    fn count_neighbours(&mut self) {
        let GameParams { rows, columns, .. } = self.params;
        for row in 0..rows {
            for column in 0..columns {
                let pos = Pos { row, column };
                let value = if self.grid[row][column].mine {
                    Neighbours::Mine
                } else {
                    let count = neighbours(pos, rows, columns)
                        .filter(|adjacent| self.grid[adjacent.row][adjacent.column].mine)
                        .count();
                    Neighbours::Count(count as u8)
                };
                self.grid[row][column].neighbours = value;
            }
        }
    }

    pub fn params(&self) -> GameParams {
        self.params
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_over(&self) -> bool {
        self.status.is_over()
    }

    pub fn is_won(&self) -> bool {
        self.status == GameStatus::Won
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.row < self.params.rows && pos.column < self.params.columns
    }

    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        self.grid.get(pos.row)?.get(pos.column)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.grid.iter().flatten()
    }

    pub fn snapshot(&self) -> Vec<Vec<CellView>> {
        self.grid
            .iter()
            .map(|row| row.iter().map(Cell::view).collect())
            .collect()
    }

    /// Mines left to find: the mine total minus cells flagged as mines while
    /// playing, the mine total once the game is over. Can go negative.
    pub fn remaining_mines(&self) -> i64 {
        let mines = self.params.mines as i64;
        if self.is_over() {
            return mines;
        }
        mines - self.cells().filter(|cell| cell.is_marked_mine()).count() as i64
    }

    fn count_unrevealed(&self) -> usize {
        self.cells().filter(|cell| !cell.revealed).count()
    }

    /// Whether `action` would change anything. Out-of-grid actions never do.
    pub fn accepts(&self, action: &CellAction) -> bool {
        if self.is_over() {
            return true;
        }
        let Some(cell) = self.cell(action.cell) else {
            return false;
        };
        match action.kind {
            ActionKind::Mark => !cell.revealed,
            ActionKind::Reveal => !cell.revealed && !cell.is_marked_mine(),
            ActionKind::RevealNeighbours => cell.revealed,
        }
    }

    /// Applies one player action. A finished board answers every action with
    /// [`BoardEvent::NewGame`] and stays as it is.
    #[instrument(level = "trace", skip(self), fields(row = action.cell.row, column = action.cell.column))]
    pub fn apply(&mut self, action: CellAction) -> Result<Outcome> {
        if self.is_over() {
            debug!("Board is finished, requesting a new game");
            return Ok(Outcome::event(BoardEvent::NewGame));
        }

        if !self.contains(action.cell) {
            return Err(BoardError::OutOfBounds(action.cell));
        }

        Ok(match action.kind {
            ActionKind::Mark => self.mark(action.cell),
            ActionKind::Reveal => self.reveal(action.cell),
            ActionKind::RevealNeighbours => self.reveal_neighbours(action.cell),
        })
    }

    fn mark(&mut self, pos: Pos) -> Outcome {
        let cell = &mut self.grid[pos.row][pos.column];
        if cell.revealed {
            debug!("Ignoring mark on revealed cell {}", pos);
            return Outcome::default();
        }

        cell.state = cell.state.next();
        debug!("Cell {} marked as {}", pos, cell.state.name());
        Outcome {
            updates: vec![CellUpdate {
                pos,
                value: cell.view(),
            }],
            event: None,
        }
    }

    fn reveal(&mut self, pos: Pos) -> Outcome {
        let cell = &mut self.grid[pos.row][pos.column];
        if cell.revealed || cell.is_marked_mine() {
            debug!("Ignoring reveal on revealed or flagged cell {}", pos);
            return Outcome::default();
        }
        cell.state = MarkState::Blank;

        self.unrevealed = self.count_unrevealed();
        let mut changed = Vec::new();
        let status = self.flood_reveal(pos, &mut changed);
        self.finish(changed, status)
    }

    fn reveal_neighbours(&mut self, pos: Pos) -> Outcome {
        if !self.grid[pos.row][pos.column].revealed {
            debug!("Ignoring neighbour reveal around hidden cell {}", pos);
            return Outcome::default();
        }

        self.unrevealed = self.count_unrevealed();
        let mut changed = Vec::new();
        let mut status = None;
        for adjacent in neighbours(pos, self.params.rows, self.params.columns) {
            if self.grid[adjacent.row][adjacent.column].is_marked_mine() {
                continue;
            }
            status = self.flood_reveal(adjacent, &mut changed);
            if status.is_some() {
                break;
            }
        }
        self.finish(changed, status)
    }

    fn finish(&mut self, mut changed: Vec<Pos>, status: Option<GameStatus>) -> Outcome {
        let event = status.map(|status| self.end_game(status, &mut changed));
        Outcome {
            updates: changed
                .into_iter()
                .map(|pos| CellUpdate {
                    pos,
                    value: self.grid[pos.row][pos.column].view(),
                })
                .collect(),
            event,
        }
    }

    /// Freezes the board and force-reveals every cell, marking cells that were
    /// wrongly flagged as mines.
    fn end_game(&mut self, status: GameStatus, changed: &mut Vec<Pos>) -> BoardEvent {
        self.status = status;

        for cell in self.grid.iter_mut().flatten() {
            if cell.revealed {
                continue;
            }
            cell.revealed = true;
            if !cell.mine && cell.is_marked_mine() {
                cell.neighbours = Neighbours::Misflagged;
            }
            changed.push(cell.pos);
        }
        self.unrevealed = 0;

        if status == GameStatus::Won {
            info!("Game won! All safe cells revealed.");
            BoardEvent::Win
        } else {
            info!("Game lost, a mine was revealed");
            BoardEvent::GameOver
        }
    }
}
