use mines_common::models::{Neighbours, Pos};

use super::{Board, GameStatus, neighbours};

impl Board {
    /// Reveals `start` and, through zero-count cells, everything connected to it.
    ///
    /// Works off an explicit stack; the `revealed` flag doubles as the visited
    /// set, so no cell is revealed twice. Every newly revealed position is
    /// appended to `revealed`. Returns the terminal status as soon as a mine is
    /// hit or the last safe cell is opened, leaving the rest of the stack
    /// untouched. `self.unrevealed` must be current when this is called.
    pub(super) fn flood_reveal(
        &mut self,
        start: Pos,
        revealed: &mut Vec<Pos>,
    ) -> Option<GameStatus> {
        let mut pending = vec![start];

        while let Some(pos) = pending.pop() {
            if !self.contains(pos) {
                continue;
            }
            let cell = &mut self.grid[pos.row][pos.column];
            if cell.revealed || cell.is_marked_mine() {
                continue;
            }

            cell.revealed = true;
            self.unrevealed -= 1;
            revealed.push(pos);

            if cell.mine {
                cell.neighbours = Neighbours::Exploded;
                return Some(GameStatus::Lost);
            }

            if self.unrevealed == self.params.mines {
                return Some(GameStatus::Won);
            }

            if cell.neighbours == Neighbours::Count(0) {
                pending.extend(neighbours(pos, self.params.rows, self.params.columns));
            }
        }

        None
    }
}
