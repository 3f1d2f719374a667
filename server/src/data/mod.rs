use mines_common::models::{CellView, MarkState, Neighbours, Pos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub pos: Pos,
    pub revealed: bool,
    pub mine: bool,
    pub state: MarkState,
    pub neighbours: Neighbours,
}

impl Cell {
    pub fn new(pos: Pos) -> Self {
        Self {
            pos,
            revealed: false,
            mine: false,
            state: MarkState::Blank,
            neighbours: Neighbours::Count(0),
        }
    }

    pub fn is_marked_mine(&self) -> bool {
        self.state == MarkState::Mine
    }

    pub fn view(&self) -> CellView {
        if self.revealed {
            CellView::Revealed {
                neighbours: self.neighbours,
            }
        } else {
            CellView::Hidden { mark: self.state }
        }
    }
}
