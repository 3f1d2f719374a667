use serde::{Deserialize, Serialize};

use crate::models::{CellView, Digits, GameParams, Pos};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "mark")]
    Mark { cell: Pos },
    #[serde(rename = "reveal")]
    Reveal { cell: Pos },
    #[serde(rename = "reveal-neighbours")]
    RevealNeighbours { cell: Pos },
    #[serde(rename = "end-game")]
    EndGame,
    #[serde(rename = "restart")]
    Restart { params: GameParams },
}

impl ClientMessage {
    /// The board action carried by this message, if it is one.
    pub fn cell_action(&self) -> Option<CellAction> {
        let (kind, cell) = match *self {
            Self::Mark { cell } => (ActionKind::Mark, cell),
            Self::Reveal { cell } => (ActionKind::Reveal, cell),
            Self::RevealNeighbours { cell } => (ActionKind::RevealNeighbours, cell),
            Self::EndGame | Self::Restart { .. } => return None,
        };
        Some(CellAction { kind, cell })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Mark,
    Reveal,
    RevealNeighbours,
}

impl ActionKind {
    pub const fn is_reveal(self) -> bool {
        matches!(self, Self::Reveal | Self::RevealNeighbours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CellAction {
    pub kind: ActionKind,
    pub cell: Pos,
}

impl CellAction {
    pub const fn mark(cell: Pos) -> Self {
        Self {
            kind: ActionKind::Mark,
            cell,
        }
    }

    pub const fn reveal(cell: Pos) -> Self {
        Self {
            kind: ActionKind::Reveal,
            cell,
        }
    }

    pub const fn reveal_neighbours(cell: Pos) -> Self {
        Self {
            kind: ActionKind::RevealNeighbours,
            cell,
        }
    }
}

/// Terminal and reset notifications for the enclosing application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardEvent {
    GameOver,
    Win,
    NewGame,
    AbortGame,
}

/// Where the board is in its lifecycle, as far as the UI cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Playing,
    Revealing,
    Won,
    Lost,
}

impl Phase {
    pub const fn is_over(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }

    /// Style class of the board element.
    pub const fn class(self) -> &'static str {
        match self {
            Self::Revealing => "revealing",
            Self::Won => "win",
            Self::Lost => "game-over",
            Self::Idle | Self::Playing => "",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub pos: Pos,
    pub value: CellView,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init {
        rows: usize,
        columns: usize,
        mines: usize,
        field: Vec<Vec<CellView>>,
        remaining_mines: Digits,
        time: Digits,
    },
    #[serde(rename = "update")]
    Update {
        updates: Vec<CellUpdate>,
        remaining_mines: Digits,
        phase: Phase,
    },
    #[serde(rename = "tick")]
    Tick { time: Digits },
    #[serde(rename = "board")]
    Board { event: BoardEvent },
}
