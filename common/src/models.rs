use std::fmt;

use serde::{Deserialize, Serialize};

/// Smallest value the three-slot displays can show.
pub const DISPLAY_MIN: i64 = -99;
/// Largest value the three-slot displays can show.
pub const DISPLAY_MAX: u64 = 999;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pos {
    pub row: usize,
    pub column: usize,
}

impl Pos {
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GameParams {
    pub rows: usize,
    pub columns: usize,
    pub mines: usize,
}

impl GameParams {
    /// `None` when the cell count does not fit in a `usize`.
    pub const fn total_cells(&self) -> Option<usize> {
        self.rows.checked_mul(self.columns)
    }
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            rows: 10,
            columns: 20,
            mines: 5,
        }
    }
}

/// Player annotation on an unrevealed cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkState {
    #[default]
    Blank,
    Mine,
    Question,
}

impl MarkState {
    /// Blank -> Mine -> Question -> Blank.
    pub const fn next(self) -> Self {
        match self {
            Self::Blank => Self::Mine,
            Self::Mine => Self::Question,
            Self::Question => Self::Blank,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Blank => "blank",
            Self::Mine => "mine",
            Self::Question => "question",
        }
    }
}

/// Adjacent mine count of a cell, or one of the display sentinels.
///
/// On the wire this is the signed integer the UI puts in its
/// `revealed-<n>` class: `0..=8`, `-1` for a mine, `-2` for the mine that
/// ended the game and `-3` for a cell wrongly flagged as a mine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Neighbours {
    Count(u8),
    Mine,
    Exploded,
    Misflagged,
}

impl Neighbours {
    pub const fn value(self) -> i8 {
        match self {
            Self::Count(count) => count as i8,
            Self::Mine => -1,
            Self::Exploded => -2,
            Self::Misflagged => -3,
        }
    }

    pub const fn count(self) -> Option<u8> {
        match self {
            Self::Count(count) => Some(count),
            _ => None,
        }
    }
}

impl From<Neighbours> for i8 {
    fn from(value: Neighbours) -> Self {
        value.value()
    }
}

impl TryFrom<i8> for Neighbours {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0..=8 => Ok(Self::Count(value as u8)),
            -1 => Ok(Self::Mine),
            -2 => Ok(Self::Exploded),
            -3 => Ok(Self::Misflagged),
            other => Err(format!("invalid neighbour value: {other}")),
        }
    }
}

/// The part of a cell the UI is allowed to see.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum CellView {
    #[serde(rename = "hidden")]
    Hidden { mark: MarkState },
    #[serde(rename = "revealed")]
    Revealed { neighbours: Neighbours },
}

impl CellView {
    /// Style class of the cell: the mark name while hidden, `revealed-<n>` after.
    pub fn class(&self) -> String {
        match self {
            Self::Hidden { mark } => mark.name().to_string(),
            Self::Revealed { neighbours } => format!("revealed-{}", neighbours.value()),
        }
    }
}

/// Fixed three-slot numeric display, right aligned, unused slots blank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digits([Option<char>; 3]);

impl Digits {
    /// Renders `value`. Negatives stop at -99 so the sign keeps its slot;
    /// anything wider than three characters keeps its last three.
    pub fn new(value: i64) -> Self {
        let text = value.max(DISPLAY_MIN).to_string();
        let chars: Vec<char> = text.chars().collect();
        let tail = &chars[chars.len().saturating_sub(3)..];

        let mut slots = [None; 3];
        let offset = 3 - tail.len();
        for (slot, digit) in slots[offset..].iter_mut().zip(tail) {
            *slot = Some(*digit);
        }
        Self(slots)
    }

    /// Elapsed game time, clamped to 999 seconds.
    pub fn time(seconds: u64) -> Self {
        Self::new(seconds.min(DISPLAY_MAX) as i64)
    }

    pub const fn slots(&self) -> [Option<char>; 3] {
        self.0
    }
}

impl fmt::Display for Digits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for slot in self.0 {
            write!(f, "{}", slot.unwrap_or(' '))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_state_cycles_through_three_states() {
        let mut state = MarkState::Blank;
        let mut seen = Vec::new();
        for _ in 0..4 {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                MarkState::Mine,
                MarkState::Question,
                MarkState::Blank,
                MarkState::Mine
            ]
        );
    }

    #[test]
    fn cell_classes_follow_display_mapping() {
        let hidden = CellView::Hidden {
            mark: MarkState::Question,
        };
        assert_eq!(hidden.class(), "question");

        let three = CellView::Revealed {
            neighbours: Neighbours::Count(3),
        };
        assert_eq!(three.class(), "revealed-3");

        let exploded = CellView::Revealed {
            neighbours: Neighbours::Exploded,
        };
        assert_eq!(exploded.class(), "revealed--2");

        let misflagged = CellView::Revealed {
            neighbours: Neighbours::Misflagged,
        };
        assert_eq!(misflagged.class(), "revealed--3");
    }

    #[test]
    fn neighbours_serialize_as_signed_values() {
        let json = serde_json::to_string(&CellView::Revealed {
            neighbours: Neighbours::Mine,
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"revealed","neighbours":-1}"#);

        let parsed: Neighbours = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, Neighbours::Count(4));
        assert!(serde_json::from_str::<Neighbours>("9").is_err());
        assert!(serde_json::from_str::<Neighbours>("-4").is_err());
    }

    #[test]
    fn time_display_clamps_to_999() {
        assert_eq!(Digits::time(1500).to_string(), "999");
        assert_eq!(Digits::time(999).to_string(), "999");
    }

    #[test]
    fn digits_pad_on_the_left_with_blanks() {
        assert_eq!(Digits::time(7).slots(), [None, None, Some('7')]);
        assert_eq!(Digits::time(42).to_string(), " 42");
        assert_eq!(Digits::new(-3).slots(), [None, Some('-'), Some('3')]);
        assert_eq!(Digits::new(12345).to_string(), "345");
    }

    #[test]
    fn negative_digits_keep_their_sign() {
        assert_eq!(Digits::new(-99).to_string(), "-99");
        assert_eq!(Digits::new(-123).to_string(), "-99");
        assert_eq!(Digits::new(i64::MIN).to_string(), "-99");
    }

    #[test]
    fn game_params_fill_missing_fields_with_defaults() {
        let params: GameParams = serde_json::from_str(r#"{"mines": 12}"#).unwrap();
        assert_eq!(
            params,
            GameParams {
                rows: 10,
                columns: 20,
                mines: 12
            }
        );
        assert_eq!(params.total_cells(), Some(200));
    }
}
