//! 3x3 tic-tac-toe board

use serde::{Deserialize, Serialize};

use crate::error::{DuelError, Result};
use crate::types::{Outcome, Role};

/// Board side length
pub const BOARD_SIZE: usize = 3;

/// Cell grid, `None` for empty cells
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Option<Role>; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark at (row, col), `None` when empty or out of bounds
    pub fn get(&self, row: usize, col: usize) -> Option<Role> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Place a mark
    pub fn place(&mut self, row: usize, col: usize, role: Role) -> Result<()> {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return Err(DuelError::OutOfBounds { row, col });
        }
        let cell = &mut self.cells[row][col];
        if cell.is_some() {
            return Err(DuelError::CellOccupied { row, col });
        }
        *cell = Some(role);
        Ok(())
    }

    /// Whether no mark has been placed
    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_none)
    }

    /// Whether every cell is taken
    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_some)
    }

    /// Outcome after a mark was placed at (row, col)
    ///
    /// Only the row, column and diagonals through the cell are checked.
    pub fn outcome_at(&self, row: usize, col: usize) -> Outcome {
        let Some(role) = self.get(row, col) else {
            return Outcome::Unresolved;
        };
        let owns = |r: usize, c: usize| self.cells[r][c] == Some(role);

        let line = (0..BOARD_SIZE).all(|c| owns(row, c))
            || (0..BOARD_SIZE).all(|r| owns(r, col))
            || (row == col && (0..BOARD_SIZE).all(|i| owns(i, i)))
            || (row + col == BOARD_SIZE - 1 && (0..BOARD_SIZE).all(|i| owns(i, BOARD_SIZE - 1 - i)));

        if line {
            Outcome::won_by(role)
        } else if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::Unresolved
        }
    }

    /// Outcome of the whole board
    pub fn evaluate(&self) -> Outcome {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                match self.outcome_at(row, col) {
                    Outcome::Player1Won => return Outcome::Player1Won,
                    Outcome::Player2Won => return Outcome::Player2Won,
                    _ => {}
                }
            }
        }
        if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::Unresolved
        }
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (r, row) in self.cells.iter().enumerate() {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(c, cell)| match cell {
                    Some(role) => role.mark().to_string(),
                    None => (r * BOARD_SIZE + c + 1).to_string(),
                })
                .collect();
            writeln!(f, " {} ", line.join(" | "))?;
            if r + 1 < BOARD_SIZE {
                writeln!(f, "---+---+---")?;
            }
        }
        Ok(())
    }
}
