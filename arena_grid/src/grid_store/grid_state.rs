use serde::Serialize;

use crate::error::{OverlayError, Result};
use crate::grid_store::occupancy::OccupancyMap;

/// State of a single grid cell. The discriminants are the values stored in
/// the grid file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Cell {
    #[default]
    Free = 0,
    Obstacle = 1,
}

impl Cell {
    pub fn from_value(value: u64) -> Option<Self> {
        match value {
            0 => Some(Cell::Free),
            1 => Some(Cell::Obstacle),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Cell::Free => Cell::Obstacle,
            Cell::Obstacle => Cell::Free,
        }
    }

    pub fn is_obstacle(self) -> bool {
        self == Cell::Obstacle
    }
}

impl Serialize for Cell {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Fixed-shape occupancy grid stored row-major in a flat buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridState {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

/// Summary counts, e.g. for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridInfo {
    pub rows: usize,
    pub cols: usize,
    pub total_cells: usize,
    pub free_count: usize,
    pub obstacle_count: usize,
}

/// Characters used by [`GridState::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbols {
    pub free: String,
    pub obstacle: String,
}

impl Default for Symbols {
    fn default() -> Self {
        Self {
            free: "O".to_string(),
            obstacle: "X".to_string(),
        }
    }
}

impl GridState {
    /// All-free grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::Free; rows * cols],
        }
    }

    /// Wraps an already validated row-major buffer.
    pub(crate) fn from_cells(rows: usize, cols: usize, cells: Vec<Cell>) -> Self {
        debug_assert_eq!(cells.len(), rows * cols);
        Self { rows, cols, cells }
    }

    /// New `rows` x `cols` grid holding the overlapping part of `previous`.
    ///
    /// Used when the arena is re-calibrated with different dimensions; cells
    /// that did not exist before start out free.
    pub fn seeded(rows: usize, cols: usize, previous: &GridState) -> Self {
        let mut grid = Self::new(rows, cols);
        for row in 0..rows.min(previous.rows) {
            for col in 0..cols.min(previous.cols) {
                grid.cells[row * cols + col] = previous.cells[row * previous.cols + col];
            }
        }
        grid
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.index(row, col).map(|idx| self.cells[idx])
    }

    /// Flips a cell between free and obstacle, returning the new state.
    pub fn toggle(&mut self, row: usize, col: usize) -> Result<Cell> {
        let idx = self.checked_index(row, col)?;
        self.cells[idx] = self.cells[idx].toggled();
        Ok(self.cells[idx])
    }

    /// Overwrites a cell, returning its previous state.
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) -> Result<Cell> {
        let idx = self.checked_index(row, col)?;
        Ok(std::mem::replace(&mut self.cells[idx], cell))
    }

    /// Iterates rows as slices.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[Cell]> {
        (0..self.rows).map(move |row| &self.cells[row * self.cols..(row + 1) * self.cols])
    }

    pub fn info(&self) -> GridInfo {
        let obstacle_count = self.cells.iter().filter(|c| c.is_obstacle()).count();
        GridInfo {
            rows: self.rows,
            cols: self.cols,
            total_cells: self.cells.len(),
            free_count: self.cells.len() - obstacle_count,
            obstacle_count,
        }
    }

    /// One line per row, cells joined by `separator`.
    pub fn render(&self, symbols: &Symbols, separator: &str) -> String {
        self.iter_rows()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Cell::Free => symbols.free.as_str(),
                        Cell::Obstacle => symbols.obstacle.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join(separator)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        if row < self.rows && col < self.cols {
            Some(row * self.cols + col)
        } else {
            None
        }
    }

    fn checked_index(&self, row: usize, col: usize) -> Result<usize> {
        self.index(row, col).ok_or(OverlayError::IndexOutOfRange {
            row: row as i64,
            col: col as i64,
            rows: self.rows,
            cols: self.cols,
        })
    }
}

impl OccupancyMap for GridState {
    fn get_occupancy(&self, row: usize, col: usize) -> Option<bool> {
        self.get(row, col).map(Cell::is_obstacle)
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}
