use serde::Serialize;

/// Grid cell a point falls into.
///
/// `row`/`col` are signed: points outside the arena still report the cell
/// they would occupy if the grid extended forever, with `in_bounds = false`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridCell {
    pub row: i64,
    pub col: i64,
    pub in_bounds: bool,
    /// Cell center in rectified canvas space.
    pub center_x: f64,
    pub center_y: f64,
}

impl GridCell {
    /// `(row, col)` as grid indices, or `None` when outside the grid.
    pub fn index(&self) -> Option<(usize, usize)> {
        if self.in_bounds {
            Some((self.row as usize, self.col as usize))
        } else {
            None
        }
    }
}

/// A cell rectangle in rectified canvas space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Millimeter position on the arena floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RealCoords {
    pub x_mm: f64,
    pub y_mm: f64,
    pub distance_from_origin_mm: f64,
}
