use std::sync::Arc;

use crate::calibration::calibration::CalibrationData;
use crate::error::{OverlayError, Result};
use crate::mapping::grid_cell::{CellRect, GridCell, RealCoords};
use crate::Point;

/// Pure coordinate conversions between GPS camera pixels, the rectified
/// canvas, grid cells and millimeters.
///
/// Holds only a shared handle to an immutable calibration, so clones are
/// cheap and the mapper can be handed to as many readers as needed.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    calibration: Arc<CalibrationData>,
}

impl CoordinateMapper {
    pub fn new(calibration: Arc<CalibrationData>) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &CalibrationData {
        &self.calibration
    }

    /// GPS camera pixel -> rectified canvas. Not clamped to the image.
    pub fn map_to_rectified(&self, x: f64, y: f64) -> (f64, f64) {
        let undistorted = self.calibration.fisheye().undistort_point(Point::new(x, y));
        let rectified = self.calibration.homography().project(undistorted);
        (rectified.x, rectified.y)
    }

    /// Cell containing a rectified canvas point.
    ///
    /// Points on a boundary belong to the higher-index cell.
    pub fn cell_for_point(&self, x_rect: f64, y_rect: f64) -> GridCell {
        let bounds = self.calibration.arena_bounds();
        let (cell_width, cell_height) = self.calibration.cell_size();

        let col = cell_index(x_rect, bounds.left, cell_width);
        let row = cell_index(y_rect, bounds.top, cell_height);

        let in_bounds = x_rect.is_finite()
            && y_rect.is_finite()
            && (0..self.calibration.grid_cols() as i64).contains(&col)
            && (0..self.calibration.grid_rows() as i64).contains(&row);

        let rect = self.signed_cell_rect(row, col);
        GridCell {
            row,
            col,
            in_bounds,
            center_x: rect.left + rect.width / 2.0,
            center_y: rect.top + rect.height / 2.0,
        }
    }

    pub fn cell_for_gps_point(&self, x: f64, y: f64) -> GridCell {
        let (x_rect, y_rect) = self.map_to_rectified(x, y);
        self.cell_for_point(x_rect, y_rect)
    }

    /// GPS camera pixel -> millimeters on the arena floor.
    pub fn real_world(&self, x: f64, y: f64) -> Result<RealCoords> {
        let scale = self
            .calibration
            .real_world()
            .ok_or(OverlayError::CalibrationMissing)?;
        let (x_rect, y_rect) = self.map_to_rectified(x, y);
        let x_mm = x_rect * scale.mm_per_pixel_x + scale.offset_x_mm;
        let y_mm = y_rect * scale.mm_per_pixel_y + scale.offset_y_mm;
        Ok(RealCoords {
            x_mm,
            y_mm,
            distance_from_origin_mm: x_mm.hypot(y_mm),
        })
    }

    /// Every cell of the grid, indexed `[row][col]`.
    pub fn full_grid_map(&self) -> Vec<Vec<GridCell>> {
        let rows = self.calibration.grid_rows();
        let cols = self.calibration.grid_cols();
        (0..rows)
            .map(|row| {
                (0..cols)
                    .map(|col| {
                        let rect = self.signed_cell_rect(row as i64, col as i64);
                        GridCell {
                            row: row as i64,
                            col: col as i64,
                            in_bounds: true,
                            center_x: rect.left + rect.width / 2.0,
                            center_y: rect.top + rect.height / 2.0,
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Rectangle covered by a cell, or `None` for indices outside the grid.
    ///
    /// Grid drawing goes through here so what is drawn and what
    /// [`cell_for_point`](Self::cell_for_point) returns never disagree.
    pub fn cell_rect(&self, row: usize, col: usize) -> Option<CellRect> {
        if row >= self.calibration.grid_rows() || col >= self.calibration.grid_cols() {
            return None;
        }
        Some(self.signed_cell_rect(row as i64, col as i64))
    }

    fn signed_cell_rect(&self, row: i64, col: i64) -> CellRect {
        let bounds = self.calibration.arena_bounds();
        let (cell_width, cell_height) = self.calibration.cell_size();
        CellRect {
            left: bounds.left + col as f64 * cell_width,
            top: bounds.top + row as f64 * cell_height,
            width: cell_width,
            height: cell_height,
        }
    }
}

/// Index of the cell holding `v` along one axis, with cell `i` starting at
/// `origin + i * size`.
///
/// The division can round across an edge, so the result is checked against
/// the same edge expression [`CoordinateMapper::cell_rect`] uses.
fn cell_index(v: f64, origin: f64, size: f64) -> i64 {
    // `as` saturates, and NaN becomes 0; callers keep non-finite points out
    // of bounds.
    let idx = ((v - origin) / size).floor() as i64;
    if !v.is_finite() {
        return idx;
    }
    if origin + idx as f64 * size > v {
        idx.saturating_sub(1)
    } else if origin + idx.saturating_add(1) as f64 * size <= v {
        idx.saturating_add(1)
    } else {
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::calibration::{ArenaBounds, RealWorldScale};
    use crate::calibration::fisheye::FisheyeModel;
    use crate::calibration::homography::Homography;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn mapper(
        bounds: ArenaBounds,
        rows: usize,
        cols: usize,
        real_world: Option<RealWorldScale>,
    ) -> CoordinateMapper {
        let calibration = CalibrationData::new(
            2048,
            1536,
            FisheyeModel::identity(2048, 1536),
            Homography::identity(),
            bounds,
            rows,
            cols,
            real_world,
        )
        .unwrap();
        CoordinateMapper::new(Arc::new(calibration))
    }

    fn arena_10x8() -> CoordinateMapper {
        mapper(
            ArenaBounds {
                left: 0.0,
                top: 0.0,
                width: 1000.0,
                height: 800.0,
            },
            8,
            10,
            None,
        )
    }

    #[test]
    fn test_example_point_lookup() {
        let cell = arena_10x8().cell_for_point(105.0, 85.0);
        assert_eq!(cell.col, 1);
        assert_eq!(cell.row, 0);
        assert!(cell.in_bounds);
        assert_relative_eq!(cell.center_x, 150.0);
        assert_relative_eq!(cell.center_y, 50.0);
    }

    #[test]
    fn test_cell_center_round_trip() {
        let m = arena_10x8();
        for row in m.full_grid_map() {
            for cell in row {
                let found = m.cell_for_point(cell.center_x, cell.center_y);
                assert_eq!((found.row, found.col), (cell.row, cell.col));
                assert!(found.in_bounds);
            }
        }
    }

    #[test]
    fn test_boundaries_belong_to_higher_cell() {
        let m = mapper(
            ArenaBounds {
                left: 10.0,
                top: 20.0,
                width: 500.0,
                height: 500.0,
            },
            5,
            5,
            None,
        );
        let (cell_width, cell_height) = m.calibration().cell_size();
        for k in 1..5 {
            let cell = m.cell_for_point(10.0 + cell_width * k as f64, 20.0);
            assert_eq!(cell.col, k);
            assert_eq!(cell.row, 0);

            let cell = m.cell_for_point(10.0, 20.0 + cell_height * k as f64);
            assert_eq!(cell.row, k);
            assert_eq!(cell.col, 0);
        }
        // The far edge itself is the first cell past the grid.
        let cell = m.cell_for_point(510.0, 20.0);
        assert_eq!(cell.col, 5);
        assert!(!cell.in_bounds);
    }

    #[test]
    fn test_fractional_boundaries_match_cell_rects() {
        let cases = [
            (ArenaBounds { left: 12.7, top: 0.3, width: 997.3, height: 1.0 }, 5),
            (ArenaBounds { left: 33.3, top: 17.1, width: 123.45, height: 67.89 }, 7),
        ];
        for (bounds, n) in cases {
            let m = mapper(bounds, n, n, None);
            for k in 1..n {
                let rect = m.cell_rect(k, k).unwrap();

                let cell = m.cell_for_point(rect.left, bounds.top);
                assert_eq!((cell.row, cell.col), (0, k as i64), "left edge {}", rect.left);
                let cell = m.cell_for_point(bounds.left, rect.top);
                assert_eq!((cell.row, cell.col), (k as i64, 0), "top edge {}", rect.top);

                // The largest value below an edge still belongs to the lower cell.
                let below = |v: f64| f64::from_bits(v.to_bits() - 1);
                assert_eq!(m.cell_for_point(below(rect.left), bounds.top).col, k as i64 - 1);
                assert_eq!(m.cell_for_point(bounds.left, below(rect.top)).row, k as i64 - 1);
            }
        }
    }

    #[test]
    fn test_out_of_bounds_is_reported_not_failed() {
        let m = arena_10x8();
        let cell = m.cell_for_point(-250.0, -10.0);
        assert!(!cell.in_bounds);
        assert_eq!(cell.col, -3);
        assert_eq!(cell.row, -1);
        assert_relative_eq!(cell.center_x, -250.0);
        assert_relative_eq!(cell.center_y, -50.0);
        assert_eq!(cell.index(), None);

        // Deterministic on repeated calls.
        assert_eq!(m.cell_for_point(-250.0, -10.0), cell);

        let cell = m.cell_for_point(5000.0, 100.0);
        assert!(!cell.in_bounds);
        assert_eq!(cell.col, 50);
    }

    #[test]
    fn test_non_finite_point_is_out_of_bounds() {
        let m = arena_10x8();
        assert!(!m.cell_for_point(f64::NAN, 10.0).in_bounds);
        assert!(!m.cell_for_point(10.0, f64::INFINITY).in_bounds);
    }

    #[test]
    fn test_random_points_land_inside_their_cell() {
        let m = arena_10x8();
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let x = rng.gen_range(-200.0..1200.0);
            let y = rng.gen_range(-200.0..1000.0);
            let cell = m.cell_for_point(x, y);
            assert!(x >= cell.center_x - 50.0 && x < cell.center_x + 50.0);
            assert!(y >= cell.center_y - 50.0 && y < cell.center_y + 50.0);
            assert_eq!(cell.in_bounds, (0.0..1000.0).contains(&x) && (0.0..800.0).contains(&y));
        }
    }

    #[test]
    fn test_gps_point_goes_through_homography() {
        let calibration = CalibrationData::new(
            2048,
            1536,
            FisheyeModel::identity(2048, 1536),
            Homography::from_rows([[0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 1.0]]).unwrap(),
            ArenaBounds {
                left: 0.0,
                top: 0.0,
                width: 1000.0,
                height: 800.0,
            },
            8,
            10,
            None,
        )
        .unwrap();
        let m = CoordinateMapper::new(Arc::new(calibration));
        assert_eq!(m.map_to_rectified(210.0, 170.0), (105.0, 85.0));
        let cell = m.cell_for_gps_point(210.0, 170.0);
        assert_eq!((cell.row, cell.col, cell.in_bounds), (0, 1, true));
    }

    #[test]
    fn test_real_world_requires_calibration() {
        let res = arena_10x8().real_world(100.0, 100.0);
        assert!(matches!(res, Err(OverlayError::CalibrationMissing)));
    }

    #[test]
    fn test_real_world_scale_and_offset() {
        let m = mapper(
            ArenaBounds {
                left: 0.0,
                top: 0.0,
                width: 1000.0,
                height: 800.0,
            },
            8,
            10,
            Some(RealWorldScale {
                mm_per_pixel_x: 2.0,
                mm_per_pixel_y: 3.0,
                offset_x_mm: -100.0,
                offset_y_mm: 10.0,
            }),
        );
        let real = m.real_world(100.0, 100.0).unwrap();
        assert_relative_eq!(real.x_mm, 100.0);
        assert_relative_eq!(real.y_mm, 310.0);
        assert_relative_eq!(real.distance_from_origin_mm, (100.0f64.powi(2) + 310.0f64.powi(2)).sqrt());
    }

    #[test]
    fn test_cell_rect_rejects_outside_indices() {
        let m = arena_10x8();
        let rect = m.cell_rect(7, 9).unwrap();
        assert_relative_eq!(rect.left, 900.0);
        assert_relative_eq!(rect.top, 700.0);
        assert!(m.cell_rect(8, 0).is_none());
        assert!(m.cell_rect(0, 10).is_none());
    }
}
