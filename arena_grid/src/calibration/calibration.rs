use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibration::fisheye::FisheyeModel;
use crate::calibration::homography::Homography;
use crate::error::{OverlayError, Result};
use crate::Point;

/// Rectangle in rectified canvas space covered by the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArenaBounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ArenaBounds {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Millimeters per rectified canvas unit and the millimeter position of the
/// canvas origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealWorldScale {
    pub mm_per_pixel_x: f64,
    pub mm_per_pixel_y: f64,
    #[serde(default)]
    pub offset_x_mm: f64,
    #[serde(default)]
    pub offset_y_mm: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FisheyeDoc {
    k: f64,
    center: Option<[f64; 2]>,
    #[serde(default)]
    margin_x: f64,
    #[serde(default)]
    margin_y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CornersDoc {
    src: [[f64; 2]; 4],
    dst: [[f64; 2]; 4],
}

/// Calibration file as written by the calibration tool.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalibrationDoc {
    image_width: u32,
    image_height: u32,
    fisheye: FisheyeDoc,
    homography: Option<[[f64; 3]; 3]>,
    corners: Option<CornersDoc>,
    arena_bounds: ArenaBounds,
    grid_rows: usize,
    grid_cols: usize,
    real_world: Option<RealWorldScale>,
}

/// Validated, immutable camera-to-grid calibration.
///
/// Construct with [`CalibrationData::load`], [`CalibrationData::from_json_str`]
/// or [`CalibrationData::new`]; all three run the same checks, so a value of
/// this type always has a positive grid, a non-empty arena and an invertible
/// homography.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationData {
    image_width: u32,
    image_height: u32,
    fisheye: FisheyeModel,
    homography: Homography,
    arena_bounds: ArenaBounds,
    grid_rows: usize,
    grid_cols: usize,
    real_world: Option<RealWorldScale>,
}

impl CalibrationData {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_width: u32,
        image_height: u32,
        fisheye: FisheyeModel,
        homography: Homography,
        arena_bounds: ArenaBounds,
        grid_rows: usize,
        grid_cols: usize,
        real_world: Option<RealWorldScale>,
    ) -> Result<Self> {
        if image_width == 0 || image_height == 0 {
            return Err(OverlayError::Config(format!(
                "image dimensions must be positive, got {image_width}x{image_height}"
            )));
        }
        if grid_rows == 0 || grid_cols == 0 {
            return Err(OverlayError::Config(format!(
                "grid dimensions must be positive, got {grid_rows}x{grid_cols}"
            )));
        }
        let b = arena_bounds;
        let finite = [b.left, b.top, b.width, b.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || b.width <= 0.0 || b.height <= 0.0 {
            return Err(OverlayError::Config(format!(
                "arena bounds must have positive size, got {}x{}",
                b.width, b.height
            )));
        }
        let f = fisheye;
        if ![f.k, f.center.x, f.center.y, f.margin_x, f.margin_y]
            .iter()
            .all(|v| v.is_finite())
            || !(f.margin_x >= 0.0 && f.margin_y >= 0.0)
        {
            return Err(OverlayError::Config(
                "fisheye parameters must be finite with non-negative margins".into(),
            ));
        }
        if let Some(rw) = real_world {
            if !rw.mm_per_pixel_x.is_finite()
                || !rw.mm_per_pixel_y.is_finite()
                || !rw.offset_x_mm.is_finite()
                || !rw.offset_y_mm.is_finite()
            {
                return Err(OverlayError::Config(
                    "real-world scale must be finite".into(),
                ));
            }
        }

        Ok(Self {
            image_width,
            image_height,
            fisheye,
            homography,
            arena_bounds,
            grid_rows,
            grid_cols,
            real_world,
        })
    }

    /// Reads and validates a calibration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| OverlayError::io(path, e))?;
        let calibration = Self::from_json_str(&text)?;
        info!(
            "Loaded calibration from {} ({}x{} grid, real world {})",
            path.display(),
            calibration.grid_rows,
            calibration.grid_cols,
            if calibration.real_world_available() {
                "available"
            } else {
                "missing"
            }
        );
        Ok(calibration)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: CalibrationDoc =
            serde_json::from_str(text).map_err(|e| OverlayError::Config(e.to_string()))?;

        let homography = match (doc.homography, doc.corners) {
            (Some(rows), None) => Homography::from_rows(rows)?,
            (None, Some(corners)) => Homography::from_correspondences(&corners.src, &corners.dst)?,
            (Some(_), Some(_)) => {
                return Err(OverlayError::Config(
                    "specify either `homography` or `corners`, not both".into(),
                ))
            }
            (None, None) => {
                return Err(OverlayError::Config(
                    "missing field `homography` (or `corners`)".into(),
                ))
            }
        };

        let center = doc.fisheye.center.map_or_else(
            || Point::new(doc.image_width as f64 / 2.0, doc.image_height as f64 / 2.0),
            |c| Point::new(c[0], c[1]),
        );
        let fisheye = FisheyeModel::new(
            doc.fisheye.k,
            center,
            doc.fisheye.margin_x,
            doc.fisheye.margin_y,
        );

        Self::new(
            doc.image_width,
            doc.image_height,
            fisheye,
            homography,
            doc.arena_bounds,
            doc.grid_rows,
            doc.grid_cols,
            doc.real_world,
        )
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    pub fn fisheye(&self) -> &FisheyeModel {
        &self.fisheye
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn arena_bounds(&self) -> &ArenaBounds {
        &self.arena_bounds
    }

    pub fn grid_rows(&self) -> usize {
        self.grid_rows
    }

    pub fn grid_cols(&self) -> usize {
        self.grid_cols
    }

    /// (cell_width, cell_height) in rectified canvas units.
    pub fn cell_size(&self) -> (f64, f64) {
        (
            self.arena_bounds.width / self.grid_cols as f64,
            self.arena_bounds.height / self.grid_rows as f64,
        )
    }

    pub fn real_world(&self) -> Option<&RealWorldScale> {
        self.real_world.as_ref()
    }

    pub fn real_world_available(&self) -> bool {
        self.real_world.is_some()
    }
}
