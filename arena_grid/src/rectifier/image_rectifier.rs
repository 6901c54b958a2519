use std::path::Path;

use serde::Serialize;

use crate::error::{OverlayError, Result};
use crate::mapping::coordinate_mapper::CoordinateMapper;

/// Translation from a pixel of a cropped rectified image to rectified
/// canvas coordinates: `canvas = pixel + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Offset {
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Offset {
    pub fn to_canvas(&self, pixel_x: f64, pixel_y: f64) -> (f64, f64) {
        (pixel_x + self.offset_x, pixel_y + self.offset_y)
    }

    pub fn to_pixel(&self, canvas_x: f64, canvas_y: f64) -> (f64, f64) {
        (canvas_x - self.offset_x, canvas_y - self.offset_y)
    }
}

/// Turns a raw camera frame into a top-down view of the arena.
pub trait ImageRectifier {
    type Image;

    /// Reads `path`, removes lens distortion and applies the perspective
    /// warp. With `show_grid` the cell boundaries are drawn on top.
    fn transform_image(&self, path: &Path, show_grid: bool) -> Result<(Self::Image, Offset)>;
}

/// Stand-in used when the crate is built without the `imaging` feature.
#[derive(Debug, Clone)]
pub struct NoRectifier;

impl NoRectifier {
    pub fn new(_mapper: CoordinateMapper) -> Self {
        NoRectifier
    }
}

impl ImageRectifier for NoRectifier {
    type Image = ();

    fn transform_image(&self, _path: &Path, _show_grid: bool) -> Result<((), Offset)> {
        Err(OverlayError::DependencyMissing("imaging"))
    }
}
