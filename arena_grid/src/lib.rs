pub extern crate nalgebra as na;
use na::Vector2;

#[cfg(feature = "imaging")]
pub use image;

pub mod calibration;
pub mod error;
pub mod grid_store;
pub mod mapping;
pub mod overlay;
pub mod rectifier;

pub use crate::calibration::calibration::{ArenaBounds, CalibrationData, RealWorldScale};
pub use crate::calibration::fisheye::FisheyeModel;
pub use crate::calibration::homography::Homography;
pub use crate::error::{OverlayError, Result};
pub use crate::grid_store::grid_state::{Cell, GridInfo, GridState, Symbols};
pub use crate::grid_store::grid_store::{GridStore, SharedGridStore, DEFAULT_GRID_PATH};
pub use crate::grid_store::occupancy::OccupancyMap;
pub use crate::mapping::coordinate_mapper::CoordinateMapper;
pub use crate::mapping::grid_cell::{CellRect, GridCell, RealCoords};
pub use crate::overlay::{Overlay, DEFAULT_CALIBRATION_PATH};
pub use crate::rectifier::image_rectifier::{ImageRectifier, Offset};
pub use crate::rectifier::{DefaultRectifier, RectifiedImage};

/// Point in pixel or canvas space
pub type Point = Vector2<f64>;
