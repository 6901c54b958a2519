use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::calibration::calibration::CalibrationData;
use crate::error::{OverlayError, Result};
use crate::grid_store::grid_state::GridState;
use crate::grid_store::grid_store::{self, GridStore, DEFAULT_GRID_PATH};
use crate::mapping::coordinate_mapper::CoordinateMapper;
use crate::mapping::grid_cell::{GridCell, RealCoords};
use crate::rectifier::image_rectifier::{ImageRectifier, Offset};
use crate::rectifier::{DefaultRectifier, RectifiedImage};

/// Default location of the calibration document.
pub const DEFAULT_CALIBRATION_PATH: &str = "gps_overlay.json";

/// One calibrated camera and the grid laid over its arena.
///
/// Construct one per camera and pass it to whoever needs it; overlays share
/// nothing with each other.
#[derive(Debug, Clone)]
pub struct Overlay {
    mapper: CoordinateMapper,
    rectifier: DefaultRectifier,
    grid_path: PathBuf,
}

impl Overlay {
    pub fn new(calibration: CalibrationData) -> Self {
        Self::from_shared(Arc::new(calibration))
    }

    pub fn from_shared(calibration: Arc<CalibrationData>) -> Self {
        let mapper = CoordinateMapper::new(calibration);
        Self {
            rectifier: DefaultRectifier::new(mapper.clone()),
            mapper,
            grid_path: PathBuf::from(DEFAULT_GRID_PATH),
        }
    }

    /// Reads the calibration document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(CalibrationData::load(path)?))
    }

    /// Grid file used when no explicit path is passed.
    pub fn with_grid_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.grid_path = path.into();
        self
    }

    pub fn grid_path(&self) -> &Path {
        &self.grid_path
    }

    pub fn calibration(&self) -> &CalibrationData {
        self.mapper.calibration()
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn map_coords(&self, x: f64, y: f64) -> (f64, f64) {
        self.mapper.map_to_rectified(x, y)
    }

    /// Cell under a GPS camera pixel.
    pub fn get_grid_cell(&self, x: f64, y: f64) -> GridCell {
        self.mapper.cell_for_gps_point(x, y)
    }

    /// Cell under a point that is already in rectified canvas space, e.g. a
    /// click on a rectified image translated by its [`Offset`].
    pub fn get_grid_cell_from_rectified(&self, x_rect: f64, y_rect: f64) -> GridCell {
        self.mapper.cell_for_point(x_rect, y_rect)
    }

    pub fn get_real_coords(&self, x: f64, y: f64) -> Result<RealCoords> {
        self.mapper.real_world(x, y)
    }

    pub fn get_grid_map(&self) -> Vec<Vec<GridCell>> {
        self.mapper.full_grid_map()
    }

    /// Loads a grid with the calibrated dimensions. Fails if the file is
    /// missing; see [`get_grid`](Self::get_grid) for the lenient variant.
    pub fn load_grid(&self, path: Option<&Path>) -> Result<GridState> {
        let calibration = self.calibration();
        grid_store::load_grid(
            self.resolve(path),
            calibration.grid_rows(),
            calibration.grid_cols(),
        )
    }

    pub fn save_grid(&self, grid: &GridState, path: Option<&Path>) -> Result<()> {
        let path = self.resolve(path);
        let calibration = self.calibration();
        if (grid.rows(), grid.cols()) != (calibration.grid_rows(), calibration.grid_cols()) {
            return Err(OverlayError::grid_format(
                path,
                format!(
                    "grid is {}x{} but the calibration expects {}x{}",
                    grid.rows(),
                    grid.cols(),
                    calibration.grid_rows(),
                    calibration.grid_cols()
                ),
            ));
        }
        grid_store::save_grid(grid, path)
    }

    /// Current grid on disk, or an all-free grid when there is no file yet.
    pub fn get_grid(&self) -> Result<GridState> {
        Ok(self.open_grid_store(None)?.get_grid().clone())
    }

    /// Editing session over the grid file.
    pub fn open_grid_store(&self, path: Option<&Path>) -> Result<GridStore> {
        let calibration = self.calibration();
        GridStore::open(
            self.resolve(path),
            calibration.grid_rows(),
            calibration.grid_cols(),
        )
    }

    /// Rectifies a camera frame; `pixel + offset` of the result is canvas space.
    pub fn transform_image(
        &self,
        path: impl AsRef<Path>,
        show_grid: bool,
    ) -> Result<(RectifiedImage, Offset)> {
        self.rectifier.transform_image(path.as_ref(), show_grid)
    }

    fn resolve<'a>(&'a self, path: Option<&'a Path>) -> &'a Path {
        path.unwrap_or(self.grid_path.as_path())
    }
}
