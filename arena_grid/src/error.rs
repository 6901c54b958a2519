use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while loading calibration, editing the grid
/// or rectifying an image.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Calibration document is malformed, incomplete or geometrically invalid.
    #[error("invalid calibration: {0}")]
    Config(String),

    /// Grid document does not match the calibration or contains non-binary cells.
    #[error("invalid grid file {path}: {reason}")]
    GridFormat { path: PathBuf, reason: String },

    /// Real-world conversion requested but the calibration carries no scale block.
    #[error("real-world calibration is not available")]
    CalibrationMissing,

    #[error("cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    IndexOutOfRange {
        row: i64,
        col: i64,
        rows: usize,
        cols: usize,
    },

    #[error("failed to read image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    /// Raised by the rectifier stub when the crate is built without `imaging`.
    #[error("image rectification requires the `{0}` feature")]
    DependencyMissing(&'static str),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OverlayError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OverlayError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn grid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        OverlayError::GridFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OverlayError>;
