use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::{OverlayError, Result};
use crate::grid_store::grid_state::{Cell, GridState};

/// Where the grid lives unless a caller says otherwise.
pub const DEFAULT_GRID_PATH: &str = "grid.json";

/// Editing session shared between several editors.
pub type SharedGridStore = Arc<Mutex<GridStore>>;

/// Reads a grid file and checks it against the calibrated dimensions.
///
/// Cells may be `0`/`1` or the symbols `"O"`/`"X"` written by older tools.
pub fn load_grid(path: impl AsRef<Path>, rows: usize, cols: usize) -> Result<GridState> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| OverlayError::io(path, e))?;
    let grid = parse_grid(&text, path, rows, cols)?;
    info!(
        "Loaded {}x{} grid from {} ({} obstacles)",
        rows,
        cols,
        path.display(),
        grid.info().obstacle_count
    );
    Ok(grid)
}

/// Writes the grid as integer JSON, one row per line.
///
/// The file is written to a uniquely named temp file next to its destination
/// and renamed into place, so readers see either the old or the new document,
/// never half of one, even with several writers.
pub fn save_grid(grid: &GridState, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| OverlayError::io(parent, e))?;
            parent
        }
        None => Path::new("."),
    };

    let text = serialize_grid(grid)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".grid")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| OverlayError::io(dir, e))?;
    tmp.write_all(text.as_bytes())
        .map_err(|e| OverlayError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| OverlayError::io(path, e))?;
    // On failure the temp file is removed when the returned handle drops.
    tmp.persist(path)
        .map_err(|e| OverlayError::io(path, e.error))?;
    debug!("Saved grid to {}", path.display());
    Ok(())
}

fn serialize_grid(grid: &GridState) -> Result<String> {
    let mut out = String::from("[\n");
    let rows = grid
        .iter_rows()
        .map(|row| serde_json::to_string(row).map(|r| format!("  {r}")))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| OverlayError::Config(format!("cannot serialize grid: {e}")))?;
    out.push_str(&rows.join(",\n"));
    out.push_str("\n]\n");
    Ok(out)
}

fn parse_grid(text: &str, path: &Path, rows: usize, cols: usize) -> Result<GridState> {
    let doc: Vec<Vec<serde_json::Value>> = serde_json::from_str(text)
        .map_err(|e| OverlayError::grid_format(path, format!("expected a list of rows: {e}")))?;

    if doc.len() != rows {
        return Err(OverlayError::grid_format(
            path,
            format!("expected {rows} rows, found {}", doc.len()),
        ));
    }

    let mut cells = Vec::with_capacity(rows * cols);
    for (row_idx, row) in doc.iter().enumerate() {
        if row.len() != cols {
            return Err(OverlayError::grid_format(
                path,
                format!("row {row_idx}: expected {cols} cells, found {}", row.len()),
            ));
        }
        for (col_idx, value) in row.iter().enumerate() {
            let cell = match value {
                serde_json::Value::Number(n) => n.as_u64().and_then(Cell::from_value),
                serde_json::Value::String(s) => match s.to_ascii_uppercase().as_str() {
                    "O" => Some(Cell::Free),
                    "X" => Some(Cell::Obstacle),
                    _ => None,
                },
                _ => None,
            };
            let cell = cell.ok_or_else(|| {
                OverlayError::grid_format(
                    path,
                    format!("invalid cell value at ({row_idx}, {col_idx}): {value}"),
                )
            })?;
            cells.push(cell);
        }
    }
    Ok(GridState::from_cells(rows, cols, cells))
}

/// The editing session: the in-memory grid plus the file it is mirrored to.
///
/// Every mutation is saved immediately. If the save fails the mutation is
/// undone before the error is returned, so memory and disk stay identical.
#[derive(Debug)]
pub struct GridStore {
    path: PathBuf,
    grid: GridState,
}

impl GridStore {
    /// Loads an existing grid file; fails if it is missing.
    pub fn load(path: impl Into<PathBuf>, rows: usize, cols: usize) -> Result<Self> {
        let path = path.into();
        let grid = load_grid(&path, rows, cols)?;
        Ok(Self { path, grid })
    }

    /// Loads the grid file if there is one, otherwise starts all free.
    ///
    /// Nothing is written until the first mutation.
    pub fn open(path: impl Into<PathBuf>, rows: usize, cols: usize) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            info!(
                "No grid at {}, starting with an empty {}x{} grid",
                path.display(),
                rows,
                cols
            );
            return Ok(Self {
                path,
                grid: GridState::new(rows, cols),
            });
        }
        Self::load(path, rows, cols)
    }

    /// Wraps a grid that has not been persisted yet.
    pub fn with_grid(path: impl Into<PathBuf>, grid: GridState) -> Self {
        Self {
            path: path.into(),
            grid,
        }
    }

    pub fn into_shared(self) -> SharedGridStore {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current in-memory grid; the read API for planners.
    pub fn get_grid(&self) -> &GridState {
        &self.grid
    }

    /// Flips a cell and persists the grid. Returns the new cell state.
    pub fn toggle(&mut self, row: usize, col: usize) -> Result<Cell> {
        let new_state = self.grid.toggle(row, col)?;
        if let Err(e) = save_grid(&self.grid, &self.path) {
            warn!("Failed to save grid after toggling ({row}, {col}), reverting: {e}");
            self.grid.toggle(row, col)?;
            return Err(e);
        }
        debug!("Toggled cell ({row}, {col}) -> {:?}", new_state);
        Ok(new_state)
    }

    /// Sets a cell and persists the grid. Returns the previous cell state.
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) -> Result<Cell> {
        let previous = self.grid.set(row, col, cell)?;
        if previous == cell {
            return Ok(previous);
        }
        if let Err(e) = save_grid(&self.grid, &self.path) {
            warn!("Failed to save grid after setting ({row}, {col}), reverting: {e}");
            self.grid.set(row, col, previous)?;
            return Err(e);
        }
        debug!("Set cell ({row}, {col}) -> {:?}", cell);
        Ok(previous)
    }

    /// Writes the current grid out, e.g. to create the file for a fresh session.
    pub fn save(&self) -> Result<()> {
        save_grid(&self.grid, &self.path)
    }

    /// Re-reads the file, discarding the in-memory grid.
    pub fn reload(&mut self) -> Result<()> {
        self.grid = load_grid(&self.path, self.grid.rows(), self.grid.cols())?;
        Ok(())
    }
}
