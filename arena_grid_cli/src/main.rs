use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use arena_grid::rectifier::warp::draw_obstacles;
use arena_grid::{Cell, Overlay, Symbols, DEFAULT_CALIBRATION_PATH, DEFAULT_GRID_PATH};

#[derive(Parser, Debug)]
#[command(name = "arena-grid", about = "GPS camera occupancy grid tool")]
struct Args {
    /// Calibration document
    #[arg(short, long, default_value = DEFAULT_CALIBRATION_PATH)]
    calibration: PathBuf,
    /// Grid file
    #[arg(short, long, default_value = DEFAULT_GRID_PATH)]
    grid: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grid cell under a GPS camera pixel
    Cell {
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
        /// Treat X Y as rectified canvas coordinates
        #[arg(long)]
        rectified: bool,
    },
    /// Millimeter position of a GPS camera pixel
    Real {
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
    },
    /// Flip a cell between free and obstacle and save the grid
    Toggle { row: usize, col: usize },
    /// Print the grid
    Show {
        #[arg(long, default_value = "O")]
        free: String,
        #[arg(long, default_value = "X")]
        obstacle: String,
        #[arg(long, default_value = " ")]
        sep: String,
    },
    /// Grid and calibration summary
    Info,
    /// Rectify a camera frame
    Rectify {
        input: PathBuf,
        output: PathBuf,
        /// Draw cell boundaries
        #[arg(long)]
        grid_lines: bool,
        /// Shade obstacle cells
        #[arg(long)]
        obstacles: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena_grid=info".into()),
        )
        .init();

    let args = Args::parse();
    let overlay = Overlay::load(&args.calibration)
        .with_context(|| format!("loading calibration {}", args.calibration.display()))?
        .with_grid_path(&args.grid);

    match args.command {
        Command::Cell { x, y, rectified } => {
            let cell = if rectified {
                overlay.get_grid_cell_from_rectified(x, y)
            } else {
                overlay.get_grid_cell(x, y)
            };
            println!("{}", serde_json::to_string_pretty(&cell)?);
        }
        Command::Real { x, y } => {
            let real = overlay
                .get_real_coords(x, y)
                .context("converting to real-world coordinates")?;
            println!("{}", serde_json::to_string_pretty(&real)?);
        }
        Command::Toggle { row, col } => {
            let mut store = overlay
                .open_grid_store(None)
                .with_context(|| format!("opening grid {}", args.grid.display()))?;
            let cell = store
                .toggle(row, col)
                .with_context(|| format!("toggling cell ({row}, {col})"))?;
            let state = match cell {
                Cell::Free => "free",
                Cell::Obstacle => "obstacle",
            };
            println!("({row}, {col}) is now {state}");
        }
        Command::Show {
            free,
            obstacle,
            sep,
        } => {
            let grid = overlay
                .get_grid()
                .with_context(|| format!("reading grid {}", args.grid.display()))?;
            println!("{}", grid.render(&Symbols { free, obstacle }, &sep));
        }
        Command::Info => {
            let grid = overlay
                .get_grid()
                .with_context(|| format!("reading grid {}", args.grid.display()))?;
            let calibration = overlay.calibration();
            let (cell_width, cell_height) = calibration.cell_size();
            let summary = json!({
                "grid": grid.info(),
                "image_size": calibration.image_size(),
                "arena_bounds": calibration.arena_bounds(),
                "cell_size": [cell_width, cell_height],
                "real_world_available": calibration.real_world_available(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Rectify {
            input,
            output,
            grid_lines,
            obstacles,
        } => {
            let (mut image, offset) = overlay
                .transform_image(&input, grid_lines)
                .with_context(|| format!("rectifying {}", input.display()))?;
            if obstacles {
                let grid = overlay
                    .get_grid()
                    .with_context(|| format!("reading grid {}", args.grid.display()))?;
                draw_obstacles(&mut image, overlay.mapper(), offset, &grid);
            }
            image
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote rectified image to {}", output.display());
            println!("{}", serde_json::to_string_pretty(&offset)?);
        }
    }
    Ok(())
}
