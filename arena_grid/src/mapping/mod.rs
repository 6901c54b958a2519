pub mod coordinate_mapper;
pub mod grid_cell;
