pub mod grid_state;
pub mod grid_store;
pub mod occupancy;
