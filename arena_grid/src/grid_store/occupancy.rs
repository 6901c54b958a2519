/// Read-only view of the occupancy grid for path planners.
pub trait OccupancyMap {
    /// `Some(true)` for an obstacle, `Some(false)` for free space and `None`
    /// outside the grid. Planners must treat `None` as impassable too.
    fn get_occupancy(&self, row: usize, col: usize) -> Option<bool>;

    fn dimensions(&self) -> (usize, usize);
}
