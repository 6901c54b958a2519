use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{warp_into, warp_with, Interpolation, Projection};
use imageproc::rect::Rect;
use line_drawing::Bresenham;
use nalgebra::Matrix3;
use tracing::{debug, warn};

use crate::calibration::fisheye::FisheyeModel;
use crate::calibration::homography::Homography;
use crate::error::{OverlayError, Result};
use crate::grid_store::grid_state::{Cell, GridState};
use crate::mapping::coordinate_mapper::CoordinateMapper;
use crate::rectifier::image_rectifier::{ImageRectifier, Offset};
use crate::Point;

/// Largest side length of a rectified image.
const MAX_OUTPUT_SIDE: f64 = 16_384.0;
const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const GRID_LINE: Rgb<u8> = Rgb([255, 255, 255]);
const OBSTACLE_TINT: Rgb<u8> = Rgb([30, 30, 30]);
const OBSTACLE_ALPHA: f32 = 0.4;

/// Removes lens distortion, returning an image padded by the model's margins.
pub fn undistort(image: &RgbImage, fisheye: &FisheyeModel) -> RgbImage {
    let (width, height) = fisheye.padded_size(image.width(), image.height());
    let pad_x = fisheye.margin_x.round();
    let pad_y = fisheye.margin_y.round();

    let mut padded = RgbImage::from_pixel(width, height, BACKGROUND);
    image::imageops::replace(&mut padded, image, pad_x as i64, pad_y as i64);
    if fisheye.k == 0.0 {
        return padded;
    }

    let model = *fisheye;
    warp_with(
        &padded,
        move |x, y| match model.distort_point(Point::new(x as f64, y as f64)) {
            Some(raw) => ((raw.x + pad_x) as f32, (raw.y + pad_y) as f32),
            None => (-1.0, -1.0),
        },
        Interpolation::Bilinear,
        BACKGROUND,
    )
}

/// Applies the perspective transform, cropping the output to the bounding
/// box of the projected image.
///
/// The returned offset is that box's top-left corner in rectified canvas
/// space.
pub fn warp(image: &RgbImage, homography: &Homography) -> Result<(RgbImage, Offset)> {
    let (w, h) = (image.width() as f64, image.height() as f64);
    let corners = [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(w, h),
        Point::new(0.0, h),
    ]
    .map(|p| homography.project(p));
    if corners.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(OverlayError::Config(
            "homography sends part of the image to infinity".into(),
        ));
    }

    let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min).floor();
    let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min).floor();
    let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max).ceil();
    let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max).ceil();
    let (out_w, out_h) = (max_x - min_x, max_y - min_y);
    if out_w < 1.0 || out_h < 1.0 || out_w > MAX_OUTPUT_SIDE || out_h > MAX_OUTPUT_SIDE {
        return Err(OverlayError::Config(format!(
            "rectified image would be {out_w}x{out_h} pixels"
        )));
    }

    let shifted = Matrix3::new(1.0, 0.0, -min_x, 0.0, 1.0, -min_y, 0.0, 0.0, 1.0)
        * homography.matrix();
    let mut row_major = [0f32; 9];
    for r in 0..3 {
        for c in 0..3 {
            row_major[r * 3 + c] = shifted[(r, c)] as f32;
        }
    }
    let projection = Projection::from_matrix(row_major)
        .ok_or_else(|| OverlayError::Config("homography is not invertible".into()))?;

    let mut out = RgbImage::from_pixel(out_w as u32, out_h as u32, BACKGROUND);
    warp_into(image, &projection, Interpolation::Bilinear, BACKGROUND, &mut out);

    let offset = Offset {
        offset_x: min_x,
        offset_y: min_y,
    };
    debug!(
        "Warped {}x{} image to {}x{} at offset ({}, {})",
        image.width(),
        image.height(),
        out.width(),
        out.height(),
        offset.offset_x,
        offset.offset_y
    );
    Ok((out, offset))
}

/// Draws the cell boundaries of the calibrated grid onto a rectified image.
pub fn draw_grid_overlay(image: &mut RgbImage, mapper: &CoordinateMapper, offset: Offset) {
    let calibration = mapper.calibration();
    let bounds = calibration.arena_bounds();

    let xs = (0..calibration.grid_cols())
        .filter_map(|col| mapper.cell_rect(0, col))
        .map(|rect| rect.left)
        .chain(std::iter::once(bounds.right()));
    for x in xs {
        draw_line(
            image,
            offset.to_pixel(x, bounds.top),
            offset.to_pixel(x, bounds.bottom()),
        );
    }

    let ys = (0..calibration.grid_rows())
        .filter_map(|row| mapper.cell_rect(row, 0))
        .map(|rect| rect.top)
        .chain(std::iter::once(bounds.bottom()));
    for y in ys {
        draw_line(
            image,
            offset.to_pixel(bounds.left, y),
            offset.to_pixel(bounds.right(), y),
        );
    }
}

/// Darkens obstacle cells so the camera image stays visible underneath.
pub fn draw_obstacles(
    image: &mut RgbImage,
    mapper: &CoordinateMapper,
    offset: Offset,
    grid: &GridState,
) {
    let mut tinted = image.clone();
    let mut any = false;
    for row in 0..grid.rows() {
        for col in 0..grid.cols() {
            if grid.get(row, col) != Some(Cell::Obstacle) {
                continue;
            }
            let rect = match mapper.cell_rect(row, col) {
                Some(rect) => rect,
                None => continue,
            };
            let (x0, y0) = offset.to_pixel(rect.left, rect.top);
            let (x1, y1) = offset.to_pixel(rect.left + rect.width, rect.top + rect.height);
            let (x0, y0, x1, y1) = (
                x0.round() as i32,
                y0.round() as i32,
                x1.round() as i32,
                y1.round() as i32,
            );
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            draw_filled_rect_mut(
                &mut tinted,
                Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32),
                OBSTACLE_TINT,
            );
            any = true;
        }
    }
    if !any {
        return;
    }

    for (dst, src) in image.pixels_mut().zip(tinted.pixels()) {
        for c in 0..3 {
            let blended =
                src.0[c] as f32 * OBSTACLE_ALPHA + dst.0[c] as f32 * (1.0 - OBSTACLE_ALPHA);
            dst.0[c] = blended.round() as u8;
        }
    }
}

/// Axis-aligned line, clipped to the image before rasterizing.
fn draw_line(image: &mut RgbImage, from: (f64, f64), to: (f64, f64)) {
    let (w, h) = (image.width() as f64, image.height() as f64);
    let clamp = |v: f64, max: f64| v.round().clamp(-1.0, max) as i64;
    let start = (clamp(from.0, w), clamp(from.1, h));
    let end = (clamp(to.0, w), clamp(to.1, h));
    for (x, y) in Bresenham::new(start, end) {
        if x >= 0 && y >= 0 && (x as f64) < w && (y as f64) < h {
            image.put_pixel(x as u32, y as u32, GRID_LINE);
        }
    }
}

/// Fisheye correction followed by the perspective warp of the calibration.
#[derive(Debug, Clone)]
pub struct WarpRectifier {
    mapper: CoordinateMapper,
}

impl WarpRectifier {
    pub fn new(mapper: CoordinateMapper) -> Self {
        Self { mapper }
    }

    /// Rectifies an image that is already in memory.
    pub fn rectify(&self, image: &RgbImage, show_grid: bool) -> Result<(RgbImage, Offset)> {
        let calibration = self.mapper.calibration();
        if image.dimensions() != calibration.image_size() {
            warn!(
                "Image is {}x{} but the calibration expects {}x{}",
                image.width(),
                image.height(),
                calibration.image_size().0,
                calibration.image_size().1
            );
        }
        let undistorted = undistort(image, calibration.fisheye());
        let (mut rectified, offset) = warp(&undistorted, calibration.homography())?;
        if show_grid {
            draw_grid_overlay(&mut rectified, &self.mapper, offset);
        }
        Ok((rectified, offset))
    }
}

impl ImageRectifier for WarpRectifier {
    type Image = RgbImage;

    fn transform_image(&self, path: &Path, show_grid: bool) -> Result<(RgbImage, Offset)> {
        let image = image::open(path)
            .map_err(|e| OverlayError::ImageLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8();
        self.rectify(&image, show_grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::calibration::{ArenaBounds, CalibrationData};
    use std::sync::Arc;

    const RED: Rgb<u8> = Rgb([200, 10, 10]);

    fn mapper(homography: Homography, fisheye: FisheyeModel) -> CoordinateMapper {
        let calibration = CalibrationData::new(
            100,
            80,
            fisheye,
            homography,
            ArenaBounds {
                left: 0.0,
                top: 0.0,
                width: 100.0,
                height: 80.0,
            },
            2,
            2,
            None,
        )
        .unwrap();
        CoordinateMapper::new(Arc::new(calibration))
    }

    #[test]
    fn test_undistort_without_coefficient_pads() {
        let image = RgbImage::from_pixel(100, 80, RED);
        let fisheye = FisheyeModel::new(0.0, Point::new(50.0, 40.0), 10.0, 5.0);
        let out = undistort(&image, &fisheye);
        assert_eq!(out.dimensions(), (120, 90));
        assert_eq!(*out.get_pixel(15, 10), RED);
        assert_eq!(*out.get_pixel(2, 2), BACKGROUND);
    }

    #[test]
    fn test_undistort_keeps_center() {
        let image = RgbImage::from_pixel(100, 80, RED);
        let fisheye = FisheyeModel::new(-1e-5, Point::new(50.0, 40.0), 0.0, 0.0);
        let out = undistort(&image, &fisheye);
        assert_eq!(out.dimensions(), (100, 80));
        assert_eq!(*out.get_pixel(50, 40), RED);
    }

    #[test]
    fn test_identity_warp() {
        let image = RgbImage::from_pixel(100, 80, RED);
        let (out, offset) = warp(&image, &Homography::identity()).unwrap();
        assert_eq!(out.dimensions(), (100, 80));
        assert_eq!(offset, Offset::default());
        assert_eq!(*out.get_pixel(40, 40), RED);
    }

    #[test]
    fn test_translation_reported_as_offset() {
        let image = RgbImage::from_pixel(100, 80, RED);
        let h = Homography::from_rows([[1.0, 0.0, 50.0], [0.0, 1.0, -20.0], [0.0, 0.0, 1.0]])
            .unwrap();
        let (out, offset) = warp(&image, &h).unwrap();
        assert_eq!(out.dimensions(), (100, 80));
        assert_eq!(offset.offset_x, 50.0);
        assert_eq!(offset.offset_y, -20.0);
        // The output pixel at the image center maps back to the canvas point
        // the homography sends the source center to.
        let center = h.project(Point::new(50.0, 40.0));
        assert_eq!(offset.to_canvas(50.0, 40.0), (center.x, center.y));
    }

    #[test]
    fn test_scaling_crops_to_projection() {
        let image = RgbImage::from_pixel(100, 80, RED);
        let h = Homography::from_rows([[0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let (out, offset) = warp(&image, &h).unwrap();
        assert_eq!(out.dimensions(), (50, 40));
        assert_eq!(offset, Offset::default());
    }

    #[test]
    fn test_image_at_infinity_rejected() {
        let image = RgbImage::from_pixel(100, 80, RED);
        let h = Homography::from_rows([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-0.01, 0.0, 1.0]])
            .unwrap();
        assert!(matches!(warp(&image, &h), Err(OverlayError::Config(_))));
    }

    #[test]
    fn test_grid_lines_follow_cells() {
        let m = mapper(Homography::identity(), FisheyeModel::identity(100, 80));
        let mut image = RgbImage::from_pixel(100, 80, BACKGROUND);
        draw_grid_overlay(&mut image, &m, Offset::default());
        assert_eq!(*image.get_pixel(50, 10), GRID_LINE);
        assert_eq!(*image.get_pixel(10, 40), GRID_LINE);
        assert_eq!(*image.get_pixel(0, 10), GRID_LINE);
        assert_eq!(*image.get_pixel(25, 20), BACKGROUND);
    }

    #[test]
    fn test_grid_lines_respect_offset() {
        let m = mapper(Homography::identity(), FisheyeModel::identity(100, 80));
        let mut image = RgbImage::from_pixel(100, 80, BACKGROUND);
        let offset = Offset {
            offset_x: 20.0,
            offset_y: 0.0,
        };
        draw_grid_overlay(&mut image, &m, offset);
        // Canvas x = 50 is pixel x = 30.
        assert_eq!(*image.get_pixel(30, 10), GRID_LINE);
        assert_eq!(*image.get_pixel(50, 10), BACKGROUND);
    }

    #[test]
    fn test_obstacles_are_tinted() {
        let m = mapper(Homography::identity(), FisheyeModel::identity(100, 80));
        let mut image = RgbImage::from_pixel(100, 80, BACKGROUND);
        let mut grid = GridState::new(2, 2);
        grid.set(0, 0, Cell::Obstacle).unwrap();
        draw_obstacles(&mut image, &m, Offset::default(), &grid);
        assert_eq!(*image.get_pixel(10, 10), Rgb([12, 12, 12]));
        assert_eq!(*image.get_pixel(75, 60), BACKGROUND);
    }

    #[test]
    fn test_transform_image_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::from_pixel(100, 80, RED).save(&path).unwrap();

        let rectifier = WarpRectifier::new(mapper(
            Homography::identity(),
            FisheyeModel::identity(100, 80),
        ));
        let (out, offset) = rectifier.transform_image(&path, true).unwrap();
        assert_eq!(out.dimensions(), (100, 80));
        assert_eq!(offset, Offset::default());
        assert_eq!(*out.get_pixel(50, 10), GRID_LINE);
        assert_eq!(*out.get_pixel(20, 20), RED);
    }

    #[test]
    fn test_unreadable_image() {
        let dir = tempfile::tempdir().unwrap();
        let rectifier = WarpRectifier::new(mapper(
            Homography::identity(),
            FisheyeModel::identity(100, 80),
        ));
        let res = rectifier.transform_image(&dir.path().join("missing.png"), false);
        assert!(matches!(res, Err(OverlayError::ImageLoad { .. })));

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"not an image").unwrap();
        let res = rectifier.transform_image(&garbage, false);
        assert!(matches!(res, Err(OverlayError::ImageLoad { .. })));
    }
}
