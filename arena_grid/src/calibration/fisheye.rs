use crate::Point;

/// Single-parameter division model for lens distortion plus the margins the
/// undistorted image is padded with.
///
/// Negative `k` corrects barrel distortion (the usual fisheye case), positive
/// `k` pincushion. Undistorted points are shifted by the margins so the
/// stretched corners of the image stay on a non-negative canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FisheyeModel {
    /// Distortion coefficient.
    pub k: f64,
    /// Distortion center in source image pixels.
    pub center: Point,
    /// Horizontal padding of the undistorted canvas.
    pub margin_x: f64,
    /// Vertical padding of the undistorted canvas.
    pub margin_y: f64,
}

impl FisheyeModel {
    pub fn new(k: f64, center: Point, margin_x: f64, margin_y: f64) -> Self {
        Self {
            k,
            center,
            margin_x,
            margin_y,
        }
    }

    /// Zero distortion, no margins, centered on the image.
    pub fn identity(image_width: u32, image_height: u32) -> Self {
        Self::new(
            0.0,
            Point::new(image_width as f64 / 2.0, image_height as f64 / 2.0),
            0.0,
            0.0,
        )
    }

    /// Size of the padded canvas that undistorted points land on.
    pub fn padded_size(&self, image_width: u32, image_height: u32) -> (u32, u32) {
        (
            image_width + (2.0 * self.margin_x).round() as u32,
            image_height + (2.0 * self.margin_y).round() as u32,
        )
    }

    /// Raw camera pixel -> padded undistorted canvas.
    pub fn undistort_point(&self, distorted: Point) -> Point {
        let d = distorted - self.center;
        let denom = 1.0 + self.k * d.norm_squared();
        let corrected = if denom.abs() < 1e-12 || !denom.is_finite() {
            distorted
        } else {
            self.center + d / denom
        };
        corrected + self.margin()
    }

    /// Padded undistorted canvas -> raw camera pixel.
    ///
    /// The division model has no closed-form inverse, so this runs a
    /// fixed-point iteration. Returns `None` when it diverges or has not
    /// settled after 50 steps.
    pub fn distort_point(&self, undistorted: Point) -> Option<Point> {
        let u = undistorted - self.margin() - self.center;
        if self.k.abs() < 1e-18 {
            return Some(self.center + u);
        }
        let mut d = u;
        for _ in 0..50 {
            let factor = 1.0 + self.k * d.norm_squared();
            if factor.abs() < 1e-12 || !factor.is_finite() {
                return None;
            }
            let next = u * factor;
            if !next.x.is_finite() || !next.y.is_finite() {
                return None;
            }
            let delta = (next - d).norm();
            d = next;
            if delta < 1e-9 {
                return Some(self.center + d);
            }
        }
        None
    }

    fn margin(&self) -> Point {
        Point::new(self.margin_x, self.margin_y)
    }
}
