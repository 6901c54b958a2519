//! Perspective transform from the undistorted camera canvas to the top-down
//! rectified canvas.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::error::{OverlayError, Result};
use crate::Point;

/// Smallest |det| accepted before a homography is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// An invertible 3×3 homography together with its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Wraps a matrix, rejecting non-finite or singular ones.
    pub fn new(matrix: Matrix3<f64>) -> Result<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(OverlayError::Config(
                "homography contains non-finite entries".into(),
            ));
        }
        if matrix.determinant().abs() < SINGULAR_EPS {
            return Err(OverlayError::Config("homography is not invertible".into()));
        }
        let inverse = matrix
            .try_inverse()
            .ok_or_else(|| OverlayError::Config("homography is not invertible".into()))?;
        Ok(Self {
            forward: matrix,
            inverse,
        })
    }

    pub fn identity() -> Self {
        Self {
            forward: Matrix3::identity(),
            inverse: Matrix3::identity(),
        }
    }

    /// Builds a homography from a row-major 3×3 array as stored in JSON.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self> {
        Self::new(Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ))
    }

    /// Solves the exact homography mapping each `src[i]` onto `dst[i]`.
    ///
    /// Fixes h33 = 1 and solves the remaining 8 unknowns directly. Fails
    /// when three of the points are collinear.
    pub fn from_correspondences(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Result<Self> {
        if has_collinear_triple(src) || has_collinear_triple(dst) {
            return Err(OverlayError::Config(
                "three corner points are collinear".into(),
            ));
        }

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for i in 0..4 {
            let (x, y) = (src[i][0], src[i][1]);
            let (u, v) = (dst[i][0], dst[i][1]);

            // u = (h11 x + h12 y + h13) / (h31 x + h32 y + 1)
            a[(2 * i, 0)] = x;
            a[(2 * i, 1)] = y;
            a[(2 * i, 2)] = 1.0;
            a[(2 * i, 6)] = -u * x;
            a[(2 * i, 7)] = -u * y;
            b[2 * i] = u;

            // v = (h21 x + h22 y + h23) / (h31 x + h32 y + 1)
            a[(2 * i + 1, 3)] = x;
            a[(2 * i + 1, 4)] = y;
            a[(2 * i + 1, 5)] = 1.0;
            a[(2 * i + 1, 6)] = -v * x;
            a[(2 * i + 1, 7)] = -v * y;
            b[2 * i + 1] = v;
        }

        let h = a.lu().solve(&b).ok_or_else(|| {
            OverlayError::Config("corner correspondences are degenerate".into())
        })?;
        Self::new(Matrix3::new(
            h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
        ))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    pub fn inverse_matrix(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    /// Undistorted canvas -> rectified canvas.
    pub fn project(&self, p: Point) -> Point {
        project(&self.forward, p)
    }

    /// Rectified canvas -> undistorted canvas.
    pub fn unproject(&self, p: Point) -> Point {
        project(&self.inverse, p)
    }
}

fn has_collinear_triple(pts: &[[f64; 2]; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES.iter().any(|&(i, j, k)| {
        let (a, b, c) = (pts[i], pts[j], pts[k]);
        let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        cross.abs() < 1e-9
    })
}

/// H * [x, y, 1]^T, dehomogenized. Points on the line at infinity come back
/// as NaN rather than failing.
pub fn project(h: &Matrix3<f64>, p: Point) -> Point {
    let q = h * Vector3::new(p.x, p.y, 1.0);
    if q[2].abs() < 1e-15 {
        return Point::new(f64::NAN, f64::NAN);
    }
    Point::new(q[0] / q[2], q[1] / q[2])
}
