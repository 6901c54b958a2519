pub mod calibration;
pub mod fisheye;
pub mod homography;
