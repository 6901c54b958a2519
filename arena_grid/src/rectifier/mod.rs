pub mod image_rectifier;
#[cfg(feature = "imaging")]
pub mod warp;

/// Rectifier used by [`Overlay`](crate::Overlay) for this build.
#[cfg(feature = "imaging")]
pub type DefaultRectifier = warp::WarpRectifier;
#[cfg(not(feature = "imaging"))]
pub type DefaultRectifier = image_rectifier::NoRectifier;

/// Image type produced by [`DefaultRectifier`].
pub type RectifiedImage =
    <DefaultRectifier as image_rectifier::ImageRectifier>::Image;
