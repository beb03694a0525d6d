pub mod approx;
pub mod quad;
pub mod correspond;
#[allow(clippy::needless_range_loop)]
pub mod homography;
pub mod camera;
#[allow(clippy::needless_range_loop)]
pub mod pose;
pub mod pipeline;
