use thiserror::Error;

/// A contour that cannot be fed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContourError {
    #[error("contour needs at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("contour point {0} is not finite")]
    NonFinitePoint(usize),
}

/// Invalid configuration, camera or object model.
///
/// Raised once at construction time, never while processing a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("approximation tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),

    #[error("aspect ratio range [{min}, {max}] is invalid")]
    InvalidAspectRange { min: f64, max: f64 },

    #[error("quadrilateral policy needs {expected} vertices, got {actual}")]
    InvalidVertexCount { expected: usize, actual: usize },

    #[error("invalid solver parameters: {0}")]
    InvalidSolverParams(String),

    #[error("object model needs exactly 4 points, got {0}")]
    ObjectPointCount(usize),

    #[error("object point {index} has z = {z}, object points must lie in the z = 0 plane")]
    NonPlanarObject { index: usize, z: f64 },

    #[error("object model points are collinear or coincident")]
    DegenerateObject,

    #[error("invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    #[error("expected 0, 4 or 5 distortion coefficients, got {0}")]
    DistortionLength(usize),

    #[cfg(feature = "serde")]
    #[error("config error: {0}")]
    Parse(String),
}

/// Why a validated quadrilateral could not be turned into a pose.
///
/// Per-candidate and non-fatal: the rest of the frame is still processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureReason {
    #[error("quad winding cannot be determined")]
    AmbiguousCorrespondence,

    #[error("image points are collinear or coincident")]
    DegenerateGeometry,

    #[error("pose refinement did not converge to an acceptable fit")]
    NonConvergent,
}
