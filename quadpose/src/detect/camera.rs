use nalgebra::{Matrix3, Vector2, Vector3};

use crate::error::ConfigError;
use crate::types::{Point2, Point3};

/// Brown-Conrady lens distortion in OpenCV coefficient order
/// `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

const UNDISTORT_ITERS: usize = 20;

impl Distortion {
    /// Accepts 0, 4 (`k1 k2 p1 p2`) or 5 (`k1 k2 p1 p2 k3`) coefficients.
    pub fn from_coeffs(coeffs: &[f64]) -> Result<Self, ConfigError> {
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::InvalidIntrinsics(
                "distortion coefficients must be finite".into(),
            ));
        }
        match *coeffs {
            [] => Ok(Self::default()),
            [k1, k2, p1, p2] => Ok(Self { k1, k2, p1, p2, k3: 0.0 }),
            [k1, k2, p1, p2, k3] => Ok(Self { k1, k2, p1, p2, k3 }),
            _ => Err(ConfigError::DistortionLength(coeffs.len())),
        }
    }

    pub fn coeffs(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs().iter().all(|&c| c == 0.0)
    }

    /// Map an undistorted normalized point to its distorted position.
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, d: Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return d;
        }
        let mut x = d.x;
        let mut y = d.y;
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let nx = (d.x - dx) / radial;
            let ny = (d.y - dy) / radial;
            let done = (nx - x).abs() < 1e-15 && (ny - y).abs() < 1e-15;
            x = nx;
            y = ny;
            if done {
                break;
            }
        }
        Vector2::new(x, y)
    }
}

/// Plain-data camera description, as found in configuration files.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraSpec {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub skew: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub distortion: Vec<f64>,
}

/// Calibrated pinhole camera with lens distortion.
///
/// Immutable once built; maps camera-frame points to distorted pixels and
/// back to undistorted normalized image coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "CameraSpec", into = "CameraSpec")
)]
pub struct CameraModel {
    k: Matrix3<f64>,
    k_inv: Matrix3<f64>,
    distortion: Distortion,
}

impl CameraModel {
    pub fn new(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        distortion: &[f64],
    ) -> Result<Self, ConfigError> {
        let k = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
        Self::from_matrix(&k, distortion)
    }

    /// Build from a full 3x3 intrinsic matrix (skew allowed).
    pub fn from_matrix(k: &Matrix3<f64>, distortion: &[f64]) -> Result<Self, ConfigError> {
        if k.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidIntrinsics("non-finite entry".into()));
        }
        if k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 {
            return Err(ConfigError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                k[(0, 0)],
                k[(1, 1)]
            )));
        }
        if k[(1, 0)] != 0.0 || k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 || k[(2, 2)] != 1.0 {
            return Err(ConfigError::InvalidIntrinsics(
                "matrix must be upper triangular with k[2][2] = 1".into(),
            ));
        }
        let k_inv = k
            .try_inverse()
            .ok_or_else(|| ConfigError::InvalidIntrinsics("matrix is singular".into()))?;
        Ok(Self {
            k: *k,
            k_inv,
            distortion: Distortion::from_coeffs(distortion)?,
        })
    }

    pub fn from_spec(spec: &CameraSpec) -> Result<Self, ConfigError> {
        let k = Matrix3::new(
            spec.fx, spec.skew, spec.cx, 0.0, spec.fy, spec.cy, 0.0, 0.0, 1.0,
        );
        Self::from_matrix(&k, &spec.distortion)
    }

    pub fn intrinsics(&self) -> &Matrix3<f64> {
        &self.k
    }

    pub fn distortion(&self) -> &Distortion {
        &self.distortion
    }

    /// Project a camera-frame point to a distorted pixel.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p: &Point3) -> Option<Point2> {
        if p.z <= 1e-12 {
            return None;
        }
        let n = Vector2::new(p.x / p.z, p.y / p.z);
        Some(self.pixel_from_normalized(&Point2::from(n)))
    }

    /// Distort an undistorted normalized point and apply the intrinsics.
    pub fn pixel_from_normalized(&self, n: &Point2) -> Point2 {
        let d = self.distortion.distort(n.coords);
        let px = self.k * Vector3::new(d.x, d.y, 1.0);
        Point2::new(px.x, px.y)
    }

    /// Remove intrinsics and lens distortion from a pixel.
    pub fn normalize(&self, px: &Point2) -> Point2 {
        let d = self.k_inv * Vector3::new(px.x, px.y, 1.0);
        Point2::from(self.distortion.undistort(Vector2::new(d.x, d.y)))
    }
}

impl TryFrom<CameraSpec> for CameraModel {
    type Error = ConfigError;

    fn try_from(spec: CameraSpec) -> Result<Self, Self::Error> {
        Self::from_spec(&spec)
    }
}

impl From<CameraModel> for CameraSpec {
    fn from(camera: CameraModel) -> Self {
        let k = camera.k;
        let coeffs = camera.distortion.coeffs();
        let distortion = if camera.distortion.is_zero() {
            Vec::new()
        } else {
            coeffs.to_vec()
        };
        CameraSpec {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
            distortion,
        }
    }
}
