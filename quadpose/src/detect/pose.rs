use nalgebra::{Matrix3, Rotation3, SMatrix, SVector, Vector3, Vector6};

use super::camera::CameraModel;
use super::correspond::Correspondence;
use super::homography::Homography;
use crate::error::{ConfigError, FailureReason};
use crate::types::{Point2, Point3};

/// Rigid transform taking object-frame points into the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from an axis-angle (Rodrigues) vector and a translation.
    pub fn from_rvec(rvec: &Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(*rvec), translation)
    }

    /// Axis-angle (Rodrigues) vector of the rotation.
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    /// Map an object-frame point into the camera frame.
    pub fn transform(&self, p: &Point3) -> Point3 {
        self.rotation * p + self.translation
    }

    fn to_params(self) -> Vector6<f64> {
        let r = self.rvec();
        let t = self.translation;
        Vector6::new(r.x, r.y, r.z, t.x, t.y, t.z)
    }

    fn from_params(x: &Vector6<f64>) -> Self {
        Self::from_rvec(
            &Vector3::new(x[0], x[1], x[2]),
            Vector3::new(x[3], x[4], x[5]),
        )
    }
}

/// Levenberg-Marquardt stopping rules.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SolverParams {
    pub max_iterations: usize,
    /// Relative step and relative cost-change threshold.
    pub convergence_epsilon: f64,
    /// Largest accepted RMS corner reprojection error, in pixels.
    pub max_reprojection_rmse: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            convergence_epsilon: 1e-10,
            max_reprojection_rmse: 2.0,
        }
    }
}

impl SolverParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidSolverParams(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !self.convergence_epsilon.is_finite() || self.convergence_epsilon <= 0.0 {
            return Err(ConfigError::InvalidSolverParams(format!(
                "convergence_epsilon must be finite and positive, got {}",
                self.convergence_epsilon
            )));
        }
        if self.max_reprojection_rmse.is_nan() || self.max_reprojection_rmse <= 0.0 {
            return Err(ConfigError::InvalidSolverParams(format!(
                "max_reprojection_rmse must be positive, got {}",
                self.max_reprojection_rmse
            )));
        }
        Ok(())
    }
}

/// A refined pose with its fit quality.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoseSolution {
    pub pose: Pose,
    /// Root-mean-square corner reprojection error in pixels.
    pub reprojection_rmse: f64,
    /// Refinement iterations used.
    pub iterations: usize,
}

/// Triangles smaller than this fraction of the squared extent are flat.
const MIN_TRIANGLE_AREA: f64 = 1e-9;
/// Sum of squared pixel residuals treated as an exact fit.
const COST_FLOOR: f64 = 1e-24;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;

/// Estimate the target pose from four correspondences.
///
/// The image points are undistorted, a planar homography seeds the pose,
/// and Levenberg-Marquardt refines it against the distorted pixel
/// observations. A fit whose RMS reprojection error exceeds
/// `params.max_reprojection_rmse` is reported as `NonConvergent`.
pub fn solve_pose(
    corr: &Correspondence,
    camera: &CameraModel,
    params: &SolverParams,
) -> Result<PoseSolution, FailureReason> {
    // Undistortion bends collinear pixels off their line, so check both.
    if is_degenerate(&corr.image) {
        return Err(FailureReason::DegenerateGeometry);
    }
    let normalized = corr.image.map(|p| camera.normalize(&p));
    if is_degenerate(&normalized) {
        return Err(FailureReason::DegenerateGeometry);
    }

    let planar = corr.object.map(|p| Point2::new(p.x, p.y));
    let h = Homography::from_correspondences(&planar, &normalized)
        .ok_or(FailureReason::DegenerateGeometry)?;
    let initial = homography_to_pose(&h).ok_or(FailureReason::DegenerateGeometry)?;

    let (pose, iterations) = refine(&initial, corr, camera, params)?;
    let reprojection_rmse =
        reprojection_rmse(&pose, corr, camera).ok_or(FailureReason::NonConvergent)?;
    if !(reprojection_rmse <= params.max_reprojection_rmse) {
        return Err(FailureReason::NonConvergent);
    }
    Ok(PoseSolution {
        pose,
        reprojection_rmse,
        iterations,
    })
}

/// RMS pixel distance between the observed corners and the object points
/// projected through `pose`. `None` if a point falls behind the camera.
pub fn reprojection_rmse(pose: &Pose, corr: &Correspondence, camera: &CameraModel) -> Option<f64> {
    let r = residuals(&pose.to_params(), corr, camera)?;
    Some((r.norm_squared() / 4.0).sqrt())
}

/// Coincident pairs and near-collinear triples, relative to the spread of
/// the points.
fn is_degenerate(pts: &[Point2; 4]) -> bool {
    if pts.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return true;
    }
    let mut extent2: f64 = 0.0;
    for i in 0..4 {
        for j in (i + 1)..4 {
            extent2 = extent2.max((pts[j] - pts[i]).norm_squared());
        }
    }
    if extent2 <= 0.0 {
        return true;
    }
    (0..4).any(|skip| {
        let [a, b, c]: [Point2; 3] = match skip {
            0 => [pts[1], pts[2], pts[3]],
            1 => [pts[0], pts[2], pts[3]],
            2 => [pts[0], pts[1], pts[3]],
            _ => [pts[0], pts[1], pts[2]],
        };
        let (ab, ac) = (b - a, c - a);
        let area = 0.5 * (ab.x * ac.y - ab.y * ac.x).abs();
        area < MIN_TRIANGLE_AREA * extent2
    })
}

/// Recover `[R | t]` from a homography mapping the object plane onto
/// normalized image coordinates.
fn homography_to_pose(h: &Homography) -> Option<Pose> {
    let hd = &h.data;
    let c0: Vector3<f64> = hd.column(0).into_owned();
    let c1: Vector3<f64> = hd.column(1).into_owned();
    let c2: Vector3<f64> = hd.column(2).into_owned();

    let scale = (c0.norm() + c1.norm()) / 2.0;
    if !scale.is_finite() || scale < 1e-300 {
        return None;
    }
    // The target must sit in front of the camera.
    let sign = if c2.z < 0.0 { -1.0 } else { 1.0 };
    let r0 = c0 * (sign / scale);
    let r1 = c1 * (sign / scale);
    let t = c2 * (sign / scale);
    let r2 = r0.cross(&r1);

    let r_raw = Matrix3::from_columns(&[r0, r1, r2]);
    let rotation = project_to_so3(&r_raw)?;
    Some(Pose::new(rotation, t))
}

/// Nearest rotation to `m` in the Frobenius sense.
fn project_to_so3(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
        r = u * v_t;
    }
    Some(Rotation3::from_matrix_unchecked(r))
}

/// Levenberg-Marquardt over (axis-angle, translation) with a central
/// difference Jacobian. Returns the pose and the iterations used.
pub(crate) fn refine(
    initial: &Pose,
    corr: &Correspondence,
    camera: &CameraModel,
    params: &SolverParams,
) -> Result<(Pose, usize), FailureReason> {
    let eps = params.convergence_epsilon;
    let mut x = initial.to_params();
    let mut r = residuals(&x, corr, camera).ok_or(FailureReason::NonConvergent)?;
    let mut cost = r.norm_squared();
    if cost < COST_FLOOR {
        return Ok((Pose::from_params(&x), 0));
    }

    let mut lambda = LAMBDA_INIT;
    for iter in 1..=params.max_iterations {
        let j = jacobian(&x, corr, camera).ok_or(FailureReason::NonConvergent)?;
        let jtj = j.transpose() * j;
        let g = j.transpose() * r;

        let mut a = jtj;
        for k in 0..6 {
            a[(k, k)] += lambda * jtj[(k, k)].max(f64::EPSILON);
        }
        let Some(chol) = a.cholesky() else {
            lambda *= 10.0;
            continue;
        };
        let delta = chol.solve(&(-g));
        if delta.iter().any(|v| !v.is_finite()) {
            return Err(FailureReason::NonConvergent);
        }

        let step_small = delta.norm() <= eps * (x.norm() + eps);
        let x_new = x + delta;
        match residuals(&x_new, corr, camera) {
            Some(r_new) if r_new.norm_squared() < cost => {
                let cost_new = r_new.norm_squared();
                let converged = step_small || cost - cost_new <= eps * cost || cost_new < COST_FLOOR;
                x = x_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda * 0.1).max(LAMBDA_MIN);
                if converged {
                    return Ok((Pose::from_params(&x), iter));
                }
            }
            _ => {
                // No improvement possible at machine precision.
                if step_small {
                    return Ok((Pose::from_params(&x), iter));
                }
                lambda *= 10.0;
            }
        }
    }
    Err(FailureReason::NonConvergent)
}

/// Pixel residuals `projected - observed`, interleaved x, y per corner.
fn residuals(
    x: &Vector6<f64>,
    corr: &Correspondence,
    camera: &CameraModel,
) -> Option<SVector<f64, 8>> {
    let pose = Pose::from_params(x);
    let mut r = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let px = camera.project(&pose.transform(&corr.object[i]))?;
        r[2 * i] = px.x - corr.image[i].x;
        r[2 * i + 1] = px.y - corr.image[i].y;
    }
    r.iter().all(|v| v.is_finite()).then_some(r)
}

fn jacobian(
    x: &Vector6<f64>,
    corr: &Correspondence,
    camera: &CameraModel,
) -> Option<SMatrix<f64, 8, 6>> {
    let mut j = SMatrix::<f64, 8, 6>::zeros();
    for k in 0..6 {
        let h = 1e-6 * x[k].abs().max(1.0);
        let mut xp = *x;
        let mut xm = *x;
        xp[k] += h;
        xm[k] -= h;
        let d = (residuals(&xp, corr, camera)? - residuals(&xm, corr, camera)?) / (2.0 * h);
        j.set_column(k, &d);
    }
    Some(j)
}
