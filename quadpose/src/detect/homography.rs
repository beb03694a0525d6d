use nalgebra::Matrix3;

use crate::types::Point2;

/// A 3x3 plane-to-plane homography.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub data: Matrix3<f64>,
}

impl Homography {
    /// Compute the homography mapping each `src[i]` onto `dst[i]`.
    ///
    /// Both point sets are conditioned (centroid at the origin, mean distance
    /// sqrt(2)) before solving the 8x9 DLT system, so the pivot threshold is
    /// scale independent. Returns `None` when three or more points are
    /// collinear or coincident.
    pub fn from_correspondences(src: &[Point2; 4], dst: &[Point2; 4]) -> Option<Self> {
        let (src_n, t_src) = condition(src)?;
        let (dst_n, t_dst) = condition(dst)?;

        // Build 8x9 DLT system
        let mut a = [[0.0f64; 9]; 8];
        for i in 0..4 {
            let (sx, sy) = (src_n[i].x, src_n[i].y);
            let (dx, dy) = (dst_n[i].x, dst_n[i].y);

            let row0 = i * 2;
            a[row0][0] = sx;
            a[row0][1] = sy;
            a[row0][2] = 1.0;
            a[row0][6] = -sx * dx;
            a[row0][7] = -sy * dx;
            a[row0][8] = dx;

            let row1 = i * 2 + 1;
            a[row1][3] = sx;
            a[row1][4] = sy;
            a[row1][5] = 1.0;
            a[row1][6] = -sx * dy;
            a[row1][7] = -sy * dy;
            a[row1][8] = dy;
        }

        // Gaussian elimination with partial pivoting (8x9 augmented)
        for col in 0..8 {
            let mut max_val = a[col][col].abs();
            let mut max_row = col;
            for row in (col + 1)..8 {
                let v = a[row][col].abs();
                if v > max_val {
                    max_val = v;
                    max_row = row;
                }
            }
            if max_val < 1e-10 {
                return None;
            }

            if max_row != col {
                a.swap(col, max_row);
            }

            let pivot = a[col][col];
            for row in (col + 1)..8 {
                let factor = a[row][col] / pivot;
                for c in col..9 {
                    a[row][c] -= factor * a[col][c];
                }
            }
        }

        // Back-substitute (h[8] = 1, solve for h[0..8])
        let mut h = [0.0f64; 9];
        h[8] = 1.0;
        for row in (0..8).rev() {
            let mut sum = a[row][8];
            for c in (row + 1)..8 {
                sum -= a[row][c] * h[c];
            }
            h[row] = sum / a[row][row];
        }

        let hn = Matrix3::from_row_slice(&h);
        // Collinear targets still satisfy the DLT system, but only with a
        // rank-deficient matrix.
        if hn.determinant().abs() < 1e-10 * hn.norm().powi(3) {
            return None;
        }
        let t_dst_inv = t_dst.try_inverse()?;
        let data = t_dst_inv * hn * t_src;
        if data.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Homography { data })
    }

    /// Map a point through the homography.
    #[cfg(test)]
    fn project(&self, p: &Point2) -> Point2 {
        let v = self.data * nalgebra::Vector3::new(p.x, p.y, 1.0);
        Point2::new(v.x / v.z, v.y / v.z)
    }
}

/// Translate and scale points so their centroid is the origin and their
/// mean distance from it is sqrt(2). Returns the conditioned points and the
/// conditioning transform.
fn condition(points: &[Point2; 4]) -> Option<([Point2; 4], Matrix3<f64>)> {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;
    if !mean_dist.is_finite() || mean_dist < 1e-300 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let conditioned = points.map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)));
    Some((conditioned, t))
}
