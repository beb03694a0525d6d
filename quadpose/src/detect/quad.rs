use thiserror::Error;

use super::approx::Polygon;
use crate::types::{signed_area, Point2};

/// A validated quadrilateral in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quad {
    /// Corner positions, clockwise on screen (y down).
    pub corners: [Point2; 4],
}

impl Quad {
    /// Validate `polygon` against `policy` and build a clockwise quad.
    pub fn from_polygon(polygon: &Polygon, policy: &QuadPolicy) -> Result<Self, Rejection> {
        validate(polygon, policy)?;
        let corners: [Point2; 4] = polygon.vertices().try_into().map_err(|_| Rejection::VertexCount {
            expected: 4,
            actual: polygon.len(),
        })?;
        Ok(Self::from_corners(corners))
    }

    /// Wrap four corners, reversing a counter-clockwise sequence in place
    /// while keeping the first corner.
    pub fn from_corners(corners: [Point2; 4]) -> Self {
        let [a, b, c, d] = corners;
        if signed_area(&corners.map(|p| [p.x, p.y])) < 0.0 {
            Self {
                corners: [a, d, c, b],
            }
        } else {
            Self { corners }
        }
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.corners.map(|p| [p.x, p.y])).abs()
    }

    /// Mean of the four corners.
    pub fn center(&self) -> Point2 {
        let sum = self
            .corners
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / 4.0)
    }
}

/// Geometric acceptance criteria for candidate polygons.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct QuadPolicy {
    pub exact_vertex_count: usize,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub require_convex: bool,
}

impl Default for QuadPolicy {
    fn default() -> Self {
        Self {
            exact_vertex_count: 4,
            min_aspect_ratio: 1.0,
            max_aspect_ratio: 5.0,
            require_convex: true,
        }
    }
}

/// Why a candidate polygon was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Rejection {
    #[error("contour simplified to fewer than 3 vertices")]
    Collapsed,

    #[error("expected {expected} vertices, got {actual}")]
    VertexCount { expected: usize, actual: usize },

    #[error("polygon is not convex")]
    NotConvex,

    #[error("aspect ratio {ratio} outside the accepted range")]
    AspectRatio { ratio: f64 },
}

/// Check `polygon` against `policy`, stopping at the first failure.
///
/// Order: vertex count, convexity (when required), then aspect ratio for
/// four-vertex polygons.
pub fn validate(polygon: &Polygon, policy: &QuadPolicy) -> Result<(), Rejection> {
    let v = polygon.vertices();
    if v.len() != policy.exact_vertex_count {
        return Err(Rejection::VertexCount {
            expected: policy.exact_vertex_count,
            actual: v.len(),
        });
    }
    if policy.require_convex && !is_convex(v) {
        return Err(Rejection::NotConvex);
    }
    if let Ok(corners) = <&[Point2; 4]>::try_from(v) {
        let ratio = aspect_ratio(corners);
        if !(ratio >= policy.min_aspect_ratio && ratio <= policy.max_aspect_ratio) {
            return Err(Rejection::AspectRatio { ratio });
        }
    }
    Ok(())
}

/// Whether every turn of the closed polygon has the same strict sign.
pub fn is_convex(vertices: &[Point2]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0;
    for i in 0..n {
        let p0 = vertices[i];
        let p1 = vertices[(i + 1) % n];
        let p2 = vertices[(i + 2) % n];
        let e0 = p1 - p0;
        let e1 = p2 - p1;
        let cross = e0.x * e1.y - e0.y * e1.x;
        if cross == 0.0 || !cross.is_finite() {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Mean length of the longer opposite-side pair over that of the shorter
/// pair. Always at least 1; infinite when one pair has zero length.
pub fn aspect_ratio(corners: &[Point2; 4]) -> f64 {
    let side = |i: usize| (corners[(i + 1) % 4] - corners[i]).norm();
    let first = (side(0) + side(2)) / 2.0;
    let second = (side(1) + side(3)) / 2.0;
    let (short, long) = if first <= second {
        (first, second)
    } else {
        (second, first)
    };
    if short <= 0.0 {
        return f64::INFINITY;
    }
    long / short
}
