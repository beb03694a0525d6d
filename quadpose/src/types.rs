use crate::error::{ConfigError, ContourError};

/// Image-space coordinate in pixels.
pub type Point2 = nalgebra::Point2<f64>;

/// Object-space coordinate in the target's own frame.
pub type Point3 = nalgebra::Point3<f64>;

/// Raw outline from the segmentation stage.
///
/// The last point implicitly connects back to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<Point2>,
}

impl Contour {
    /// Wrap a point sequence, rejecting anything shorter than a triangle or
    /// holding a NaN or infinite coordinate.
    pub fn new(points: Vec<Point2>) -> Result<Self, ContourError> {
        if points.len() < 3 {
            return Err(ContourError::TooFewPoints(points.len()));
        }
        if let Some(i) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ContourError::NonFinitePoint(i));
        }
        Ok(Self { points })
    }

    /// Build a contour from integer pixel positions.
    pub fn from_pixels(pixels: &[[i32; 2]]) -> Result<Self, ContourError> {
        Self::new(
            pixels
                .iter()
                .map(|p| Point2::new(p[0] as f64, p[1] as f64))
                .collect(),
        )
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// All contours extracted from one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameContours {
    pub frame_index: u64,
    pub contours: Vec<Contour>,
}

/// Known geometry of the physical target: four coplanar points in the z = 0
/// plane of the target frame.
///
/// The target frame follows the image convention: x to the right, y down,
/// z pointing away from a camera that views the target head-on. The point
/// order is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<[f64; 3]>", into = "Vec<[f64; 3]>")
)]
pub struct ObjectModel {
    points: [Point3; 4],
}

impl ObjectModel {
    pub fn new(points: &[Point3]) -> Result<Self, ConfigError> {
        let points: [Point3; 4] = points
            .try_into()
            .map_err(|_| ConfigError::ObjectPointCount(points.len()))?;

        for (index, p) in points.iter().enumerate() {
            if p.z.abs() > 1e-12 {
                return Err(ConfigError::NonPlanarObject { index, z: p.z });
            }
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(ConfigError::DegenerateObject);
            }
        }

        let planar = points.map(|p| [p.x, p.y]);
        let perimeter: f64 = (0..4)
            .map(|i| {
                let a = planar[i];
                let b = planar[(i + 1) % 4];
                ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt()
            })
            .sum();
        if perimeter < 1e-12 || signed_area(&planar).abs() / (perimeter * perimeter) < 1e-9 {
            return Err(ConfigError::DegenerateObject);
        }

        Ok(Self { points })
    }

    /// A `width` x `height` rectangle centered on the origin, listed
    /// top-left, top-right, bottom-right, bottom-left.
    pub fn rectangle(width: f64, height: f64) -> Result<Self, ConfigError> {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self::new(&[
            Point3::new(-hw, -hh, 0.0),
            Point3::new(hw, -hh, 0.0),
            Point3::new(hw, hh, 0.0),
            Point3::new(-hw, hh, 0.0),
        ])
    }

    pub fn points(&self) -> &[Point3; 4] {
        &self.points
    }

    /// Shoelace area in the x-y plane. Positive when the points run
    /// clockwise as seen by a camera facing the target.
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.points.map(|p| [p.x, p.y]))
    }
}

impl TryFrom<Vec<[f64; 3]>> for ObjectModel {
    type Error = ConfigError;

    fn try_from(points: Vec<[f64; 3]>) -> Result<Self, Self::Error> {
        let points: Vec<Point3> = points.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect();
        Self::new(&points)
    }
}

impl From<ObjectModel> for Vec<[f64; 3]> {
    fn from(model: ObjectModel) -> Self {
        model.points.iter().map(|p| [p.x, p.y, p.z]).collect()
    }
}

/// Shoelace area of a closed polygon.
///
/// In image coordinates (y down) a positive area means clockwise winding on
/// screen.
pub(crate) fn signed_area(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i][0] * points[j][1];
        area -= points[j][0] * points[i][1];
    }
    area / 2.0
}
