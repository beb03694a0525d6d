use super::quad::Quad;
use crate::error::FailureReason;
use crate::types::{signed_area, ObjectModel, Point2, Point3};

/// Minimum |sin| of a corner angle, and minimum area over squared
/// perimeter, for a winding to count as determined.
const MIN_TURN: f64 = 1e-6;

/// Object points paired index-for-index with image points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub object: [Point3; 4],
    pub image: [Point2; 4],
    /// `quad_indices[i]` is the quad corner paired with object point `i`.
    pub quad_indices: [usize; 4],
}

impl Correspondence {
    /// Pair points as given.
    pub fn new(object: [Point3; 4], image: [Point2; 4]) -> Self {
        Self {
            object,
            image,
            quad_indices: [0, 1, 2, 3],
        }
    }
}

/// Decide which quad corner matches which object point.
///
/// The quad is walked in the model's winding starting from its top-left
/// corner (smallest `u + v`), which is paired with the model point of
/// smallest `x + y`. The result does not depend on where the quad's corner
/// list starts or which way it winds.
pub fn resolve(quad: &Quad, model: &ObjectModel) -> Result<Correspondence, FailureReason> {
    let corners = &quad.corners;
    let winding = image_winding(corners).ok_or(FailureReason::AmbiguousCorrespondence)?;

    let model_winding = model.signed_area().signum();
    let seq: [usize; 4] = if winding == model_winding {
        [0, 1, 2, 3]
    } else {
        [0, 3, 2, 1]
    };

    let image_keys = seq.map(|i| (corners[i].x, corners[i].y));
    let start = top_left(&image_keys);
    let object = *model.points();
    let obj_start = top_left(&object.map(|p| (p.x, p.y)));

    let mut image = [Point2::origin(); 4];
    let mut quad_indices = [0usize; 4];
    for k in 0..4 {
        let j = (obj_start + k) % 4;
        let q = seq[(start + k) % 4];
        image[j] = corners[q];
        quad_indices[j] = q;
    }

    Ok(Correspondence {
        object,
        image,
        quad_indices,
    })
}

/// Sign of the corner winding, or `None` when any corner is nearly straight,
/// the corners disagree, or the area is negligible.
fn image_winding(corners: &[Point2; 4]) -> Option<f64> {
    let area = signed_area(&corners.map(|p| [p.x, p.y]));
    let perimeter: f64 = (0..4).map(|i| (corners[(i + 1) % 4] - corners[i]).norm()).sum();
    if !area.is_finite() || perimeter <= 0.0 || area.abs() / (perimeter * perimeter) < MIN_TURN {
        return None;
    }
    let sign = area.signum();

    for i in 0..4 {
        let e0 = corners[i] - corners[(i + 3) % 4];
        let e1 = corners[(i + 1) % 4] - corners[i];
        let (l0, l1) = (e0.norm(), e1.norm());
        if l0 == 0.0 || l1 == 0.0 {
            return None;
        }
        let sin = (e0.x * e1.y - e0.y * e1.x) / (l0 * l1);
        if sin.abs() < MIN_TURN || sin.signum() != sign {
            return None;
        }
    }
    Some(sign)
}

/// Index of the point with the smallest `x + y`; near-ties go to the
/// smaller `y`, then the smaller `x`.
fn top_left(points: &[(f64, f64); 4]) -> usize {
    let scale = points
        .iter()
        .fold(1.0f64, |m, &(x, y)| m.max(x.abs()).max(y.abs()));
    let tol = 1e-9 * scale;

    let mut best = 0;
    for i in 1..4 {
        let (x, y) = points[i];
        let (bx, by) = points[best];
        let (s, bs) = (x + y, bx + by);
        let better = if (s - bs).abs() > tol {
            s < bs
        } else if (y - by).abs() > tol {
            y < by
        } else {
            x < bx - tol
        };
        if better {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ObjectModel {
        ObjectModel::rectangle(2.0, 1.0).unwrap()
    }

    /// Frontal view of `model`: 50 px per unit, centred at (200, 150).
    fn frontal(model: &ObjectModel) -> [Point2; 4] {
        model
            .points()
            .map(|p| Point2::new(200.0 + 50.0 * p.x, 150.0 + 50.0 * p.y))
    }

    fn assert_pairs_match(c: &Correspondence, expected: &[Point2; 4]) {
        for i in 0..4 {
            assert!(
                (c.image[i] - expected[i]).norm() < 1e-12,
                "object {i}: expected ({}, {}), got ({}, {})",
                expected[i].x,
                expected[i].y,
                c.image[i].x,
                c.image[i].y
            );
        }
    }

    #[test]
    fn identity_order_is_kept() {
        let m = model();
        let image = frontal(&m);
        let c = resolve(&Quad::from_corners(image), &m).unwrap();
        assert_pairs_match(&c, &image);
        assert_eq!(c.quad_indices, [0, 1, 2, 3]);
        assert_eq!(c.object, *m.points());
    }

    #[test]
    fn any_start_and_winding_resolves_the_same() {
        let m = model();
        let expected = frontal(&m);
        for shift in 0..4 {
            let mut fwd = expected;
            fwd.rotate_left(shift);
            let c = resolve(&Quad { corners: fwd }, &m).unwrap();
            assert_pairs_match(&c, &expected);

            // Counter-clockwise on screen, bypassing winding normalization.
            let mut rev = expected;
            rev.reverse();
            rev.rotate_left(shift);
            let c = resolve(&Quad { corners: rev }, &m).unwrap();
            assert_pairs_match(&c, &expected);
            for i in 0..4 {
                assert_eq!(rev[c.quad_indices[i]], c.image[i]);
            }
        }
    }

    #[test]
    fn counter_clockwise_model_is_followed() {
        let pts = *model().points();
        let ccw = ObjectModel::new(&[pts[0], pts[3], pts[2], pts[1]]).unwrap();
        let expected = frontal(&ccw);
        let c = resolve(&Quad::from_corners(expected), &ccw).unwrap();
        assert_pairs_match(&c, &expected);
    }

    #[test]
    fn model_starting_elsewhere_is_followed() {
        let pts = *model().points();
        let shifted = ObjectModel::new(&[pts[2], pts[3], pts[0], pts[1]]).unwrap();
        let expected = frontal(&shifted);
        let mut quad = expected;
        quad.rotate_left(1);
        let c = resolve(&Quad { corners: quad }, &shifted).unwrap();
        assert_pairs_match(&c, &expected);
    }

    #[test]
    fn small_roll_still_resolves() {
        let m = model();
        let (s, c) = 20f64.to_radians().sin_cos();
        let rolled = m.points().map(|p| {
            Point2::new(
                200.0 + 50.0 * (c * p.x - s * p.y),
                150.0 + 50.0 * (s * p.x + c * p.y),
            )
        });
        let mut quad = rolled;
        quad.rotate_left(3);
        let res = resolve(&Quad { corners: quad }, &m).unwrap();
        assert_pairs_match(&res, &rolled);
    }

    #[test]
    fn collinear_corners_are_ambiguous() {
        let quad = Quad {
            corners: [
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(20.0, 0.0),
                Point2::new(30.0, 0.0),
            ],
        };
        assert_eq!(
            resolve(&quad, &model()),
            Err(FailureReason::AmbiguousCorrespondence)
        );
    }

    #[test]
    fn coincident_corners_are_ambiguous() {
        let quad = Quad {
            corners: [Point2::new(5.0, 5.0); 4],
        };
        assert_eq!(
            resolve(&quad, &model()),
            Err(FailureReason::AmbiguousCorrespondence)
        );
    }

    #[test]
    fn bowtie_is_ambiguous() {
        let quad = Quad {
            corners: [
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 10.0),
                Point2::new(10.0, 0.0),
                Point2::new(0.0, 10.0),
            ],
        };
        assert_eq!(
            resolve(&quad, &model()),
            Err(FailureReason::AmbiguousCorrespondence)
        );
    }

    #[test]
    fn top_left_breaks_ties_on_y() {
        // (0, 10) and (10, 0) share x + y; the smaller y wins.
        let pts = [(20.0, 20.0), (0.0, 10.0), (10.0, 0.0), (30.0, 5.0)];
        assert_eq!(top_left(&pts), 2);
    }
}
