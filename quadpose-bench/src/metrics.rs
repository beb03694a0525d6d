/// Pose quality metrics: corner accuracy, pose error, detection rate.
use quadpose::detect::pipeline::{Detection, FrameResult};
use serde::{Deserialize, Serialize};

use crate::scene::PlacedTarget;

/// Result of evaluating one frame's detections against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneResult {
    /// Every ground-truth target with its matched detection, if any.
    pub matches: Vec<TargetMatch>,
    /// Detections not matched to any ground-truth target.
    pub false_positives: Vec<DetectionSummary>,
    /// Fraction of ground-truth targets that were detected (0.0–1.0).
    pub detection_rate: f64,
    /// Fraction of ground-truth targets with a successful pose.
    pub pose_rate: f64,
    /// Root mean square of all per-corner distances across matches (pixels).
    pub corner_rmse: f64,
    pub max_corner_error: f64,
    /// Worst rotation error across posed matches (degrees).
    pub max_rotation_error_deg: f64,
    /// Worst translation error relative to the true distance.
    pub max_translation_error: f64,
    /// Contours dropped before posing.
    pub rejected: usize,
    pub processing_time_us: u64,
}

/// A ground-truth target matched (or unmatched) with a detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetMatch {
    pub ground_truth: PlacedTarget,
    pub detection: Option<DetectionSummary>,
    /// Per-corner distance (pixels) under the best cyclic alignment.
    pub corner_errors: Option<[f64; 4]>,
    pub rotation_error_deg: Option<f64>,
    pub translation_error: Option<f64>,
}

/// Flattened, serializable view of a [`Detection`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub contour_index: usize,
    pub corners: [[f64; 2]; 4],
    pub center: [f64; 2],
    pub rvec: Option<[f64; 3]>,
    pub translation: Option<[f64; 3]>,
    pub reprojection_rmse: Option<f64>,
    pub iterations: Option<usize>,
    pub failure: Option<String>,
}

impl From<&Detection> for DetectionSummary {
    fn from(det: &Detection) -> Self {
        let center = det.quad.center();
        let (rvec, translation, reprojection_rmse, iterations, failure) = match &det.outcome {
            Ok(sol) => {
                let r = sol.pose.rvec();
                let t = sol.pose.translation;
                (
                    Some([r.x, r.y, r.z]),
                    Some([t.x, t.y, t.z]),
                    Some(sol.reprojection_rmse),
                    Some(sol.iterations),
                    None,
                )
            }
            Err(reason) => (None, None, None, None, Some(reason.to_string())),
        };
        DetectionSummary {
            contour_index: det.contour_index,
            corners: det.quad.corners.map(|p| [p.x, p.y]),
            center: [center.x, center.y],
            rvec,
            translation,
            reprojection_rmse,
            iterations,
            failure,
        }
    }
}

/// Evaluate a frame result against ground truth.
///
/// Each ground-truth target takes the nearest unused detection whose quad
/// centre lies within half the target's shortest side of the true centre.
pub fn evaluate(
    ground_truth: &[PlacedTarget],
    frame: &FrameResult,
    processing_time_us: u64,
) -> SceneResult {
    let detections = &frame.detections;
    let mut matches = Vec::new();
    let mut used = vec![false; detections.len()];

    for gt in ground_truth {
        let radius = shortest_side(&gt.corners) / 2.0;
        let matched = detections
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .map(|(i, det)| {
                let c = det.quad.center();
                (i, det, (c.x - gt.center[0]).hypot(c.y - gt.center[1]))
            })
            .filter(|(_, _, d)| *d <= radius)
            .min_by(|a, b| a.2.total_cmp(&b.2));

        if let Some((idx, det, _)) = matched {
            used[idx] = true;
            let corners = det.quad.corners.map(|p| [p.x, p.y]);
            let (rotation_error_deg, translation_error) = match det.pose() {
                Some(pose) => {
                    let truth = gt.pose();
                    let rot = pose.rotation.rotation_to(&truth.rotation).angle().to_degrees();
                    let trans = (pose.translation - truth.translation).norm()
                        / truth.translation.norm();
                    (Some(rot), Some(trans))
                }
                None => (None, None),
            };
            matches.push(TargetMatch {
                ground_truth: gt.clone(),
                detection: Some(det.into()),
                corner_errors: Some(best_corner_errors(&gt.corners, &corners)),
                rotation_error_deg,
                translation_error,
            });
        } else {
            matches.push(TargetMatch {
                ground_truth: gt.clone(),
                detection: None,
                corner_errors: None,
                rotation_error_deg: None,
                translation_error: None,
            });
        }
    }

    let false_positives: Vec<DetectionSummary> = detections
        .iter()
        .enumerate()
        .filter(|(i, _)| !used[*i])
        .map(|(_, det)| det.into())
        .collect();

    let rate = |n: usize| {
        if ground_truth.is_empty() {
            1.0
        } else {
            n as f64 / ground_truth.len() as f64
        }
    };
    let detection_rate = rate(matches.iter().filter(|m| m.detection.is_some()).count());
    let pose_rate = rate(matches.iter().filter(|m| m.rotation_error_deg.is_some()).count());

    let all_errors: Vec<f64> = matches
        .iter()
        .filter_map(|m| m.corner_errors)
        .flat_map(|e| e.into_iter())
        .collect();
    let (corner_rmse, max_corner_error) = if all_errors.is_empty() {
        (0.0, 0.0)
    } else {
        let sum_sq: f64 = all_errors.iter().map(|e| e * e).sum();
        let rmse = (sum_sq / all_errors.len() as f64).sqrt();
        let max = all_errors.iter().cloned().fold(0.0_f64, f64::max);
        (rmse, max)
    };

    let max_rotation_error_deg = matches
        .iter()
        .filter_map(|m| m.rotation_error_deg)
        .fold(0.0_f64, f64::max);
    let max_translation_error = matches
        .iter()
        .filter_map(|m| m.translation_error)
        .fold(0.0_f64, f64::max);

    SceneResult {
        matches,
        false_positives,
        detection_rate,
        pose_rate,
        corner_rmse,
        max_corner_error,
        max_rotation_error_deg,
        max_translation_error,
        rejected: frame.stats.rejected,
        processing_time_us,
    }
}

fn shortest_side(corners: &[[f64; 2]; 4]) -> f64 {
    (0..4)
        .map(|i| {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            (b[0] - a[0]).hypot(b[1] - a[1])
        })
        .fold(f64::INFINITY, f64::min)
}

/// Compute per-corner Euclidean errors, trying all 4 cyclic alignments.
///
/// Quads keep the contour's starting corner, so the detected order is a
/// rotation of the ground-truth order.
fn best_corner_errors(gt: &[[f64; 2]; 4], det: &[[f64; 2]; 4]) -> [f64; 4] {
    let mut best_errors = [f64::MAX; 4];
    let mut best_total = f64::MAX;

    for rotation in 0..4 {
        let mut errors = [0.0; 4];
        let mut total = 0.0;
        for i in 0..4 {
            let j = (i + rotation) % 4;
            let dist = (gt[i][0] - det[j][0]).hypot(gt[i][1] - det[j][1]);
            errors[i] = dist;
            total += dist;
        }
        if total < best_total {
            best_total = total;
            best_errors = errors;
        }
    }

    best_errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};
    use quadpose::detect::pipeline::FrameStats;
    use quadpose::detect::pose::{Pose, PoseSolution};
    use quadpose::detect::quad::Quad;
    use quadpose::error::FailureReason;
    use quadpose::types::Point2;

    const SQUARE: [[f64; 2]; 4] = [[50.0, 50.0], [150.0, 50.0], [150.0, 150.0], [50.0, 150.0]];

    fn make_gt(corners: [[f64; 2]; 4], translation: [f64; 3]) -> PlacedTarget {
        let cx = corners.iter().map(|c| c[0]).sum::<f64>() / 4.0;
        let cy = corners.iter().map(|c| c[1]).sum::<f64>() / 4.0;
        PlacedTarget {
            rvec: [0.0; 3],
            translation,
            corners,
            center: [cx, cy],
        }
    }

    fn make_det(
        index: usize,
        corners: [[f64; 2]; 4],
        outcome: Result<[f64; 3], FailureReason>,
    ) -> Detection {
        Detection {
            contour_index: index,
            quad: Quad {
                corners: corners.map(|c| Point2::new(c[0], c[1])),
            },
            outcome: outcome.map(|t| PoseSolution {
                pose: Pose::new(Rotation3::identity(), Vector3::from(t)),
                reprojection_rmse: 0.0,
                iterations: 1,
            }),
        }
    }

    fn frame(detections: Vec<Detection>, rejected: usize) -> FrameResult {
        let posed = detections.iter().filter(|d| d.outcome.is_ok()).count();
        FrameResult {
            frame_index: 0,
            stats: FrameStats {
                contours: detections.len() + rejected,
                rejected,
                posed,
                failed: detections.len() - posed,
            },
            detections,
        }
    }

    #[test]
    fn perfect_detection_zero_error() {
        let gt = vec![make_gt(SQUARE, [0.0, 0.0, 10.0])];
        let f = frame(vec![make_det(0, SQUARE, Ok([0.0, 0.0, 10.0]))], 2);

        let result = evaluate(&gt, &f, 0);

        assert_eq!(result.detection_rate, 1.0);
        assert_eq!(result.pose_rate, 1.0);
        assert!(result.corner_rmse.abs() < 1e-10);
        assert!(result.max_rotation_error_deg.abs() < 1e-10);
        assert!(result.max_translation_error.abs() < 1e-10);
        assert!(result.false_positives.is_empty());
        assert_eq!(result.rejected, 2);
    }

    #[test]
    fn known_offsets_give_known_errors() {
        let shifted = SQUARE.map(|c| [c[0] + 1.0, c[1]]);
        let gt = vec![make_gt(SQUARE, [0.0, 0.0, 10.0])];
        let f = frame(vec![make_det(0, shifted, Ok([0.0, 0.5, 10.0]))], 0);

        let result = evaluate(&gt, &f, 0);

        assert!((result.corner_rmse - 1.0).abs() < 1e-10);
        assert!((result.max_corner_error - 1.0).abs() < 1e-10);
        assert!((result.max_translation_error - 0.05).abs() < 1e-10);
    }

    #[test]
    fn failed_pose_counts_as_detected_not_posed() {
        let gt = vec![make_gt(SQUARE, [0.0, 0.0, 10.0])];
        let f = frame(
            vec![make_det(0, SQUARE, Err(FailureReason::NonConvergent))],
            0,
        );

        let result = evaluate(&gt, &f, 0);

        assert_eq!(result.detection_rate, 1.0);
        assert_eq!(result.pose_rate, 0.0);
        let summary = result.matches[0].detection.as_ref().unwrap();
        assert_eq!(summary.failure.as_deref(), Some("pose refinement did not converge"));
    }

    #[test]
    fn missed_detection() {
        let gt = vec![make_gt(SQUARE, [0.0, 0.0, 10.0])];
        let result = evaluate(&gt, &frame(vec![], 1), 0);

        assert_eq!(result.detection_rate, 0.0);
        assert_eq!(result.matches.len(), 1);
        assert!(result.matches[0].detection.is_none());
    }

    #[test]
    fn distant_detection_is_false_positive() {
        let gt = vec![make_gt(SQUARE, [0.0, 0.0, 10.0])];
        let far = SQUARE.map(|c| [c[0] + 300.0, c[1]]);
        let result = evaluate(&gt, &frame(vec![make_det(4, far, Ok([3.0, 0.0, 10.0]))], 0), 0);

        assert_eq!(result.detection_rate, 0.0);
        assert_eq!(result.false_positives.len(), 1);
        assert_eq!(result.false_positives[0].contour_index, 4);
    }

    #[test]
    fn no_ground_truth_is_vacuously_detected() {
        let result = evaluate(&[], &frame(vec![make_det(0, SQUARE, Ok([0.0, 0.0, 10.0]))], 0), 0);
        assert_eq!(result.detection_rate, 1.0);
        assert_eq!(result.false_positives.len(), 1);
    }

    #[test]
    fn nearest_detection_wins() {
        let gt = vec![make_gt(SQUARE, [0.0, 0.0, 10.0])];
        let near = SQUARE.map(|c| [c[0] + 2.0, c[1]]);
        let nearer = SQUARE.map(|c| [c[0] + 1.0, c[1]]);
        let f = frame(
            vec![
                make_det(0, near, Ok([0.0, 0.0, 10.0])),
                make_det(1, nearer, Ok([0.0, 0.0, 10.0])),
            ],
            0,
        );
        let result = evaluate(&gt, &f, 500);
        let summary = result.matches[0].detection.as_ref().unwrap();
        assert_eq!(summary.contour_index, 1);
        assert_eq!(result.false_positives.len(), 1);
        assert_eq!(result.processing_time_us, 500);
    }

    #[test]
    fn rotated_corner_ordering() {
        let det_corners = [SQUARE[1], SQUARE[2], SQUARE[3], SQUARE[0]];
        let errors = best_corner_errors(&SQUARE, &det_corners);
        for e in &errors {
            assert!(e.abs() < 1e-10);
        }
    }

    #[test]
    fn best_corner_errors_diagonal_offset() {
        let det = SQUARE.map(|c| [c[0] + 3.0, c[1] + 4.0]);
        let errors = best_corner_errors(&SQUARE, &det);
        for e in &errors {
            assert!((*e - 5.0).abs() < 1e-10);
        }
    }
}
