/// Pre-defined test scenarios for pose quality evaluation.
use nalgebra::Vector3;
use quadpose::detect::camera::CameraModel;
use quadpose::detect::pipeline::PipelineConfig;
use quadpose::detect::pose::Pose;
use quadpose::detect::quad::QuadPolicy;
use quadpose::types::ObjectModel;

use crate::noise::ContourNoise;
use crate::scene::{Clutter, Scene, SceneBuilder};

/// A category of test scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Baseline,
    Rotation,
    Tilt,
    Distance,
    Distortion,
    Noise,
    Ordering,
    Clutter,
    MultiTarget,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Baseline,
            Category::Rotation,
            Category::Tilt,
            Category::Distance,
            Category::Distortion,
            Category::Noise,
            Category::Ordering,
            Category::Clutter,
            Category::MultiTarget,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Baseline => "baseline",
            Category::Rotation => "rotation",
            Category::Tilt => "tilt",
            Category::Distance => "distance",
            Category::Distortion => "distortion",
            Category::Noise => "noise",
            Category::Ordering => "ordering",
            Category::Clutter => "clutter",
            Category::MultiTarget => "multi-target",
        }
    }

    pub fn from_name(name: &str) -> Option<Category> {
        Category::all().iter().find(|c| c.name() == name).copied()
    }
}

/// Pass criteria for a scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub max_corner_rmse: f64,
    pub max_rotation_error_deg: f64,
    pub max_translation_error: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_corner_rmse: 1.5,
            max_rotation_error_deg: 6.0,
            max_translation_error: 0.03,
        }
    }
}

/// A test scenario that generates a scene and specifies expected results.
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub category: Category,
    /// Number of targets that should be detected and posed.
    pub expected: usize,
    pub thresholds: Thresholds,
    pub config: PipelineConfig,
    /// Build the scene.
    build_fn: Box<dyn Fn() -> Scene + Send + Sync>,
}

impl Scenario {
    pub fn build(&self) -> Scene {
        (self.build_fn)()
    }
}

/// Calibrated 640x405 webcam.
pub fn webcam() -> CameraModel {
    camera_with(&[0.0426968969, -0.0503434464, -0.0003085729, 0.0001547382, 0.0])
}

/// The webcam intrinsics with custom distortion.
pub fn camera_with(distortion: &[f64]) -> CameraModel {
    CameraModel::new(492.27331, 492.14526, 327.04178, 202.45735, distortion)
        .unwrap_or_else(|e| panic!("invalid catalog camera: {e}"))
}

/// Portrait-oriented card target, 4.128 x 6.985 units.
pub fn card() -> ObjectModel {
    ObjectModel::rectangle(4.128, 6.985).unwrap_or_else(|e| panic!("invalid catalog model: {e}"))
}

/// Pipeline settings tuned for the card target.
pub fn card_config() -> PipelineConfig {
    PipelineConfig {
        approx_tolerance: 4.0,
        policy: QuadPolicy {
            min_aspect_ratio: 1.2,
            max_aspect_ratio: 2.5,
            ..QuadPolicy::default()
        },
        ..PipelineConfig::default()
    }
}

/// Pose from Euler-style angles in degrees (roll about the optical axis
/// applied last) and a translation.
pub fn pose_deg(roll: f64, tilt_x: f64, tilt_y: f64, t: [f64; 3]) -> Pose {
    let r = nalgebra::Rotation3::from_axis_angle(&Vector3::z_axis(), roll.to_radians())
        * nalgebra::Rotation3::from_axis_angle(&Vector3::x_axis(), tilt_x.to_radians())
        * nalgebra::Rotation3::from_axis_angle(&Vector3::y_axis(), tilt_y.to_radians());
    Pose::new(r, Vector3::from(t))
}

/// Build the full catalog of test scenarios.
pub fn all_scenarios() -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    scenarios.extend(baseline_scenarios());
    scenarios.extend(rotation_scenarios());
    scenarios.extend(tilt_scenarios());
    scenarios.extend(distance_scenarios());
    scenarios.extend(distortion_scenarios());
    scenarios.extend(noise_scenarios());
    scenarios.extend(ordering_scenarios());
    scenarios.extend(clutter_scenarios());
    scenarios.extend(multi_target_scenarios());
    scenarios
}

/// Filter scenarios by category.
pub fn scenarios_for_category(category: Category) -> Vec<Scenario> {
    all_scenarios()
        .into_iter()
        .filter(|s| s.category == category)
        .collect()
}

fn single(
    name: String,
    description: String,
    category: Category,
    thresholds: Thresholds,
    build_fn: Box<dyn Fn() -> Scene + Send + Sync>,
) -> Scenario {
    Scenario {
        name,
        description,
        category,
        expected: 1,
        thresholds,
        config: card_config(),
        build_fn,
    }
}

fn baseline_scenarios() -> Vec<Scenario> {
    let placements = [
        ("centered", [0.0, 0.0, 20.0]),
        ("offset", [4.0, -2.0, 22.0]),
    ];
    placements
        .iter()
        .map(|&(label, t)| {
            single(
                format!("baseline-{label}"),
                format!("Frontal card at ({}, {}, {})", t[0], t[1], t[2]),
                Category::Baseline,
                Thresholds::default(),
                Box::new(move || {
                    SceneBuilder::new(webcam(), card())
                        .add_target(pose_deg(0.0, 0.0, 0.0, t))
                        .build()
                }),
            )
        })
        .collect()
}

fn rotation_scenarios() -> Vec<Scenario> {
    // The top-left corner stays unambiguous for in-plane roll within about
    // +-40 degrees of upright.
    let angles_deg = [-30, -15, 15, 30];
    angles_deg
        .iter()
        .map(|&deg| {
            single(
                format!("rotation-{deg}deg"),
                format!("Card rolled {deg} degrees about the optical axis"),
                Category::Rotation,
                Thresholds::default(),
                Box::new(move || {
                    SceneBuilder::new(webcam(), card())
                        .add_target(pose_deg(deg as f64, 0.0, 0.0, [0.0, 0.0, 20.0]))
                        .build()
                }),
            )
        })
        .collect()
}

fn tilt_scenarios() -> Vec<Scenario> {
    let tilts = [(20.0, 0.0), (40.0, 0.0), (0.0, 20.0), (0.0, 35.0), (20.0, 20.0)];
    tilts
        .iter()
        .map(|&(tx, ty)| {
            single(
                format!("tilt-x{tx}-y{ty}"),
                format!("Card tilted {tx} degrees about x and {ty} about y"),
                Category::Tilt,
                Thresholds::default(),
                Box::new(move || {
                    SceneBuilder::new(webcam(), card())
                        .add_target(pose_deg(0.0, tx, ty, [0.0, 0.0, 20.0]))
                        .build()
                }),
            )
        })
        .collect()
}

fn distance_scenarios() -> Vec<Scenario> {
    let depths = [12, 20, 35, 50];
    depths
        .iter()
        .map(|&z| {
            // Corner quantization weighs more as the card shrinks.
            let scale = z as f64 / 20.0;
            let thresholds = Thresholds {
                max_rotation_error_deg: 6.0 * scale.max(1.0),
                max_translation_error: 0.03 * scale.max(1.0),
                ..Thresholds::default()
            };
            single(
                format!("distance-{z}"),
                format!("Slightly tilted card at depth {z}"),
                Category::Distance,
                thresholds,
                Box::new(move || {
                    SceneBuilder::new(webcam(), card())
                        .add_target(pose_deg(5.0, 10.0, -10.0, [0.5, 0.5, z as f64]))
                        .build()
                }),
            )
        })
        .collect()
}

fn distortion_scenarios() -> Vec<Scenario> {
    let lenses: [(&str, [f64; 5]); 3] = [
        ("none", [0.0; 5]),
        ("barrel", [-0.08, 0.01, 0.0, 0.0, 0.0]),
        ("pincushion", [0.06, 0.01, 0.0005, -0.0005, 0.0]),
    ];
    lenses
        .iter()
        .map(|&(label, coeffs)| {
            single(
                format!("distortion-{label}"),
                format!("Off-centre card through a {label} lens"),
                Category::Distortion,
                Thresholds::default(),
                Box::new(move || {
                    SceneBuilder::new(camera_with(&coeffs), card())
                        .add_target(pose_deg(0.0, 10.0, 15.0, [4.0, 1.5, 18.0]))
                        .build()
                }),
            )
        })
        .collect()
}

fn noise_scenarios() -> Vec<Scenario> {
    let mut scenarios: Vec<Scenario> = [0.3, 0.6]
        .iter()
        .map(|&sigma| {
            single(
                format!("noise-jitter{sigma}"),
                format!("Contour jitter sigma={sigma} px"),
                Category::Noise,
                Thresholds {
                    max_corner_rmse: 2.5,
                    max_rotation_error_deg: 10.0,
                    max_translation_error: 0.05,
                },
                Box::new(move || {
                    SceneBuilder::new(webcam(), card())
                        .add_target_with(
                            pose_deg(0.0, 10.0, 0.0, [0.0, 0.0, 18.0]),
                            0.0,
                            false,
                            vec![ContourNoise::Jitter { sigma, seed: 42 }],
                        )
                        .build()
                }),
            )
        })
        .collect();

    scenarios.push(single(
        "noise-dropout".into(),
        "Contour with 20% of points missing".into(),
        Category::Noise,
        Thresholds::default(),
        Box::new(|| {
            SceneBuilder::new(webcam(), card())
                .add_target_with(
                    pose_deg(0.0, 10.0, 0.0, [0.0, 0.0, 18.0]),
                    0.0,
                    false,
                    vec![ContourNoise::Dropout {
                        density: 0.2,
                        seed: 7,
                    }],
                )
                .build()
        }),
    ));
    scenarios
}

fn ordering_scenarios() -> Vec<Scenario> {
    let variants = [(0.13, false), (0.41, false), (0.0, true), (0.77, true)];
    variants
        .iter()
        .map(|&(start, reversed)| {
            let winding = if reversed { "ccw" } else { "cw" };
            single(
                format!("ordering-{winding}-start{start}"),
                format!("Contour traced {winding} from {start} of the way round"),
                Category::Ordering,
                Thresholds::default(),
                Box::new(move || {
                    SceneBuilder::new(webcam(), card())
                        .add_target_with(
                            pose_deg(10.0, -15.0, 10.0, [1.0, 0.0, 20.0]),
                            start,
                            reversed,
                            Vec::new(),
                        )
                        .build()
                }),
            )
        })
        .collect()
}

fn clutter_scenarios() -> Vec<Scenario> {
    vec![single(
        "clutter-mixed".into(),
        "Card among triangles, chevrons, slivers and specks".into(),
        Category::Clutter,
        Thresholds::default(),
        Box::new(|| {
            SceneBuilder::new(webcam(), card())
                .add_clutter(Clutter::Triangle {
                    center: [80.0, 80.0],
                    size: 60.0,
                })
                .add_target(pose_deg(0.0, 0.0, 0.0, [0.0, 0.0, 20.0]))
                .add_clutter(Clutter::Chevron {
                    center: [560.0, 90.0],
                    size: 70.0,
                })
                .add_clutter(Clutter::Sliver {
                    center: [90.0, 320.0],
                    length: 120.0,
                    angle: 0.3,
                })
                .add_clutter(Clutter::Speck {
                    center: [560.0, 330.0],
                })
                .build()
        }),
    )]
}

fn multi_target_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "multi-target-row".into(),
            description: "Three cards side by side".into(),
            category: Category::MultiTarget,
            expected: 3,
            thresholds: Thresholds::default(),
            config: card_config(),
            build_fn: Box::new(|| {
                SceneBuilder::new(webcam(), card())
                    .add_target(pose_deg(0.0, 0.0, 10.0, [-7.0, 0.0, 25.0]))
                    .add_target(pose_deg(0.0, 0.0, 0.0, [0.0, 0.0, 25.0]))
                    .add_target(pose_deg(0.0, 0.0, -10.0, [7.0, 0.0, 25.0]))
                    .build()
            }),
        },
        Scenario {
            name: "multi-target-depths".into(),
            description: "Two cards at different depths".into(),
            category: Category::MultiTarget,
            expected: 2,
            thresholds: Thresholds {
                max_rotation_error_deg: 10.0,
                max_translation_error: 0.05,
                ..Thresholds::default()
            },
            config: card_config(),
            build_fn: Box::new(|| {
                SceneBuilder::new(webcam(), card())
                    .add_target(pose_deg(-10.0, 10.0, 0.0, [-5.0, 0.0, 18.0]))
                    .add_target(pose_deg(10.0, 0.0, 10.0, [10.0, 2.0, 40.0]))
                    .build()
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_scenarios_non_empty() {
        let scenarios = all_scenarios();
        assert!(!scenarios.is_empty());
    }

    #[test]
    fn scenario_names_are_unique() {
        let scenarios = all_scenarios();
        let mut names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn each_category_has_scenarios() {
        for cat in Category::all() {
            let scenarios = scenarios_for_category(*cat);
            assert!(!scenarios.is_empty(), "category {:?} has no scenarios", cat);
        }
    }

    #[test]
    fn scenario_builds_place_every_target() {
        for scenario in all_scenarios() {
            let scene = scenario.build();
            assert_eq!(
                scene.ground_truth.len(),
                scenario.expected,
                "scenario {}",
                scenario.name
            );
            assert!(scene.frame.contours.len() >= scenario.expected);
        }
    }

    #[test]
    fn configs_are_valid() {
        for scenario in all_scenarios() {
            assert!(scenario.config.validate().is_ok(), "scenario {}", scenario.name);
        }
    }

    #[test]
    fn category_from_name_roundtrip() {
        for cat in Category::all() {
            assert_eq!(Category::from_name(cat.name()), Some(*cat));
        }
        assert_eq!(Category::from_name("nonexistent"), None);
    }

    #[test]
    fn frontal_pose_has_identity_rotation() {
        let pose = pose_deg(0.0, 0.0, 0.0, [1.0, 2.0, 3.0]);
        assert_eq!(pose.rvec(), Vector3::zeros());
        assert_eq!(pose.translation, Vector3::new(1.0, 2.0, 3.0));
    }
}
