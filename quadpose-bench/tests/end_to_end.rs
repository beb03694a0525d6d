/// End-to-end integration tests: build scenes → pose → evaluate metrics.
use approx::assert_abs_diff_eq;
use quadpose::detect::pipeline::{FrameResult, Pipeline};
use quadpose::detect::quad::Rejection;

use quadpose_bench::catalog::{self, Category};
use quadpose_bench::metrics::{self, SceneResult};
use quadpose_bench::report;
use quadpose_bench::scene::{Clutter, Scene, SceneBuilder};

fn pipeline_for(scene: &Scene) -> Pipeline {
    Pipeline::new(catalog::card_config(), scene.camera.clone(), scene.model.clone()).unwrap()
}

fn run(scene: &Scene) -> (FrameResult, SceneResult) {
    let frame = pipeline_for(scene).process_frame(&scene.frame);
    let result = metrics::evaluate(&scene.ground_truth, &frame, 0);
    (frame, result)
}

fn card_scene() -> SceneBuilder {
    SceneBuilder::new(catalog::webcam(), catalog::card())
}

#[test]
fn pose_frontal_card() {
    let scene = card_scene()
        .add_target(catalog::pose_deg(0.0, 0.0, 0.0, [0.0, 0.0, 20.0]))
        .build();
    let (frame, result) = run(&scene);

    assert_eq!(frame.detections.len(), 1, "should pose exactly one card");
    assert_eq!(frame.stats.posed, 1);
    assert_eq!(result.pose_rate, 1.0);
    assert!(
        result.corner_rmse < 1.5,
        "corner RMSE should be < 1.5px, got {}",
        result.corner_rmse
    );
    assert!(result.max_rotation_error_deg < 5.0, "rot {}", result.max_rotation_error_deg);

    let pose = frame.detections[0].pose().unwrap();
    assert_abs_diff_eq!(pose.translation.z, 20.0, epsilon = 0.6);
    assert_abs_diff_eq!(pose.translation.x, 0.0, epsilon = 0.2);
    assert_abs_diff_eq!(pose.translation.y, 0.0, epsilon = 0.2);
}

#[test]
fn pose_rolled_and_tilted_card() {
    let scene = card_scene()
        .add_target(catalog::pose_deg(15.0, 20.0, -10.0, [1.0, 0.5, 22.0]))
        .build();
    let (_, result) = run(&scene);

    assert_eq!(result.pose_rate, 1.0);
    assert!(result.corner_rmse < 1.5, "rmse {}", result.corner_rmse);
    assert!(result.max_rotation_error_deg < 6.0, "rot {}", result.max_rotation_error_deg);
    assert!(
        result.max_translation_error < 0.03,
        "trans {}",
        result.max_translation_error
    );
}

#[test]
fn contour_start_and_winding_do_not_change_pose() {
    let pose = catalog::pose_deg(-10.0, 15.0, 5.0, [-1.0, 1.0, 20.0]);
    let forward = card_scene().add_target(pose).build();
    let reversed = card_scene()
        .add_target_with(pose, 0.37, true, Vec::new())
        .build();

    let (a, _) = run(&forward);
    let (b, _) = run(&reversed);
    let ta = a.detections[0].pose().unwrap().translation;
    let tb = b.detections[0].pose().unwrap().translation;
    for k in 0..3 {
        assert_abs_diff_eq!(ta[k], tb[k], epsilon = 0.3);
    }
}

#[test]
fn clutter_is_rejected_before_posing() {
    let scene = card_scene()
        .add_target(catalog::pose_deg(0.0, 0.0, 0.0, [0.0, 0.0, 20.0]))
        .add_clutter(Clutter::Triangle {
            center: [80.0, 80.0],
            size: 60.0,
        })
        .add_clutter(Clutter::Chevron {
            center: [560.0, 90.0],
            size: 70.0,
        })
        .build();
    let pipeline = pipeline_for(&scene);
    let frame = pipeline.process_frame(&scene.frame);

    assert_eq!(frame.stats.contours, 3);
    assert_eq!(frame.stats.rejected, 2);
    assert_eq!(frame.stats.posed, 1);
    assert_eq!(frame.detections[0].contour_index, 0);

    assert!(matches!(
        pipeline.candidate_quad(&scene.frame.contours[1]),
        Err(Rejection::VertexCount {
            expected: 4,
            actual: 3
        })
    ));
    assert!(matches!(
        pipeline.candidate_quad(&scene.frame.contours[2]),
        Err(Rejection::NotConvex)
    ));

    let result = metrics::evaluate(&scene.ground_truth, &frame, 0);
    assert!(result.false_positives.is_empty());
    assert_eq!(result.rejected, 2);
}

#[test]
fn multiple_cards_keep_contour_order() {
    let scene = card_scene()
        .add_target(catalog::pose_deg(0.0, 0.0, 10.0, [-7.0, 0.0, 25.0]))
        .add_target(catalog::pose_deg(0.0, 0.0, 0.0, [0.0, 0.0, 25.0]))
        .add_target(catalog::pose_deg(0.0, 0.0, -10.0, [7.0, 0.0, 25.0]))
        .build();
    let (frame, result) = run(&scene);

    let order: Vec<usize> = frame.detections.iter().map(|d| d.contour_index).collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(result.pose_rate, 1.0);
    assert!(result.false_positives.is_empty());

    let xs: Vec<f64> = frame
        .detections
        .iter()
        .map(|d| d.pose().unwrap().translation.x)
        .collect();
    assert!(xs[0] < xs[1] && xs[1] < xs[2], "xs {xs:?}");
}

#[test]
fn frame_index_is_carried_through() {
    let scene = card_scene()
        .frame_index(17)
        .add_target(catalog::pose_deg(0.0, 0.0, 0.0, [0.0, 0.0, 20.0]))
        .build();
    let (frame, _) = run(&scene);
    assert_eq!(frame.frame_index, 17);
}

#[test]
fn empty_frame_yields_nothing() {
    let scene = card_scene().build();
    let (frame, result) = run(&scene);
    assert!(frame.detections.is_empty());
    assert_eq!(frame.stats.contours, 0);
    assert_eq!(result.detection_rate, 1.0);
}

#[test]
fn upright_and_reordered_scenarios_pass() {
    let mut scenarios = catalog::scenarios_for_category(Category::Baseline);
    scenarios.extend(catalog::scenarios_for_category(Category::Rotation));
    scenarios.extend(catalog::scenarios_for_category(Category::Ordering));

    for scenario in &scenarios {
        let scene = scenario.build();
        let pipeline = Pipeline::new(
            scenario.config.clone(),
            scene.camera.clone(),
            scene.model.clone(),
        )
        .unwrap();
        let frame = pipeline.process_frame(&scene.frame);
        let result = metrics::evaluate(&scene.ground_truth, &frame, 0);
        let r = report::scenario_report(
            &scenario.name,
            scenario.category.name(),
            &result,
            scenario.expected,
            scenario.thresholds,
        );
        assert!(
            r.passed,
            "{}: posed {}/{}, rmse {:.2}, rot {:.2}, trans {:.3}",
            r.name,
            r.posed,
            r.expected,
            r.corner_rmse,
            r.max_rotation_error_deg,
            r.max_translation_error
        );
    }
}
