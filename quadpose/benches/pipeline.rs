use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{Rotation3, Vector3};

use quadpose::detect::approx::approx_polygon;
use quadpose::detect::camera::CameraModel;
use quadpose::detect::correspond::resolve;
use quadpose::detect::pipeline::{Pipeline, PipelineConfig};
use quadpose::detect::pose::{solve_pose, Pose, SolverParams};
use quadpose::detect::quad::{Quad, QuadPolicy};
use quadpose::types::{Contour, FrameContours, ObjectModel, Point3};

fn camera() -> CameraModel {
    CameraModel::new(
        492.27,
        492.15,
        327.04,
        202.46,
        &[0.0427, -0.0503, -0.0003, 0.00015, 0.0],
    )
    .unwrap()
}

fn model() -> ObjectModel {
    ObjectModel::rectangle(4.128, 6.985).unwrap()
}

fn config() -> PipelineConfig {
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

/// Rasterized outline of the card seen from `pose`.
fn card_contour(camera: &CameraModel, model: &ObjectModel, pose: &Pose) -> Contour {
    let pts = model.points();
    let mut pixels: Vec<[i32; 2]> = Vec::new();
    for i in 0..4 {
        let (a, b) = (pts[i], pts[(i + 1) % 4]);
        for s in 0..400 {
            let p: Point3 = a + (b - a) * (s as f64 / 400.0);
            let px = camera.project(&pose.transform(&p)).unwrap();
            let q = [px.x.round() as i32, px.y.round() as i32];
            if pixels.last() != Some(&q) {
                pixels.push(q);
            }
        }
    }
    Contour::from_pixels(&pixels).unwrap()
}

fn make_frame(count: usize) -> FrameContours {
    let (camera, model) = (camera(), model());
    let contours = (0..count)
        .map(|i| {
            let t = i as f64;
            let rotation = Rotation3::from_euler_angles(
                0.3 * (t * 0.7).sin(),
                0.3 * (t * 1.3).cos(),
                0.4 * (t * 0.9).sin(),
            );
            let translation = Vector3::new(
                2.0 * (t * 0.5).sin(),
                1.5 * (t * 0.8).cos(),
                20.0 + (i % 7) as f64,
            );
            card_contour(&camera, &model, &Pose::new(rotation, translation))
        })
        .collect();
    FrameContours {
        frame_index: 0,
        contours,
    }
}

fn bench_approx(c: &mut Criterion) {
    let frame = make_frame(1);
    let points = frame.contours[0].points();

    c.bench_function("approx_polygon_card", |b| {
        b.iter(|| black_box(approx_polygon(black_box(points), 4.0)))
    });
}

fn bench_solve(c: &mut Criterion) {
    let (camera, model) = (camera(), model());
    let frame = make_frame(1);
    let polygon = approx_polygon(frame.contours[0].points(), 4.0).unwrap();
    let quad = Quad::from_polygon(&polygon, &config().policy).unwrap();
    let corr = resolve(&quad, &model).unwrap();
    let params = SolverParams::default();

    c.bench_function("solve_pose_card", |b| {
        b.iter(|| black_box(solve_pose(black_box(&corr), &camera, &params)))
    });
}

fn bench_frame(c: &mut Criterion) {
    let pipeline = Pipeline::new(config(), camera(), model()).unwrap();
    let frame = make_frame(64);

    c.bench_function("process_frame_64_cards", |b| {
        b.iter(|| {
            let result = pipeline.process_frame(black_box(&frame));
            black_box(result.stats.posed)
        })
    });
}

criterion_group!(benches, bench_approx, bench_solve, bench_frame);
criterion_main!(benches);
