/// Scene composition: project targets through a camera into integer contours
/// with ground truth.
use nalgebra::Vector3;
use quadpose::detect::camera::CameraModel;
use quadpose::detect::pose::Pose;
use quadpose::types::{Contour, FrameContours, ObjectModel, Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::noise::{self, ContourNoise};

/// A target placed in a scene with its ground-truth pose and image corners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedTarget {
    /// Axis-angle rotation, object to camera.
    pub rvec: [f64; 3],
    pub translation: [f64; 3],
    /// Distorted pixel positions of the model points, in model order.
    pub corners: [[f64; 2]; 4],
    /// Pixel position of the model centroid.
    pub center: [f64; 2],
}

impl PlacedTarget {
    pub fn pose(&self) -> Pose {
        Pose::from_rvec(
            &Vector3::from(self.rvec),
            Vector3::from(self.translation),
        )
    }
}

/// A complete scene: one frame of contours plus what produced them.
#[derive(Debug, Clone)]
pub struct Scene {
    pub frame: FrameContours,
    pub ground_truth: Vec<PlacedTarget>,
    pub camera: CameraModel,
    pub model: ObjectModel,
}

/// Non-target outline added to a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Clutter {
    /// Equilateral-ish triangle.
    Triangle { center: [f64; 2], size: f64 },
    /// Concave arrowhead with four corners.
    Chevron { center: [f64; 2], size: f64 },
    /// Long thin rectangle.
    Sliver {
        center: [f64; 2],
        length: f64,
        angle: f64,
    },
    /// A blob too small to simplify to a polygon.
    Speck { center: [f64; 2] },
}

/// A target to be placed in the scene.
struct TargetPlacement {
    pose: Pose,
    /// Fraction of the contour to rotate the start point by.
    start: f64,
    reversed: bool,
    noise: Vec<ContourNoise>,
}

/// Builder for constructing scenes.
pub struct SceneBuilder {
    camera: CameraModel,
    model: ObjectModel,
    frame_index: u64,
    targets: Vec<TargetPlacement>,
    clutter: Vec<Clutter>,
}

impl SceneBuilder {
    pub fn new(camera: CameraModel, model: ObjectModel) -> Self {
        Self {
            camera,
            model,
            frame_index: 0,
            targets: Vec::new(),
            clutter: Vec::new(),
        }
    }

    pub fn frame_index(mut self, index: u64) -> Self {
        self.frame_index = index;
        self
    }

    pub fn add_target(self, pose: Pose) -> Self {
        self.add_target_with(pose, 0.0, false, Vec::new())
    }

    /// Place a target whose contour starts `start` of the way around the
    /// outline, optionally traced in reverse, with per-target noise.
    pub fn add_target_with(
        mut self,
        pose: Pose,
        start: f64,
        reversed: bool,
        noise: Vec<ContourNoise>,
    ) -> Self {
        self.targets.push(TargetPlacement {
            pose,
            start,
            reversed,
            noise,
        });
        self
    }

    pub fn add_clutter(mut self, clutter: Clutter) -> Self {
        self.clutter.push(clutter);
        self
    }

    /// Build the scene: rasterize targets then clutter into one frame.
    ///
    /// Targets that do not project fully in front of the camera are left
    /// out of both the contours and the ground truth.
    pub fn build(self) -> Scene {
        let mut contours = Vec::new();
        let mut ground_truth = Vec::new();

        for placement in &self.targets {
            let Some(mut pixels) = trace_target(&self.camera, &self.model, &placement.pose) else {
                continue;
            };
            if !pixels.is_empty() {
                let shift = (placement.start.rem_euclid(1.0) * pixels.len() as f64) as usize;
                let len = pixels.len();
                pixels.rotate_left(shift % len);
            }
            if placement.reversed {
                pixels.reverse();
            }
            noise::apply(&mut pixels, &placement.noise);

            let Ok(contour) = Contour::from_pixels(&pixels) else {
                continue;
            };
            let Some(truth) = place(&self.camera, &self.model, &placement.pose) else {
                continue;
            };
            contours.push(contour);
            ground_truth.push(truth);
        }

        for clutter in &self.clutter {
            if let Ok(contour) = Contour::from_pixels(&trace_clutter(clutter)) {
                contours.push(contour);
            }
        }

        Scene {
            frame: FrameContours {
                frame_index: self.frame_index,
                contours,
            },
            ground_truth,
            camera: self.camera,
            model: self.model,
        }
    }
}

fn place(camera: &CameraModel, model: &ObjectModel, pose: &Pose) -> Option<PlacedTarget> {
    let pts = model.points();
    let mut corners = [[0.0; 2]; 4];
    for (c, p) in corners.iter_mut().zip(pts.iter()) {
        let px = camera.project(&pose.transform(p))?;
        *c = [px.x, px.y];
    }
    let centroid = Point3::from(pts.iter().map(|p| p.coords).sum::<Vector3<f64>>() / 4.0);
    let center = camera.project(&pose.transform(&centroid))?;
    let rvec = pose.rvec();
    let t = pose.translation;
    Some(PlacedTarget {
        rvec: [rvec.x, rvec.y, rvec.z],
        translation: [t.x, t.y, t.z],
        corners,
        center: [center.x, center.y],
    })
}

/// Walk each model edge in object space, projecting densely enough that
/// consecutive pixels touch, so lens distortion bends the edges.
fn trace_target(camera: &CameraModel, model: &ObjectModel, pose: &Pose) -> Option<Vec<[i32; 2]>> {
    let pts = model.points();
    let mut pixels: Vec<[i32; 2]> = Vec::new();
    for i in 0..4 {
        let a = pts[i];
        let b = pts[(i + 1) % 4];
        let pa = camera.project(&pose.transform(&a))?;
        let pb = camera.project(&pose.transform(&b))?;
        let steps = ((pb - pa).norm() * 2.0).ceil().max(1.0) as usize;
        for s in 0..steps {
            let t = s as f64 / steps as f64;
            let p = a + (b - a) * t;
            let px = camera.project(&pose.transform(&p))?;
            push_pixel(&mut pixels, &px);
        }
    }
    dedup_closing(&mut pixels);
    Some(pixels)
}

fn trace_clutter(clutter: &Clutter) -> Vec<[i32; 2]> {
    let corners: Vec<[f64; 2]> = match *clutter {
        Clutter::Triangle { center, size } => {
            let [cx, cy] = center;
            vec![
                [cx, cy - size * 0.6],
                [cx + size * 0.5, cy + size * 0.4],
                [cx - size * 0.5, cy + size * 0.4],
            ]
        }
        Clutter::Chevron { center, size } => {
            let [cx, cy] = center;
            vec![
                [cx - size * 0.5, cy - size * 0.5],
                [cx + size * 0.5, cy],
                [cx - size * 0.5, cy + size * 0.5],
                [cx - size * 0.2, cy],
            ]
        }
        Clutter::Sliver {
            center,
            length,
            angle,
        } => {
            let [cx, cy] = center;
            let (s, c) = angle.sin_cos();
            let (hl, hw) = (length / 2.0, 1.5);
            [(-hl, -hw), (hl, -hw), (hl, hw), (-hl, hw)]
                .iter()
                .map(|&(x, y)| [cx + c * x - s * y, cy + s * x + c * y])
                .collect()
        }
        Clutter::Speck { center } => {
            let [cx, cy] = center;
            vec![[cx, cy], [cx + 2.0, cy], [cx + 2.0, cy + 2.0], [cx, cy + 2.0]]
        }
    };
    trace_polygon(&corners)
}

/// Rasterize the outline of a closed polygon given in pixel coordinates.
pub fn trace_polygon(corners: &[[f64; 2]]) -> Vec<[i32; 2]> {
    let mut pixels = Vec::new();
    for i in 0..corners.len() {
        let a = Point2::from(corners[i]);
        let b = Point2::from(corners[(i + 1) % corners.len()]);
        let steps = ((b - a).norm() * 2.0).ceil().max(1.0) as usize;
        for s in 0..steps {
            let t = s as f64 / steps as f64;
            push_pixel(&mut pixels, &(a + (b - a) * t));
        }
    }
    dedup_closing(&mut pixels);
    pixels
}

fn push_pixel(pixels: &mut Vec<[i32; 2]>, p: &Point2) {
    let px = [p.x.round() as i32, p.y.round() as i32];
    if pixels.last() != Some(&px) {
        pixels.push(px);
    }
}

fn dedup_closing(pixels: &mut Vec<[i32; 2]>) {
    while pixels.len() > 1 && pixels.first() == pixels.last() {
        pixels.pop();
    }
}
