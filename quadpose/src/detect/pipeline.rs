use log::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use super::approx::approx_polygon;
use super::camera::CameraModel;
use super::correspond::resolve;
use super::pose::{solve_pose, Pose, PoseSolution, SolverParams};
use super::quad::{Quad, QuadPolicy, Rejection};
use crate::error::{ConfigError, FailureReason};
use crate::types::{Contour, FrameContours, ObjectModel};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PipelineConfig {
    /// Maximum contour deviation, in pixels, when simplifying to a polygon.
    pub approx_tolerance: f64,
    pub policy: QuadPolicy,
    pub solver: SolverParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            approx_tolerance: 10.0,
            policy: QuadPolicy::default(),
            solver: SolverParams::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.approx_tolerance.is_finite() || self.approx_tolerance < 0.0 {
            return Err(ConfigError::InvalidTolerance(self.approx_tolerance));
        }
        let (min, max) = (self.policy.min_aspect_ratio, self.policy.max_aspect_ratio);
        if !min.is_finite() || !max.is_finite() || min <= 0.0 || min > max {
            return Err(ConfigError::InvalidAspectRange { min, max });
        }
        if self.policy.exact_vertex_count < 3 {
            return Err(ConfigError::InvalidVertexCount {
                expected: 3,
                actual: self.policy.exact_vertex_count,
            });
        }
        self.solver.validate()
    }

    /// Parse and validate a TOML configuration. Missing keys take their
    /// defaults.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// A validated quadrilateral and the outcome of posing it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Detection {
    /// Position of the source contour in the input.
    pub contour_index: usize,
    pub quad: Quad,
    pub outcome: Result<PoseSolution, FailureReason>,
}

impl Detection {
    pub fn pose(&self) -> Option<&Pose> {
        self.outcome.as_ref().ok().map(|s| &s.pose)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameStats {
    pub contours: usize,
    pub rejected: usize,
    pub posed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameResult {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
    pub stats: FrameStats,
}

/// Contour-to-pose pipeline for one camera and one target model.
///
/// Holds no per-frame state, so a single instance can process any number of
/// frames, from any number of threads.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    camera: CameraModel,
    model: ObjectModel,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        camera: CameraModel,
        model: ObjectModel,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.policy.exact_vertex_count != 4 {
            return Err(ConfigError::InvalidVertexCount {
                expected: 4,
                actual: config.policy.exact_vertex_count,
            });
        }
        Ok(Self {
            config,
            camera,
            model,
        })
    }

    /// Build a pipeline from a TOML document with `camera`, `object` and an
    /// optional `pipeline` table.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        #[derive(serde::Deserialize)]
        struct Setup {
            camera: CameraModel,
            object: ObjectModel,
            #[serde(default)]
            pipeline: PipelineConfig,
        }
        let setup: Setup = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::new(setup.pipeline, setup.camera, setup.object)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn model(&self) -> &ObjectModel {
        &self.model
    }

    /// Run every contour through the pipeline.
    ///
    /// Rejected contours are left out; the rest keep input order.
    pub fn process(&self, contours: &[Contour]) -> Vec<Detection> {
        #[cfg(feature = "parallel")]
        let detections: Vec<Detection> = contours
            .par_iter()
            .enumerate()
            .filter_map(|(i, c)| self.process_candidate(i, c))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let detections: Vec<Detection> = contours
            .iter()
            .enumerate()
            .filter_map(|(i, c)| self.process_candidate(i, c))
            .collect();

        detections
    }

    /// Process one frame and summarize the outcome.
    pub fn process_frame(&self, frame: &FrameContours) -> FrameResult {
        let detections = self.process(&frame.contours);
        let posed = detections.iter().filter(|d| d.outcome.is_ok()).count();
        let stats = FrameStats {
            contours: frame.contours.len(),
            rejected: frame.contours.len() - detections.len(),
            posed,
            failed: detections.len() - posed,
        };
        debug!(
            "frame {}: {} contours, {} rejected, {} posed, {} failed",
            frame.frame_index, stats.contours, stats.rejected, stats.posed, stats.failed
        );
        FrameResult {
            frame_index: frame.frame_index,
            detections,
            stats,
        }
    }

    /// Approximate and validate a single contour.
    pub fn candidate_quad(&self, contour: &Contour) -> Result<Quad, Rejection> {
        let polygon = approx_polygon(contour.points(), self.config.approx_tolerance)
            .ok_or(Rejection::Collapsed)?;
        Quad::from_polygon(&polygon, &self.config.policy)
    }

    fn process_candidate(&self, index: usize, contour: &Contour) -> Option<Detection> {
        let quad = match self.candidate_quad(contour) {
            Ok(q) => q,
            Err(rejection) => {
                trace!("contour {index}: rejected, {rejection}");
                return None;
            }
        };

        let outcome = resolve(&quad, &self.model)
            .and_then(|corr| solve_pose(&corr, &self.camera, &self.config.solver));
        match &outcome {
            Ok(sol) => trace!(
                "contour {index}: posed in {} iterations, rmse {:.3e} px",
                sol.iterations,
                sol.reprojection_rmse
            ),
            Err(reason) => debug!("contour {index}: {reason}"),
        }

        Some(Detection {
            contour_index: index,
            quad,
            outcome,
        })
    }
}
