/// Contour perturbations for testing pipeline robustness.
use serde::{Deserialize, Serialize};

/// A perturbation applied to a rasterized contour before it reaches the
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContourNoise {
    /// Additive Gaussian jitter on both coordinates, re-rounded to pixels.
    Jitter { sigma: f64, seed: u64 },
    /// Randomly drop this fraction of points (segmentation gaps).
    Dropout { density: f64, seed: u64 },
}

/// Apply a sequence of perturbations to a contour in place.
///
/// Never reduces the contour below three points.
pub fn apply(points: &mut Vec<[i32; 2]>, noise: &[ContourNoise]) {
    for n in noise {
        apply_one(points, n);
    }
}

fn apply_one(points: &mut Vec<[i32; 2]>, n: &ContourNoise) {
    match n {
        ContourNoise::Jitter { sigma, seed } => apply_jitter(points, *sigma, *seed),
        ContourNoise::Dropout { density, seed } => apply_dropout(points, *density, *seed),
    }
}

/// Simple LCG pseudo-random number generator (deterministic).
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(1),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        // LCG with Knuth's constants
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Generate a uniform f64 in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate an approximately Gaussian random number using Box-Muller.
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-15); // avoid log(0)
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

fn apply_jitter(points: &mut [[i32; 2]], sigma: f64, seed: u64) {
    let mut rng = Rng::new(seed);
    for p in points.iter_mut() {
        p[0] = (p[0] as f64 + rng.next_gaussian() * sigma).round() as i32;
        p[1] = (p[1] as f64 + rng.next_gaussian() * sigma).round() as i32;
    }
}

fn apply_dropout(points: &mut Vec<[i32; 2]>, density: f64, seed: u64) {
    let mut rng = Rng::new(seed);
    let kept: Vec<[i32; 2]> = points
        .iter()
        .copied()
        .filter(|_| rng.next_f64() >= density)
        .collect();
    if kept.len() >= 3 {
        *points = kept;
    }
}
