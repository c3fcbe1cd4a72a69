use rand::prelude::*;
use rand::SeedableRng;

use crate::error::GeometryError;
use crate::fundamental::{
    fundamental_8point, is_collinear, sampson_distance, Mat3, MIN_CORRESPONDENCES,
};

/// Parameters for RANSAC fundamental matrix estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RansacParams {
    /// Inlier threshold on the Sampson distance, in pixels.
    pub threshold: f64,
    /// Desired probability that at least one sample is outlier free.
    pub confidence: f64,
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            confidence: 0.999999,
            max_iterations: 10_000,
            random_seed: Some(0),
        }
    }
}

/// Result of a successful robust fundamental matrix fit.
#[derive(Clone, Debug)]
pub struct FundamentalEstimate {
    /// Estimated fundamental matrix, `x2^T F x1 = 0`.
    pub fundamental: Mat3,
    /// Per-correspondence inlier mask, same length as the input.
    pub inliers: Vec<bool>,
    /// Total inlier count.
    pub inlier_count: usize,
    /// Number of hypotheses evaluated.
    pub iterations: usize,
}

struct Hypothesis {
    model: Mat3,
    inliers: Vec<bool>,
    count: usize,
    score: f64,
}

/// Estimate a fundamental matrix with RANSAC using the 8-point solver.
///
/// The number of iterations adapts to the inlier ratio of the best hypothesis so
/// far, `N = log(1 - confidence) / log(1 - w^8)`, capped by `max_iterations`.
/// The winning hypothesis is refitted on all of its inliers.
///
/// Returns `Ok(None)` when no geometry can be estimated: fewer than 8
/// correspondences, all points collinear in one of the views, or no hypothesis
/// supported by at least 8 inliers.
///
/// # Errors
///
/// Fails only if `x1` and `x2` have different lengths.
pub fn find_fundamental(
    x1: &[[f64; 2]],
    x2: &[[f64; 2]],
    params: &RansacParams,
) -> Result<Option<FundamentalEstimate>, GeometryError> {
    if x1.len() != x2.len() {
        return Err(GeometryError::InvalidInput {
            required: MIN_CORRESPONDENCES,
            left: x1.len(),
            right: x2.len(),
        });
    }

    let n = x1.len();
    if n < MIN_CORRESPONDENCES {
        log::debug!("fundamental estimation skipped: only {n} correspondences");
        return Ok(None);
    }

    if is_collinear(x1) || is_collinear(x2) {
        log::debug!("fundamental estimation skipped: degenerate point configuration");
        return Ok(None);
    }

    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let threshold_sq = params.threshold * params.threshold;
    let mut best: Option<Hypothesis> = None;
    let mut required = params.max_iterations;
    let mut iterations = 0usize;

    let mut s1 = Vec::with_capacity(MIN_CORRESPONDENCES);
    let mut s2 = Vec::with_capacity(MIN_CORRESPONDENCES);

    while iterations < required {
        iterations += 1;

        s1.clear();
        s2.clear();
        for idx in rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES).iter() {
            s1.push(x1[idx]);
            s2.push(x2[idx]);
        }
        if is_collinear(&s1) || is_collinear(&s2) {
            continue;
        }

        let f = match fundamental_8point(&s1, &s2) {
            Ok(f) => f,
            Err(_) => continue,
        };

        let hypothesis = score_model(f, x1, x2, threshold_sq);
        let improves = match &best {
            None => true,
            Some(b) => {
                hypothesis.count > b.count
                    || (hypothesis.count == b.count && hypothesis.score < b.score)
            }
        };

        if improves {
            let ratio = hypothesis.count as f64 / n as f64;
            required = adaptive_iterations(ratio, params.confidence, params.max_iterations)
                .max(iterations);
            best = Some(hypothesis);
        }
    }

    let Some(mut best) = best.filter(|b| b.count >= MIN_CORRESPONDENCES) else {
        log::debug!("fundamental estimation failed after {iterations} iterations");
        return Ok(None);
    };

    // refit on the full consensus set
    let (in1, in2): (Vec<_>, Vec<_>) = best
        .inliers
        .iter()
        .zip(x1.iter().zip(x2.iter()))
        .filter(|&(&is_inlier, _)| is_inlier)
        .map(|(_, (a, b))| (*a, *b))
        .unzip();
    if let Ok(refined) = fundamental_8point(&in1, &in2) {
        let candidate = score_model(refined, x1, x2, threshold_sq);
        if candidate.count >= best.count {
            best = candidate;
        }
    }

    log::debug!(
        "fundamental estimation: {}/{} inliers after {} iterations",
        best.count,
        n,
        iterations
    );

    Ok(Some(FundamentalEstimate {
        fundamental: best.model,
        inliers: best.inliers,
        inlier_count: best.count,
        iterations,
    }))
}

fn score_model(model: Mat3, x1: &[[f64; 2]], x2: &[[f64; 2]], threshold_sq: f64) -> Hypothesis {
    let mut inliers = vec![false; x1.len()];
    let mut count = 0usize;
    let mut score = 0.0f64;
    for (i, (a, b)) in x1.iter().zip(x2.iter()).enumerate() {
        let d = sampson_distance(&model, a, b);
        if d <= threshold_sq {
            inliers[i] = true;
            count += 1;
            score += d;
        }
    }
    Hypothesis {
        model,
        inliers,
        count,
        score,
    }
}

/// Number of samples needed to draw one outlier free minimal set with the given confidence.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64, max_iterations: usize) -> usize {
    let p_good = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::EPSILON {
        return max_iterations;
    }

    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let den = (1.0 - p_good).ln();
    let needed = (num / den).ceil();
    if needed.is_finite() && needed < max_iterations as f64 {
        needed.max(1.0) as usize
    } else {
        max_iterations
    }
}
