use depthmatch_geometry::{find_fundamental, Mat3, RansacParams};

use crate::error::ModelError;

/// Sampled correspondences, four parallel sequences of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Correspondences {
    pub keypoints_a: Vec<[f64; 2]>,
    pub keypoints_b: Vec<[f64; 2]>,
    /// Normalized `[xA, yA, xB, yB]` matches.
    pub matches: Vec<[f32; 4]>,
    pub certainty: Vec<f32>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.keypoints_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints_a.is_empty()
    }

    /// Keep the entries selected by `mask`, preserving their order.
    pub fn select(self, mask: &[bool]) -> Self {
        Self {
            keypoints_a: masked(self.keypoints_a, mask),
            keypoints_b: masked(self.keypoints_b, mask),
            matches: masked(self.matches, mask),
            certainty: masked(self.certainty, mask),
        }
    }
}

fn masked<T>(values: Vec<T>, mask: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(mask)
        .filter_map(|(v, &keep)| keep.then_some(v))
        .collect()
}

/// Robustly fit the epipolar geometry and keep its inliers.
///
/// When no geometry can be estimated the fundamental matrix is `None` and all the
/// sequences are empty: unverified correspondences are never returned.
///
/// # Errors
///
/// Fails if the keypoint sequences have different lengths.
pub fn verify_correspondences(
    correspondences: Correspondences,
    params: &RansacParams,
) -> Result<(Option<Mat3>, Correspondences), ModelError> {
    let n = correspondences.len();
    let estimate = find_fundamental(
        &correspondences.keypoints_a,
        &correspondences.keypoints_b,
        params,
    )?;

    match estimate {
        Some(estimate) => {
            log::debug!(
                "epipolar verification kept {}/{n} correspondences",
                estimate.inlier_count
            );
            let inliers = correspondences.select(&estimate.inliers);
            Ok((Some(estimate.fundamental), inliers))
        }
        None => {
            log::debug!("no epipolar geometry found for {n} correspondences");
            Ok((None, Correspondences::default()))
        }
    }
}
