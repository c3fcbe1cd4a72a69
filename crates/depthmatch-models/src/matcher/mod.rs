//! Two-view dense matching with epipolar verification.

mod block;
mod verify;

use std::{fmt, str::FromStr, time::Instant};

use depthmatch_geometry::{Mat3, RansacParams};
use depthmatch_image::ImageSize;
use serde::{Deserialize, Serialize};

pub use block::{BlockMatcher, MatchWeights, MatcherArchitecture, Warp};
pub use verify::{verify_correspondences, Correspondences};

use crate::{
    error::ModelError,
    manager::{ModelFamily, ModelManager},
};

/// Architectures of the dense matcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatchDescriptor {
    /// Coarse working resolution.
    #[default]
    TinyRomaV1,
    /// Twice the working resolution and a wider search window.
    TinyRomaV1Hr,
}

impl MatchDescriptor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TinyRomaV1 => "tiny_roma_v1",
            Self::TinyRomaV1Hr => "tiny_roma_v1_hr",
        }
    }

    pub fn working_size(&self) -> ImageSize {
        match self {
            Self::TinyRomaV1 => ImageSize {
                width: 160,
                height: 120,
            },
            Self::TinyRomaV1Hr => ImageSize {
                width: 320,
                height: 240,
            },
        }
    }

    pub fn search_radius(&self) -> usize {
        match self {
            Self::TinyRomaV1 => 12,
            Self::TinyRomaV1Hr => 24,
        }
    }
}

impl fmt::Display for MatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchDescriptor {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tiny_roma_v1" => Ok(Self::TinyRomaV1),
            "tiny_roma_v1_hr" => Ok(Self::TinyRomaV1Hr),
            _ => Err(ModelError::UnknownEncoder(s.to_string())),
        }
    }
}

/// Output of the matching pipeline.
///
/// `kptsA`, `kptsB`, `matches` and `certainty` always have the same length and
/// only hold correspondences verified against `F`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "F")]
    pub fundamental: Option<Mat3>,
    #[serde(rename = "kptsA")]
    pub keypoints_a: Vec<[f64; 2]>,
    #[serde(rename = "kptsB")]
    pub keypoints_b: Vec<[f64; 2]>,
    pub matches: Vec<[f32; 4]>,
    pub certainty: Vec<f32>,
    #[serde(rename = "H_A")]
    pub height_a: usize,
    #[serde(rename = "W_A")]
    pub width_a: usize,
    #[serde(rename = "H_B")]
    pub height_b: usize,
    #[serde(rename = "W_B")]
    pub width_b: usize,
}

impl MatchResult {
    pub fn new(
        fundamental: Option<Mat3>,
        inliers: Correspondences,
        size_a: ImageSize,
        size_b: ImageSize,
    ) -> Self {
        Self {
            fundamental,
            keypoints_a: inliers.keypoints_a,
            keypoints_b: inliers.keypoints_b,
            matches: inliers.matches,
            certainty: inliers.certainty,
            height_a: size_a.height,
            width_a: size_a.width,
            height_b: size_b.height,
            width_b: size_b.width,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints_a.is_empty()
    }
}

/// The tiny RoMa matcher family.
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchFamily;

impl ModelFamily for MatchFamily {
    type Encoder = MatchDescriptor;
    type Weights = MatchWeights;
    type Model = BlockMatcher;

    const NAME: &'static str = "tiny_roma";

    fn parse_encoder(&self, descriptor: Option<&str>) -> Result<MatchDescriptor, ModelError> {
        descriptor.map_or(Ok(MatchDescriptor::default()), str::parse)
    }

    fn build(&self, encoder: &MatchDescriptor) -> BlockMatcher {
        BlockMatcher::new(*encoder)
    }

    fn reuse(&self, current: &BlockMatcher) -> BlockMatcher {
        current.with_same_architecture()
    }

    fn encoder_of<'a>(&self, model: &'a BlockMatcher) -> &'a MatchDescriptor {
        model.descriptor()
    }

    fn initial_weights(&self, _encoder: &MatchDescriptor) -> MatchWeights {
        MatchWeights::default()
    }

    fn load_weights(&self, model: &mut BlockMatcher, weights: MatchWeights) -> Result<(), ModelError> {
        model.load_weights(weights)
    }
}

pub type MatchManager = ModelManager<MatchFamily>;

impl ModelManager<MatchFamily> {
    /// Match two encoded images and verify the correspondences with a robust
    /// fundamental matrix fit.
    ///
    /// # Errors
    ///
    /// [`ModelError::ImageDecode`] if either payload is not an image.
    pub fn predict(&self, image_a: &[u8], image_b: &[u8]) -> Result<MatchResult, ModelError> {
        let image_a = depthmatch_io::functional::decode_image_rgb8(image_a)?;
        let image_b = depthmatch_io::functional::decode_image_rgb8(image_b)?;
        let (size_a, size_b) = (image_a.size(), image_b.size());

        self.with_model(|model, spec| -> Result<MatchResult, ModelError> {
            let start = Instant::now();

            let (warp, certainty) = model.match_images(&image_a, &image_b)?;
            let (matches, certainty) = model.sample(&warp, &certainty);
            let (keypoints_a, keypoints_b) = model.to_pixel_coordinates(
                &matches,
                size_a.height,
                size_a.width,
                size_b.height,
                size_b.width,
            );

            let sampled = Correspondences {
                keypoints_a,
                keypoints_b,
                matches,
                certainty,
            };
            let (fundamental, inliers) =
                verify_correspondences(sampled, &RansacParams::default())?;

            log::debug!(
                "matching with {:?} kept {} correspondences in {:?}",
                spec.model_name,
                inliers.len(),
                start.elapsed()
            );

            Ok(MatchResult::new(fundamental, inliers, size_a, size_b))
        })?
    }
}
