//! Monocular depth estimation.

mod head;

use std::{fmt, str::FromStr, time::Instant};

use depthmatch_image::Image;

pub use head::{DepthArchitecture, DepthHead, DepthWeights, INPUT_SIZE};

use crate::{
    error::ModelError,
    manager::{ModelFamily, ModelManager},
};

/// Stabilizes the min/max normalization of constant maps.
pub const NORMALIZE_EPSILON: f32 = 1e-8;

/// A single channel depth map in the input image resolution.
pub type DepthMap = Image<f32, 1>;

/// Backbone sizes of the depth models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthEncoder {
    Vits,
    Vitb,
    Vitl,
    Vitg,
}

impl DepthEncoder {
    pub const ALL: [DepthEncoder; 4] = [Self::Vits, Self::Vitb, Self::Vitl, Self::Vitg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vits => "vits",
            Self::Vitb => "vitb",
            Self::Vitl => "vitl",
            Self::Vitg => "vitg",
        }
    }

    /// Width of the decoder features.
    pub fn features(&self) -> usize {
        match self {
            Self::Vits => 64,
            Self::Vitb => 128,
            Self::Vitl => 256,
            Self::Vitg => 384,
        }
    }

    /// Widths of the four reassembled backbone stages.
    pub fn out_channels(&self) -> [usize; 4] {
        match self {
            Self::Vits => [48, 96, 192, 384],
            Self::Vitb => [96, 192, 384, 768],
            Self::Vitl => [256, 512, 1024, 1024],
            Self::Vitg => [1536, 1536, 1536, 1536],
        }
    }

    /// Number of scales analysed by the head.
    pub fn levels(&self) -> usize {
        match self {
            Self::Vits => 3,
            Self::Vitb => 4,
            Self::Vitl => 5,
            Self::Vitg => 6,
        }
    }
}

impl fmt::Display for DepthEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepthEncoder {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ModelError::UnknownEncoder(s.to_string()))
    }
}

/// The Depth Anything V2 model family.
#[derive(Clone, Copy, Debug, Default)]
pub struct DepthFamily;

impl ModelFamily for DepthFamily {
    type Encoder = DepthEncoder;
    type Weights = DepthWeights;
    type Model = DepthHead;

    const NAME: &'static str = "depth_anything";

    fn parse_encoder(&self, descriptor: Option<&str>) -> Result<DepthEncoder, ModelError> {
        descriptor
            .ok_or_else(|| ModelError::UnknownEncoder("<missing>".to_string()))?
            .parse()
    }

    fn build(&self, encoder: &DepthEncoder) -> DepthHead {
        DepthHead::new(*encoder)
    }

    fn reuse(&self, current: &DepthHead) -> DepthHead {
        current.with_same_architecture()
    }

    fn encoder_of<'a>(&self, model: &'a DepthHead) -> &'a DepthEncoder {
        model.encoder()
    }

    fn initial_weights(&self, encoder: &DepthEncoder) -> DepthWeights {
        DepthWeights::default_for(*encoder)
    }

    fn load_weights(&self, model: &mut DepthHead, weights: DepthWeights) -> Result<(), ModelError> {
        model.load_weights(weights)
    }
}

pub type DepthManager = ModelManager<DepthFamily>;

impl ModelManager<DepthFamily> {
    /// Decode `image_bytes` and estimate its depth with the selected model.
    ///
    /// With `normalize` the map is rescaled into `[0, 1]` by [`normalize_depth`].
    ///
    /// # Errors
    ///
    /// [`ModelError::ImageDecode`] if the payload is not an image.
    pub fn predict(&self, image_bytes: &[u8], normalize: bool) -> Result<DepthMap, ModelError> {
        let image = depthmatch_io::functional::decode_image_rgb8(image_bytes)?;

        self.with_model(|model, spec| -> Result<DepthMap, ModelError> {
            let start = Instant::now();
            let mut depth = model.infer(&image)?;
            log::debug!(
                "depth inference with {:?} on {} took {:?}",
                spec.model_name,
                image.size(),
                start.elapsed()
            );

            if normalize {
                normalize_depth(&mut depth);
            }
            Ok(depth)
        })?
    }
}

/// Rescale a depth map in place to `(d - min) / (max - min + eps)`.
///
/// The minimum maps to exactly 0 and no value exceeds 1. A constant map becomes all zeros.
pub fn normalize_depth(depth: &mut DepthMap) {
    let (min, max) = depth
        .as_slice()
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| {
            (lo.min(d), hi.max(d))
        });
    if !min.is_finite() {
        return;
    }

    let denom = (max - min) + NORMALIZE_EPSILON;
    depth
        .as_slice_mut()
        .iter_mut()
        .for_each(|d| *d = (*d - min) / denom);
}
