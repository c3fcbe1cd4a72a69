use std::sync::Arc;

use depthmatch_image::{ops, Image, ImageSize};
use depthmatch_imgproc::{
    filter::box_blur,
    gradient::gradient_magnitude,
    pyramid::{build_pyramid, pyrdown_avg, pyrdown_size},
    resize::resize_bilinear,
};

use super::DepthEncoder;
use crate::error::ModelError;

// Depth Anything V2 preprocessing constants
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Default working resolution of the ViT backbones.
pub const INPUT_SIZE: usize = 518;

/// Learnable parameters of a [`DepthHead`].
#[derive(Clone, Debug, PartialEq, bincode::Encode, bincode::Decode)]
pub struct DepthWeights {
    /// Projection of the normalized RGB channels onto the single analysis channel.
    pub mix: [f32; 3],
    /// One gain per pyramid level, finest first.
    pub level_weights: Vec<f32>,
    pub bias: f32,
}

impl DepthWeights {
    /// Initial weights for an encoder: luma mix and level gains proportional to
    /// the decoder widths.
    pub fn default_for(encoder: DepthEncoder) -> Self {
        let channels = encoder.out_channels();
        let total = channels.iter().sum::<usize>() as f32;
        let level_weights = (0..encoder.levels())
            .map(|l| channels[l.min(channels.len() - 1)] as f32 / total)
            .collect();
        Self {
            mix: [0.299, 0.587, 0.114],
            level_weights,
            bias: 1.0,
        }
    }
}

/// Fixed structure of a depth head, shared between models of the same encoder.
#[derive(Debug)]
pub struct DepthArchitecture {
    pub encoder: DepthEncoder,
    /// Images larger than this are halved before analysis.
    pub input_size: usize,
    /// Number of pyramid levels.
    pub levels: usize,
    /// Radius of the box filter pooling the gradient energy.
    pub pool_radius: usize,
}

impl DepthArchitecture {
    pub fn new(encoder: DepthEncoder) -> Self {
        Self {
            encoder,
            input_size: INPUT_SIZE,
            levels: encoder.levels(),
            pool_radius: encoder.features() / 64,
        }
    }
}

/// Built-in monocular depth head.
///
/// Estimates relative inverse depth from multi-scale gradient energy: textured,
/// high frequency regions are assumed closer to the camera than smooth ones. The
/// map is computed at the working resolution and upsampled to the input
/// resolution. A constant image yields a map exactly equal to the bias.
#[derive(Clone, Debug)]
pub struct DepthHead {
    arch: Arc<DepthArchitecture>,
    weights: DepthWeights,
}

impl DepthHead {
    pub fn new(encoder: DepthEncoder) -> Self {
        Self {
            arch: Arc::new(DepthArchitecture::new(encoder)),
            weights: DepthWeights::default_for(encoder),
        }
    }

    /// A head sharing this architecture, reset to its initial weights.
    pub fn with_same_architecture(&self) -> Self {
        Self {
            arch: Arc::clone(&self.arch),
            weights: DepthWeights::default_for(self.arch.encoder),
        }
    }

    pub fn encoder(&self) -> &DepthEncoder {
        &self.arch.encoder
    }

    pub fn architecture(&self) -> &DepthArchitecture {
        &self.arch
    }

    pub fn weights(&self) -> &DepthWeights {
        &self.weights
    }

    /// Replace the weights, checking they fit the architecture.
    pub fn load_weights(&mut self, weights: DepthWeights) -> Result<(), ModelError> {
        if weights.level_weights.len() != self.arch.levels {
            return Err(ModelError::InvalidWeights(format!(
                "{} expects {} level weights, got {}",
                self.arch.encoder,
                self.arch.levels,
                weights.level_weights.len()
            )));
        }

        let finite = weights
            .mix
            .iter()
            .chain(weights.level_weights.iter())
            .chain(std::iter::once(&weights.bias))
            .all(|v| v.is_finite());
        if !finite {
            return Err(ModelError::InvalidWeights("non finite depth weights".into()));
        }

        self.weights = weights;
        Ok(())
    }

    /// Predict a raw depth map with the resolution of `image`.
    pub fn infer(&self, image: &Image<u8, 3>) -> Result<Image<f32, 1>, ModelError> {
        let size = image.size();

        // cast the image to f32 and scale it to the range [0, 1]
        let mut rgb = Image::<f32, 3>::from_size_val(size, 0.0)?;
        ops::cast_and_scale(image, &mut rgb, 1.0 / 255.0)?;

        let mut normalized = Image::<f32, 3>::from_size_val(size, 0.0)?;
        ops::normalize_mean_std(&rgb, &mut normalized, &IMAGENET_MEAN, &IMAGENET_STD)?;

        let mut luminance = Image::<f32, 1>::from_size_val(size, 0.0)?;
        ops::weighted_gray(&normalized, &mut luminance, &self.weights.mix)?;

        let working = self.to_working_resolution(luminance)?;
        let pyramid = build_pyramid(&working, self.arch.levels)?;

        let mut depth = Image::<f32, 1>::from_size_val(size, 0.0)?;
        let mut upsampled = Image::<f32, 1>::from_size_val(size, 0.0)?;
        for (level, &gain) in pyramid.iter().zip(self.weights.level_weights.iter()) {
            let mut gradient = Image::from_size_val(level.size(), 0.0)?;
            gradient_magnitude(level, &mut gradient)?;

            let mut energy = Image::from_size_val(level.size(), 0.0)?;
            box_blur(&gradient, &mut energy, self.arch.pool_radius)?;

            resize_bilinear(&energy, &mut upsampled)?;
            depth
                .as_slice_mut()
                .iter_mut()
                .zip(upsampled.as_slice())
                .for_each(|(d, &e)| *d += gain * e);
        }

        let bias = self.weights.bias;
        depth.as_slice_mut().iter_mut().for_each(|d| *d += bias);

        Ok(depth)
    }

    fn to_working_resolution(&self, mut image: Image<f32, 1>) -> Result<Image<f32, 1>, ModelError> {
        while image.width().max(image.height()) > self.arch.input_size {
            let next_size: ImageSize = pyrdown_size(image.size());
            if next_size.area() == 0 {
                break;
            }
            let mut next = Image::from_size_val(next_size, 0.0)?;
            pyrdown_avg(&image, &mut next)?;
            image = next;
        }
        Ok(image)
    }
}
