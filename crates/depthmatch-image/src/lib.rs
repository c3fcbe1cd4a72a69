#![deny(missing_docs)]
//! Image types and basic pixel operations

/// image representation for computer vision purposes.
pub mod image;

/// Error types for the image module.
pub mod error;

/// Pixel-wise operations: casting, color conversion and normalization.
pub mod ops;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
