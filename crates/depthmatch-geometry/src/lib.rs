#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the geometry module.
pub mod error;

/// Fundamental matrix solvers and residuals.
pub mod fundamental;

/// Robust model fitting with random sample consensus.
pub mod ransac;

pub use crate::error::GeometryError;
pub use crate::fundamental::{fundamental_8point, sampson_distance, Mat3};
pub use crate::ransac::{find_fundamental, FundamentalEstimate, RansacParams};

#[cfg(test)]
pub(crate) mod synthetic;
