//! Hot-swappable model managers.
//!
//! A [`ModelManager`] owns the single loaded model of a family and serializes
//! selection and inference on it. Two families are provided: monocular depth
//! estimation ([`depth`]) and two-view dense matching ([`matcher`]).

/// Checkpoint file format.
pub mod checkpoint;

/// Monocular depth estimation.
pub mod depth;

/// Error types of the crate.
pub mod error;

/// Generic manager, slot and family abstractions.
pub mod manager;

/// Two-view dense matching.
pub mod matcher;

/// Model registries.
pub mod registry;

pub use crate::error::{ErrorKind, ModelError};
pub use crate::manager::{
    write_initial_checkpoints, ModelFamily, ModelListing, ModelManager, ModelSlot, ModelSpec,
};
pub use crate::registry::{ModelEntry, ModelRegistry, RegistryDocument};
