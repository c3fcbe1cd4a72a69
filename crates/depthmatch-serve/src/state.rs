use std::sync::Arc;

use depthmatch_models::{
    depth::{DepthFamily, DepthManager},
    matcher::{MatchFamily, MatchManager},
    write_initial_checkpoints, ModelError,
};

use crate::config::Registries;

/// The managers shared by every handler. The two families are independent.
#[derive(Clone)]
pub struct AppState {
    pub depth: Arc<DepthManager>,
    pub matcher: Arc<MatchManager>,
}

impl AppState {
    /// Construct both managers, each selecting its default model.
    pub fn new(registries: Registries) -> Result<Self, ModelError> {
        Ok(Self {
            depth: Arc::new(DepthManager::new(DepthFamily, registries.depth)?),
            matcher: Arc::new(MatchManager::new(MatchFamily, registries.matcher)?),
        })
    }
}

/// Write the built-in initial weights for every registered checkpoint that is missing.
pub fn init_checkpoints(registries: &Registries) -> Result<usize, ModelError> {
    let depth = write_initial_checkpoints(&DepthFamily, &registries.depth)?;
    let matcher = write_initial_checkpoints(&MatchFamily, &registries.matcher)?;
    Ok(depth.len() + matcher.len())
}
