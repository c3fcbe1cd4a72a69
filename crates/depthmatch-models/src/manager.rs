use std::{
    fmt,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::{self, Checkpoint},
    error::ModelError,
    registry::{ModelEntry, ModelRegistry},
};

/// Identifies the active configuration of a manager.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_name: Option<String>,
}

impl ModelSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            model_name: Some(name.into()),
        }
    }
}

/// The loaded model of a family together with the spec it was selected with.
#[derive(Debug)]
pub struct ModelSlot<M> {
    pub model: Option<M>,
    pub spec: ModelSpec,
}

impl<M> Default for ModelSlot<M> {
    fn default() -> Self {
        Self {
            model: None,
            spec: ModelSpec::default(),
        }
    }
}

/// Registered models of a manager and the one currently selected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelListing {
    pub current: Option<String>,
    pub models: Vec<String>,
}

/// Behaviour specific to one model family.
///
/// A family knows how to parse architecture descriptors, build an architecture
/// and load weights into it. [`ModelManager`] drives these steps and owns the
/// shared slot.
pub trait ModelFamily: Send + Sync + 'static {
    /// Architecture descriptor.
    type Encoder: Clone + PartialEq + fmt::Display + fmt::Debug + Send;
    /// Weights stored in a checkpoint.
    type Weights: bincode::Encode + bincode::Decode<()>;
    /// A constructed model, ready for inference once weights are loaded.
    type Model: Send;

    /// Name of the family used in logs and error messages.
    const NAME: &'static str;

    /// Resolve the descriptor of a registry entry.
    fn parse_encoder(&self, descriptor: Option<&str>) -> Result<Self::Encoder, ModelError>;

    /// Construct a new architecture instance.
    fn build(&self, encoder: &Self::Encoder) -> Self::Model;

    /// Construct a model that shares the architecture of `current`.
    fn reuse(&self, current: &Self::Model) -> Self::Model;

    fn encoder_of<'a>(&self, model: &'a Self::Model) -> &'a Self::Encoder;

    /// Weights a freshly constructed architecture starts with.
    fn initial_weights(&self, encoder: &Self::Encoder) -> Self::Weights;

    fn load_weights(&self, model: &mut Self::Model, weights: Self::Weights)
        -> Result<(), ModelError>;
}

/// Owns the single model slot of a family and serializes every access to it.
///
/// Selection builds and loads the new model off-slot and publishes it with a
/// single assignment, so a failed selection never changes what callers observe.
pub struct ModelManager<F: ModelFamily> {
    family: F,
    registry: ModelRegistry,
    slot: Mutex<ModelSlot<F::Model>>,
}

impl<F: ModelFamily> ModelManager<F> {
    /// Create a manager and select the registry default.
    ///
    /// # Errors
    ///
    /// Fails with the error of the default selection, e.g. when its checkpoint is missing.
    pub fn new(family: F, registry: ModelRegistry) -> Result<Self, ModelError> {
        let manager = Self {
            family,
            registry,
            slot: Mutex::new(ModelSlot::default()),
        };
        let default = manager.registry.default_name().to_string();
        manager.select(&default)?;
        Ok(manager)
    }

    /// Select the model registered as `model_name`.
    ///
    /// # Errors
    ///
    /// - [`ModelError::UnknownModel`] / [`ModelError::UnknownEncoder`] for configuration problems.
    /// - [`ModelError::CheckpointNotFound`] and other resource errors while loading the weights.
    ///
    /// On error the previously selected model and spec stay in place.
    pub fn select(&self, model_name: &str) -> Result<ModelSpec, ModelError> {
        let mut slot = self.lock()?;
        log::info!("selecting {} model '{model_name}'", F::NAME);

        let candidate = self
            .load_candidate(model_name, slot.model.as_ref())
            .inspect_err(|e| log::warn!("{} selection of '{model_name}' failed: {e}", F::NAME))?;

        slot.model = Some(candidate);
        slot.spec = ModelSpec::named(model_name);
        log::info!("{} model '{model_name}' selected", F::NAME);

        Ok(slot.spec.clone())
    }

    fn load_candidate(
        &self,
        model_name: &str,
        current: Option<&F::Model>,
    ) -> Result<F::Model, ModelError> {
        let entry = self
            .registry
            .get(model_name)
            .ok_or_else(|| ModelError::UnknownModel {
                family: F::NAME,
                name: model_name.to_string(),
            })?;

        let encoder = self.family.parse_encoder(entry.encoder.as_deref())?;

        let path = entry.checkpoint.as_path();
        if !path.is_file() {
            return Err(ModelError::CheckpointNotFound(path.to_path_buf()));
        }
        let Checkpoint {
            encoder: tag,
            weights,
        } = checkpoint::load_checkpoint::<F::Weights>(path)?;
        if tag != encoder.to_string() {
            return Err(ModelError::CheckpointMismatch {
                path: path.to_path_buf(),
                expected: encoder.to_string(),
                found: tag,
            });
        }

        let mut candidate = match current {
            Some(model) if *self.family.encoder_of(model) == encoder => {
                log::debug!("reusing the {encoder} architecture");
                self.family.reuse(model)
            }
            _ => {
                log::debug!("building the {encoder} architecture");
                self.family.build(&encoder)
            }
        };
        self.family.load_weights(&mut candidate, weights)?;
        log::debug!("loaded weights from {}", path.display());

        Ok(candidate)
    }

    /// Run `f` against the selected model while holding the manager lock.
    ///
    /// # Errors
    ///
    /// [`ModelError::NoModelSelected`] if the slot is empty.
    pub fn with_model<R>(
        &self,
        f: impl FnOnce(&F::Model, &ModelSpec) -> R,
    ) -> Result<R, ModelError> {
        let slot = self.lock()?;
        let model = slot
            .model
            .as_ref()
            .ok_or(ModelError::NoModelSelected(F::NAME))?;
        Ok(f(model, &slot.spec))
    }

    /// A copy of the selected model.
    pub fn get_model(&self) -> Result<F::Model, ModelError>
    where
        F::Model: Clone,
    {
        self.with_model(|model, _| model.clone())
    }

    /// A copy of the current spec.
    pub fn get_spec(&self) -> ModelSpec {
        // the slot is only ever replaced whole, a poisoned guard still holds a consistent pair
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spec
            .clone()
    }

    pub fn list_models(&self) -> ModelListing {
        ModelListing {
            current: self.get_spec().model_name,
            models: self.registry.names().map(str::to_string).collect(),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn lock(&self) -> Result<MutexGuard<'_, ModelSlot<F::Model>>, ModelError> {
        self.slot
            .lock()
            .map_err(|_| ModelError::LockPoisoned(F::NAME))
    }
}

/// Write the initial weights of every registered model whose checkpoint is missing.
///
/// Returns the paths that were written.
pub fn write_initial_checkpoints<F: ModelFamily>(
    family: &F,
    registry: &ModelRegistry,
) -> Result<Vec<PathBuf>, ModelError> {
    let mut written = Vec::new();
    for (name, entry) in registry.entries() {
        if entry.checkpoint.is_file() {
            continue;
        }
        write_initial_checkpoint(family, entry)?;
        log::info!(
            "wrote initial {} checkpoint for '{name}' to {}",
            F::NAME,
            entry.checkpoint.display()
        );
        written.push(entry.checkpoint.clone());
    }
    Ok(written)
}

fn write_initial_checkpoint<F: ModelFamily>(
    family: &F,
    entry: &ModelEntry,
) -> Result<(), ModelError> {
    let encoder = family.parse_encoder(entry.encoder.as_deref())?;
    let checkpoint = Checkpoint {
        encoder: encoder.to_string(),
        weights: family.initial_weights(&encoder),
    };
    checkpoint::save_checkpoint(&entry.checkpoint, &checkpoint)
}
