use std::path::Path;

use depthmatch_models::{ModelError, ModelRegistry, RegistryDocument};
use serde::Deserialize;

/// Registry file of the service, one optional table per model family.
///
/// ```json
/// {
///   "depth": { "default": "base_vitb", "models": { "base_vitb": { "checkpoint": "vitb.bin", "encoder": "vitb" } } },
///   "match": { "default": "base", "models": { "base": { "checkpoint": "roma.bin" } } }
/// }
/// ```
///
/// A family without a table uses its built-in registry.
#[derive(Debug, Default, Deserialize)]
pub struct ServeConfig {
    #[serde(default)]
    pub depth: Option<RegistryDocument>,
    #[serde(default, rename = "match")]
    pub matcher: Option<RegistryDocument>,
}

/// The registries of both families.
#[derive(Clone, Debug)]
pub struct Registries {
    pub depth: ModelRegistry,
    pub matcher: ModelRegistry,
}

impl Registries {
    /// The built-in registries with checkpoints under `checkpoint_dir`.
    pub fn builtin(checkpoint_dir: &Path) -> Self {
        Self {
            depth: ModelRegistry::default_depth(checkpoint_dir),
            matcher: ModelRegistry::default_match(checkpoint_dir),
        }
    }

    /// Load the registries, reading `registry_file` if given.
    ///
    /// Relative checkpoint paths of the file resolve against its directory.
    pub fn load(registry_file: Option<&Path>, checkpoint_dir: &Path) -> Result<Self, ModelError> {
        let Some(path) = registry_file else {
            return Ok(Self::builtin(checkpoint_dir));
        };

        let text = std::fs::read_to_string(path).map_err(|e| {
            ModelError::InvalidRegistry(format!("cannot read '{}': {e}", path.display()))
        })?;
        let config: ServeConfig = serde_json::from_str(&text)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));

        let depth = match config.depth {
            Some(doc) => ModelRegistry::from_document(doc, base_dir)?,
            None => ModelRegistry::default_depth(checkpoint_dir),
        };
        let matcher = match config.matcher {
            Some(doc) => ModelRegistry::from_document(doc, base_dir)?,
            None => ModelRegistry::default_match(checkpoint_dir),
        };
        Ok(Self { depth, matcher })
    }
}
