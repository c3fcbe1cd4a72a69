use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Location and architecture of one registered model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Path to the checkpoint file.
    pub checkpoint: PathBuf,
    /// Architecture descriptor. Families with a single architecture may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,
}

impl ModelEntry {
    pub fn new(checkpoint: impl Into<PathBuf>, encoder: Option<&str>) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            encoder: encoder.map(str::to_string),
        }
    }
}

/// Serialized form of a [`ModelRegistry`].
///
/// ```json
/// { "default": "base_vitb", "models": { "base_vitb": { "checkpoint": "vitb.bin", "encoder": "vitb" } } }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub default: String,
    pub models: BTreeMap<String, ModelEntry>,
}

/// The set of models a manager may select from, with a designated default.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRegistry {
    default: String,
    entries: BTreeMap<String, ModelEntry>,
}

impl ModelRegistry {
    /// Create a registry, checking that `default` names one of the entries.
    pub fn new(
        default: impl Into<String>,
        entries: impl IntoIterator<Item = (String, ModelEntry)>,
    ) -> Result<Self, ModelError> {
        let default = default.into();
        let entries: BTreeMap<_, _> = entries.into_iter().collect();

        if entries.is_empty() {
            return Err(ModelError::InvalidRegistry("no models registered".into()));
        }
        if !entries.contains_key(&default) {
            return Err(ModelError::InvalidRegistry(format!(
                "default model '{default}' is not registered"
            )));
        }

        Ok(Self { default, entries })
    }

    /// Build a registry from its document, resolving relative checkpoint paths against `base_dir`.
    pub fn from_document(doc: RegistryDocument, base_dir: &Path) -> Result<Self, ModelError> {
        let entries = doc.models.into_iter().map(|(name, mut entry)| {
            if entry.checkpoint.is_relative() {
                entry.checkpoint = base_dir.join(&entry.checkpoint);
            }
            (name, entry)
        });
        Self::new(doc.default, entries)
    }

    /// Read a registry from a JSON file.
    ///
    /// Relative checkpoint paths are resolved against the directory holding the file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ModelError::InvalidRegistry(format!("cannot read '{}': {e}", path.display()))
        })?;
        let doc: RegistryDocument = serde_json::from_str(&text)?;
        Self::from_document(doc, path.parent().unwrap_or(Path::new(".")))
    }

    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.entries.get(name)
    }

    /// Registered model names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stock depth model table, with checkpoints under `<checkpoint_dir>/Depth-Anything-V2`.
    pub fn default_depth(checkpoint_dir: impl AsRef<Path>) -> Self {
        let dir = checkpoint_dir.as_ref().join("Depth-Anything-V2");
        let table = [
            ("base_vitl", "depth_anything_v2_vitl.bin", "vitl"),
            ("base_vitb", "depth_anything_v2_vitb.bin", "vitb"),
            ("0097_vitb", "0097_best_vitb_ep118.bin", "vitb"),
            ("0097_vitl", "0097_best_vitl_ep018.bin", "vitl"),
            ("fire", "fire_best_vitb_ep036.bin", "vitb"),
            ("fire_nerf", "fire_nerf_best_vitb_ep030.bin", "vitb"),
        ];
        Self {
            default: "base_vitb".into(),
            entries: table
                .iter()
                .map(|(name, file, encoder)| {
                    (name.to_string(), ModelEntry::new(dir.join(file), Some(encoder)))
                })
                .collect(),
        }
    }

    /// The stock matcher table, with checkpoints under `<checkpoint_dir>/tiny_RoMa`.
    pub fn default_match(checkpoint_dir: impl AsRef<Path>) -> Self {
        let dir = checkpoint_dir.as_ref().join("tiny_RoMa");
        let table = [
            ("base", "tiny_roma_v1_outdoor.bin"),
            ("0080", "0080_tiny_roma_ep100.bin"),
            ("fire", "fire_tiny_roma_ep100.bin"),
            ("fire_nerf", "fire_nerf_tiny_roma_ep100.bin"),
        ];
        Self {
            default: "base".into(),
            entries: table
                .iter()
                .map(|(name, file)| (name.to_string(), ModelEntry::new(dir.join(file), None)))
                .collect(),
        }
    }
}
