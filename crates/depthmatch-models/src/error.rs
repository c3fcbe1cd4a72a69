use std::path::PathBuf;

/// Classification of a [`ModelError`] as seen by callers of a manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown model name, unknown architecture descriptor or malformed registry.
    Configuration,
    /// Missing, unreadable or incompatible checkpoint.
    Resource,
    /// Payload that cannot be decoded into an image.
    Input,
    /// No model selected or any unexpected failure.
    Internal,
}

impl ErrorKind {
    /// Whether the error was caused by the request rather than by the service.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, ErrorKind::Internal)
    }
}

/// An error type for the model managers and inference pipelines.
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("Model '{name}' not found in the {family} registry")]
    UnknownModel { family: &'static str, name: String },

    #[error("Unsupported encoder type: {0}")]
    UnknownEncoder(String),

    #[error("Invalid model registry: {0}")]
    InvalidRegistry(String),

    #[error("Failed to parse the model registry")]
    RegistryParse(#[from] serde_json::Error),

    #[error("Checkpoint '{0}' not found")]
    CheckpointNotFound(PathBuf),

    #[error("Invalid checkpoint '{path}': {reason}")]
    InvalidCheckpoint { path: PathBuf, reason: String },

    #[error("Checkpoint '{path}' holds '{found}' weights, expected '{expected}'")]
    CheckpointMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Incompatible weights: {0}")]
    InvalidWeights(String),

    #[error("Failed to access file")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode checkpoint")]
    CheckpointEncode(#[from] bincode::error::EncodeError),

    #[error("Cannot decode image")]
    ImageDecode(#[from] depthmatch_io::IoError),

    #[error("Image processing failed")]
    ImageError(#[from] depthmatch_image::ImageError),

    #[error("Geometric verification failed")]
    GeometryError(#[from] depthmatch_geometry::GeometryError),

    #[error("No {0} model selected yet")]
    NoModelSelected(&'static str),

    #[error("The {0} model lock is poisoned")]
    LockPoisoned(&'static str),
}

impl ModelError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::UnknownModel { .. }
            | ModelError::UnknownEncoder(_)
            | ModelError::InvalidRegistry(_)
            | ModelError::RegistryParse(_) => ErrorKind::Configuration,
            ModelError::CheckpointNotFound(_)
            | ModelError::InvalidCheckpoint { .. }
            | ModelError::CheckpointMismatch { .. }
            | ModelError::InvalidWeights(_)
            | ModelError::Io(_) => ErrorKind::Resource,
            ModelError::ImageDecode(_) => ErrorKind::Input,
            ModelError::CheckpointEncode(_)
            | ModelError::ImageError(_)
            | ModelError::GeometryError(_)
            | ModelError::NoModelSelected(_)
            | ModelError::LockPoisoned(_) => ErrorKind::Internal,
        }
    }
}
