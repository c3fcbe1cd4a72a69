//! Checkpoint files.
//!
//! A checkpoint is an 8 byte magic header followed by a bincode encoded
//! [`Checkpoint`] record: the architecture tag the weights were trained for and the
//! weights themselves.

use std::path::Path;

use crate::error::ModelError;

const MAGIC: &[u8; 8] = b"DMCKPT01";

/// Largest accepted checkpoint payload. Decoding never reserves more than this.
pub const MAX_CHECKPOINT_BYTES: usize = 256 * 1024 * 1024;

/// Weights tagged with the architecture they belong to.
#[derive(Clone, Debug, PartialEq, bincode::Encode, bincode::Decode)]
pub struct Checkpoint<W> {
    /// Architecture descriptor, e.g. `vitb`.
    pub encoder: String,
    pub weights: W,
}

/// Encode a checkpoint into its on-disk byte layout.
pub fn encode_checkpoint<W: bincode::Encode>(
    checkpoint: &Checkpoint<W>,
) -> Result<Vec<u8>, ModelError> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend(bincode::encode_to_vec(checkpoint, bincode::config::standard())?);
    Ok(bytes)
}

/// Write a checkpoint to `path`, creating the parent directories if needed.
pub fn save_checkpoint<W: bincode::Encode>(
    path: impl AsRef<Path>,
    checkpoint: &Checkpoint<W>,
) -> Result<(), ModelError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode_checkpoint(checkpoint)?)?;
    Ok(())
}

/// Read and decode a checkpoint.
///
/// # Errors
///
/// [`ModelError::CheckpointNotFound`] if the file does not exist and
/// [`ModelError::InvalidCheckpoint`] if the content is not a checkpoint of the
/// expected weight type.
pub fn load_checkpoint<W: bincode::Decode<()>>(
    path: impl AsRef<Path>,
) -> Result<Checkpoint<W>, ModelError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ModelError::CheckpointNotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let invalid = |reason: String| ModelError::InvalidCheckpoint {
        path: path.to_path_buf(),
        reason,
    };

    let payload = bytes
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| invalid("missing checkpoint header".into()))?;
    if payload.len() > MAX_CHECKPOINT_BYTES {
        return Err(invalid(format!(
            "{} bytes exceed the {MAX_CHECKPOINT_BYTES} byte limit",
            payload.len()
        )));
    }

    // the limit bounds every length prefix, so corrupt lengths fail instead of allocating
    let config = bincode::config::standard().with_limit::<MAX_CHECKPOINT_BYTES>();
    let (checkpoint, read) = bincode::decode_from_slice::<Checkpoint<W>, _>(payload, config)
        .map_err(|e| invalid(e.to_string()))?;
    if read != payload.len() {
        return Err(invalid(format!(
            "{} trailing bytes after the weights",
            payload.len() - read
        )));
    }

    Ok(checkpoint)
}
