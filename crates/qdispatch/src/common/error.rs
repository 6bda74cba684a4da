use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Unfittable request: {0}")]
    UnfittableRequest(String),
    #[error("Missing credential: {0}")]
    MissingCredential(String),
    #[error("Could not lock {path:?} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<serde_json::error::Error> for DispatchError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(error.to_string())
    }
}
