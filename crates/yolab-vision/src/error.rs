use std::path::PathBuf;

use thiserror::Error;

use crate::runtime::BoxError;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("model not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("failed to load model {}", path.display())]
    ModelLoadFailure {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("invalid detector config: {0}")]
    InvalidConfig(String),

    #[error("detector not initialized")]
    NotInitialized,

    #[error("image decode failed: {reason}")]
    ImageDecode {
        reason: String,
        #[source]
        source: Option<image::ImageError>,
    },

    #[error("inference runtime failed")]
    InferenceRuntime {
        #[source]
        source: BoxError,
    },

    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

impl VisionError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        VisionError::InvalidConfig(msg.into())
    }
}
