// THEORY:
// The `error` module defines the single error taxonomy of the engine. Stages
// propagate these with `?`; only the façade in `pipeline` decides to turn one
// into the fail-soft `DetectionOutcome::Failed` variant. Decode and buffer
// errors are raised before a pipeline run and always reach the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the vision engine can report.
#[derive(Error, Debug)]
pub enum VisionError {
    /// The input bytes could not be decoded into an image.
    #[error("image decode failed")]
    Decode(#[source] image::ImageError),

    /// The raw buffer does not describe a non-empty 3-channel 8-bit image.
    #[error("invalid image buffer: {width}x{height} with {len} bytes (expected {expected})")]
    InvalidImage {
        width: u32,
        height: u32,
        len: usize,
        expected: usize,
    },

    /// A stage parameter cannot be used as given.
    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// The detector configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read.
    #[error("failed to read configuration from {}", path.display())]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for `DetectorConfig`.
    #[error("failed to parse configuration")]
    ConfigParse(#[source] serde_json::Error),

    /// The batch worker pool has shut down or dropped a job.
    #[error("worker pool unavailable: {0}")]
    WorkerUnavailable(&'static str),
}

impl VisionError {
    pub(crate) fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        VisionError::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

pub type VisionResult<T> = Result<T, VisionError>;
