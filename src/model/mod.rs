//! Fitted hemoglobin model: artifact loading, preprocessing, regression.

pub mod artifact;
pub mod regressor;
pub mod transform;

pub use artifact::{load_artifact, Artifact, FeatureKind, DEFAULT_THRESHOLD};
pub use regressor::{Model, Regressor};
pub use transform::{FeatureTransform, Preprocessor};

use std::path::PathBuf;

use thiserror::Error;

/// Failure while running a transform or regressor on one vector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{stage}: expected {expected} features, got {got}")]
    ShapeMismatch {
        stage: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("{0}: produced a non-finite value")]
    NonFinite(&'static str),

    #[error("Malformed model: {0}")]
    Malformed(String),
}

/// Failure while loading an artifact at startup.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error reading artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Artifact is inconsistent: {0}")]
    Invalid(String),
}
