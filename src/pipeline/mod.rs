pub mod types;
pub mod decode;
pub mod embedding;
pub mod color;
pub mod aggregate;
pub mod predict;
pub mod strategy;
pub mod analyzer; // Request-level orchestration: decode → extract → aggregate → predict

pub use types::*;

use thiserror::Error;

/// Which side of the service boundary a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Bad upload: the caller can fix it and retry.
    ClientInput,
    /// Artifact/extractor version skew: an operator must intervene.
    ServerConfiguration,
    /// Anything unexpected inside decode/extract/aggregate/predict.
    Internal,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No images provided")]
    NoInput,

    #[error("Failed to decode {file}: {reason}")]
    Decode { file: String, reason: String },

    #[error("Region '{region}' is empty for a {width}x{height} image")]
    DegenerateRegion {
        region: &'static str,
        width: u32,
        height: u32,
    },

    #[error(
        "Feature dimension mismatch: got {got}, expected {expected}. \
         Check that artifact \"{artifact}\" was fitted on the same feature extractor"
    )]
    DimensionMismatch {
        got: usize,
        expected: usize,
        artifact: String,
    },

    #[error("Per-image feature vectors differ in length: {0:?}")]
    InconsistentFeatures(Vec<usize>),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Prediction error: {0}")]
    Prediction(String),
}

impl AnalysisError {
    pub fn fault(&self) -> FaultKind {
        match self {
            Self::NoInput | Self::Decode { .. } | Self::DegenerateRegion { .. } => {
                FaultKind::ClientInput
            }
            Self::DimensionMismatch { .. } => FaultKind::ServerConfiguration,
            Self::InconsistentFeatures(_) | Self::Embedding(_) | Self::Prediction(_) => {
                FaultKind::Internal
            }
        }
    }
}
