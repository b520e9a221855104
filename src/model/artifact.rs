//! On-disk artifact: JSON bundle of (preprocessor?, model, threshold).
//!
//! Two layouts are accepted:
//!
//! ```json
//! { "model": { "kind": "linear", ... }, "preprocessor": { "steps": [...] },
//!   "hb_threshold": 12.0, "feature_kind": "color_ratios" }
//! ```
//!
//! or a bare model object (`{ "kind": "linear", ... }`) with no preprocessor
//! and the default threshold.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use super::regressor::{Model, Regressor};
use super::transform::{FeatureTransform, Preprocessor};
use super::ArtifactError;
use crate::pipeline::color::ReferenceRegion;
use crate::pipeline::embedding::EMBEDDING_DIM;

/// Anemia cut-point in g/dL when the artifact does not carry one.
pub const DEFAULT_THRESHOLD: f32 = 12.5;

/// Hex characters of the SHA-256 kept as the artifact digest.
const DIGEST_CHARS: usize = 12;

/// Which extractor produced the training features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Embedding,
    ColorRatios,
}

#[derive(Debug, Deserialize)]
struct BundleFile {
    model: Model,
    #[serde(default)]
    preprocessor: Option<Preprocessor>,
    #[serde(default)]
    hb_threshold: Option<f32>,
    #[serde(default)]
    feature_kind: Option<FeatureKind>,
    #[serde(default)]
    reference_region: Option<ReferenceRegion>,
}

/// Loaded, validated artifact. Immutable after startup.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// File name, used in diagnostics and error messages.
    pub name: String,
    pub path: PathBuf,
    /// Leading hex of the file's SHA-256.
    pub digest: String,
    pub model: Model,
    pub preprocessor: Option<Preprocessor>,
    pub threshold: f32,
    pub feature_kind: Option<FeatureKind>,
    pub reference_region: Option<ReferenceRegion>,
}

impl Artifact {
    /// Parse and validate artifact bytes.
    pub fn from_slice(path: &Path, bytes: &[u8]) -> Result<Self, ArtifactError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let is_bundle = value.get("model").is_some();
        let bundle = if is_bundle {
            serde_json::from_value::<BundleFile>(value)?
        } else {
            BundleFile {
                model: serde_json::from_value(value)?,
                preprocessor: None,
                hb_threshold: None,
                feature_kind: None,
                reference_region: None,
            }
        };

        let threshold = bundle.hb_threshold.unwrap_or(DEFAULT_THRESHOLD);
        if !threshold.is_finite() {
            return Err(ArtifactError::Invalid(format!(
                "hb_threshold must be finite, got {threshold}"
            )));
        }
        bundle.model.validate().map_err(ArtifactError::Invalid)?;
        if let Some(pre) = &bundle.preprocessor {
            pre.validate().map_err(ArtifactError::Invalid)?;
            if let Some(n) = bundle.model.input_len() {
                if n != pre.output_len() {
                    return Err(ArtifactError::Invalid(format!(
                        "preprocessor outputs {} features but model expects {n}",
                        pre.output_len()
                    )));
                }
            }
        }

        let hash = Sha256::digest(bytes);
        let digest: String = hash.iter().map(|b| format!("{b:02x}")).collect();

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
            digest: digest[..DIGEST_CHARS].to_string(),
            model: bundle.model,
            preprocessor: bundle.preprocessor,
            threshold,
            feature_kind: bundle.feature_kind,
            reference_region: bundle.reference_region,
        })
    }

    /// Length of the vector the artifact consumes before any transform.
    ///
    /// First preprocessor step, else the model's declared length, else the
    /// embedding dimension.
    pub fn expected_input_dim(&self) -> usize {
        self.preprocessor
            .as_ref()
            .map(|p| p.input_len())
            .or_else(|| self.model.input_len())
            .unwrap_or(EMBEDDING_DIM)
    }

    pub fn pca_components(&self) -> Option<usize> {
        self.preprocessor.as_ref().and_then(Preprocessor::pca_components)
    }

    pub fn has_preprocessor(&self) -> bool {
        self.preprocessor.is_some()
    }

    /// `name@digest`, for logs.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.digest)
    }
}

/// Read and validate the artifact at `path`. Called once at startup.
pub fn load_artifact(path: &Path) -> Result<Artifact, ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::NotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let artifact = Artifact::from_slice(path, &bytes)?;
    info!(
        artifact = %artifact.identity(),
        model = artifact.model.kind(),
        has_preprocessor = artifact.has_preprocessor(),
        threshold = artifact.threshold,
        expected_input_dim = artifact.expected_input_dim(),
        "Artifact loaded"
    );
    Ok(artifact)
}
