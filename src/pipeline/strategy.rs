//! Feature strategy resolution: which extractor feeds the loaded artifact.
//!
//! An artifact is only meaningful with the extractor it was fitted on. The
//! strategy is resolved once at startup from what the artifact declares,
//! then used unchanged for every request.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use super::color::{ColorExtractor, ReferenceRegion, COLOR_FEATURE_DIM};
use super::embedding::{ImageEmbedder, EMBEDDING_DIM};
use super::{AnalysisError, FeatureVector, RawImage};
use crate::model::{Artifact, FeatureKind};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Per-image feature extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureStrategy {
    /// 512-d backbone embedding of the whole frame.
    Embedding,
    /// 332 nail/reference colour ratios.
    ColorRatios { reference: ReferenceRegion },
}

impl fmt::Display for FeatureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding => write!(f, "embedding"),
            Self::ColorRatios {
                reference: ReferenceRegion::Skin,
            } => write!(f, "color_ratios/skin"),
            Self::ColorRatios {
                reference: ReferenceRegion::WhitePatch,
            } => write!(f, "color_ratios/white_patch"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════

impl FeatureStrategy {
    /// Explicit `feature_kind` wins; otherwise an expected length of 332
    /// selects colour ratios and anything else the embedding.
    pub fn resolve(artifact: &Artifact) -> Self {
        let reference = artifact.reference_region.unwrap_or_default();
        let strategy = match artifact.feature_kind {
            Some(FeatureKind::Embedding) => Self::Embedding,
            Some(FeatureKind::ColorRatios) => Self::ColorRatios { reference },
            None if artifact.expected_input_dim() == COLOR_FEATURE_DIM => {
                Self::ColorRatios { reference }
            }
            None => Self::Embedding,
        };

        let expected = artifact.expected_input_dim();
        if strategy.native_len() != expected {
            warn!(
                strategy = %strategy,
                native_len = strategy.native_len(),
                expected,
                artifact = %artifact.identity(),
                "Extractor output length differs from artifact input length"
            );
        } else {
            info!(strategy = %strategy, expected, "Feature strategy resolved");
        }
        strategy
    }

    /// Length of one per-image vector before reconciliation.
    pub fn native_len(&self) -> usize {
        match self {
            Self::Embedding => EMBEDDING_DIM,
            Self::ColorRatios { .. } => COLOR_FEATURE_DIM,
        }
    }

    /// Whether extraction runs the embedding backbone.
    pub fn needs_backbone(&self) -> bool {
        matches!(self, Self::Embedding)
    }

    /// Extract one image's features with this strategy.
    pub fn extract(
        &self,
        image: &RawImage,
        embedder: &dyn ImageEmbedder,
    ) -> Result<FeatureVector, AnalysisError> {
        match self {
            Self::Embedding => embedder.embed(image),
            Self::ColorRatios { reference } => ColorExtractor::new(*reference).extract(image),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
