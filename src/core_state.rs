//! Process-wide service state, built once at startup.
//!
//! `CoreState` owns the loaded artifact and the analysis pipeline. It is
//! wrapped in `Arc` and shared read-only by every request handler, so no
//! request can observe a partially loaded model.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigError, ServiceConfig};
use crate::model::{load_artifact, Artifact, ArtifactError};
use crate::pipeline::aggregate::ReconcilePolicy;
use crate::pipeline::analyzer::Analyzer;
use crate::pipeline::embedding::{ImageEmbedder, ReferenceEmbedder};
use crate::pipeline::strategy::FeatureStrategy;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Anything that stops the service from starting. Always fatal.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Backbone error: {0}")]
    Backbone(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    analyzer: Analyzer,
    /// Identifies this process in logs and `/health`.
    pub instance_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl CoreState {
    /// Assemble state from an already-loaded artifact and backbone.
    pub fn new(
        artifact: Artifact,
        embedder: Arc<dyn ImageEmbedder>,
        reconcile: ReconcilePolicy,
    ) -> Self {
        let strategy = FeatureStrategy::resolve(&artifact);
        Self::assemble(artifact, strategy, embedder, reconcile)
    }

    fn assemble(
        artifact: Artifact,
        strategy: FeatureStrategy,
        embedder: Arc<dyn ImageEmbedder>,
        reconcile: ReconcilePolicy,
    ) -> Self {
        Self {
            analyzer: Analyzer::with_strategy(Arc::new(artifact), strategy, embedder, reconcile),
            instance_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Load artifact and backbone as configured. Errors are fatal.
    ///
    /// The strategy is resolved first: an embedding artifact cannot be
    /// served without a real backbone.
    pub fn load(config: &ServiceConfig) -> Result<Self, StartupError> {
        let artifact = load_artifact(&config.artifact_path)?;
        let strategy = FeatureStrategy::resolve(&artifact);
        let embedder = load_embedder(config, strategy)?;
        Ok(Self::assemble(artifact, strategy, embedder, config.reconcile))
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn artifact(&self) -> &Artifact {
        self.analyzer.artifact()
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// Pick the embedding backbone for `strategy`.
///
/// Colour-ratio artifacts never embed, so no backbone is opened for them.
/// Embedding artifacts need the configured backbone, or the default model
/// file when none is configured.
fn load_embedder(
    config: &ServiceConfig,
    strategy: FeatureStrategy,
) -> Result<Arc<dyn ImageEmbedder>, StartupError> {
    if !strategy.needs_backbone() {
        if let Some(path) = &config.backbone_path {
            tracing::warn!(
                path = %path.display(),
                strategy = %strategy,
                "Backbone configured but unused by this artifact"
            );
        }
        return Ok(Arc::new(ReferenceEmbedder::new()));
    }

    let path = config.resolved_backbone().ok_or_else(|| {
        StartupError::Backbone(format!(
            "artifact expects embeddings but no backbone was found; set {} or install {}",
            crate::config::ENV_BACKBONE,
            crate::config::models_dir()
                .join(crate::config::DEFAULT_BACKBONE_FILE)
                .display()
        ))
    })?;
    open_backbone(&path)
}

#[cfg(feature = "onnx-backbone")]
fn open_backbone(path: &Path) -> Result<Arc<dyn ImageEmbedder>, StartupError> {
    use crate::pipeline::embedding::OnnxBackbone;

    let backbone = OnnxBackbone::load(path).map_err(|e| StartupError::Backbone(e.to_string()))?;
    Ok(Arc::new(backbone))
}

#[cfg(not(feature = "onnx-backbone"))]
fn open_backbone(path: &Path) -> Result<Arc<dyn ImageEmbedder>, StartupError> {
    Err(StartupError::Backbone(format!(
        "{} needs ONNX Runtime but this build lacks the `onnx-backbone` feature",
        path.display()
    )))
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
