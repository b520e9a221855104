//! Diagnostics endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::types::{ApiContext, HealthResponse};

/// `GET /health`: loaded artifact and the input it expects.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let analyzer = ctx.core.analyzer();
    let artifact = analyzer.artifact();

    Json(HealthResponse {
        ok: true,
        artifact: artifact.name.clone(),
        artifact_path: artifact.path.display().to_string(),
        artifact_digest: artifact.digest.clone(),
        has_preprocessor: artifact.has_preprocessor(),
        threshold: artifact.threshold,
        device: analyzer.device(),
        strategy: analyzer.strategy().to_string(),
        expected_input_dim: artifact.expected_input_dim(),
        pca_components: artifact.pca_components(),
        version: crate::config::APP_VERSION,
        started_at: ctx.core.started_at.to_rfc3339(),
        uptime_secs: ctx.core.uptime_secs(),
    })
}
