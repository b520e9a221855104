//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::Serialize;

use crate::core_state::CoreState;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Response bodies
// ═══════════════════════════════════════════════════════════

/// `GET /health` body: what is loaded and what it expects.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub artifact: String,
    pub artifact_path: String,
    pub artifact_digest: String,
    pub has_preprocessor: bool,
    pub threshold: f32,
    pub device: &'static str,
    pub strategy: String,
    pub expected_input_dim: usize,
    pub pca_components: Option<usize>,
    pub version: &'static str,
    pub started_at: String,
    pub uptime_secs: i64,
}
