pub mod api; // HTTP transport: router, endpoints, server lifecycle
pub mod config;
pub mod core_state; // Loaded artifact + analyzer, shared by handlers
pub mod model; // Artifact format, transforms, regressors
pub mod pipeline; // Decode → extract → aggregate → predict

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::core_state::{CoreState, StartupError};

/// Start the service and block until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServiceConfig::from_env()?;
    tracing::info!(
        artifact = %config.artifact_path.display(),
        bind = %config.bind_addr,
        reconcile = ?config.reconcile,
        "Configuration resolved"
    );

    let core = Arc::new(CoreState::load(&config)?);
    tracing::info!(
        instance = %core.instance_id,
        strategy = %core.analyzer().strategy(),
        device = core.analyzer().device(),
        "Service state ready"
    );

    let mut server = api::start_server(core, config.bind_addr).await?;
    let session = &server.session;
    tracing::info!(
        session = %session.session_id,
        addr = %session.server_addr,
        port = session.port,
        started_at = %session.started_at,
        "Accepting requests"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}
