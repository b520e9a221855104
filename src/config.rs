use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::aggregate::ReconcilePolicy;

/// Application-level constants
pub const APP_NAME: &str = "AnemoDx";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the fitted artifact shipped with the service.
pub const DEFAULT_ARTIFACT_FILE: &str = "hbg_final_model_full_pipeline.json";

/// File name of the truncated ResNet-18 backbone (ONNX, pooled 512-d output).
pub const DEFAULT_BACKBONE_FILE: &str = "resnet18_features.onnx";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

pub const ENV_ARTIFACT: &str = "ANEMODX_ARTIFACT";
pub const ENV_BACKBONE: &str = "ANEMODX_BACKBONE";
pub const ENV_BIND: &str = "ANEMODX_BIND";
pub const ENV_PAD_FEATURES: &str = "ANEMODX_PAD_FEATURES";

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "anemodx_lib=debug,anemodx=debug,tower_http=info,warn"
    } else {
        "anemodx_lib=info,anemodx=info,warn"
    }
}

/// Get the application data directory
/// ~/AnemoDx/ on all platforms, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Directory holding fitted artifacts.
pub fn artifacts_dir() -> PathBuf {
    app_data_dir().join("artifacts")
}

/// Directory holding ONNX backbones.
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid bind address '{value}': {reason}")]
    InvalidBindAddr { value: String, reason: String },

    #[error("Invalid value '{value}' for {key} (expected true/false)")]
    InvalidFlag { key: &'static str, value: String },
}

/// Process configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub artifact_path: PathBuf,
    /// Explicitly configured backbone. `None` means "use the default if present".
    pub backbone_path: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    pub reconcile: ReconcilePolicy,
}

impl ServiceConfig {
    /// Resolve configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary key lookup (tests inject a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let artifact_path = lookup(ENV_ARTIFACT)
            .map(PathBuf::from)
            .unwrap_or_else(|| artifacts_dir().join(DEFAULT_ARTIFACT_FILE));

        let backbone_path = lookup(ENV_BACKBONE).map(PathBuf::from);

        let bind_raw = lookup(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidBindAddr {
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        let reconcile = match lookup(ENV_PAD_FEATURES) {
            None => ReconcilePolicy::PadWithZeros,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => ReconcilePolicy::PadWithZeros,
                "0" | "false" | "no" => ReconcilePolicy::Reject,
                _ => {
                    return Err(ConfigError::InvalidFlag {
                        key: ENV_PAD_FEATURES,
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            artifact_path,
            backbone_path,
            bind_addr,
            reconcile,
        })
    }

    /// Backbone path to try: the configured one, else the default if it exists.
    pub fn resolved_backbone(&self) -> Option<PathBuf> {
        if let Some(path) = &self.backbone_path {
            return Some(path.clone());
        }
        let default = models_dir().join(DEFAULT_BACKBONE_FILE);
        default.exists().then_some(default)
    }
}
