//! Configuration for flow RPCs.
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial one is fine.
//!
//! ```toml
//! flow_mod_timeout_ms = 5000
//! barrier_timeout_ms = 5000
//! stats_timeout_ms = 10000
//! fence_batches = true
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Deadlines and batching policy for device calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Per-call deadline for add-flow and remove-flow batches.
    #[serde(default = "default_flow_mod_timeout")]
    pub flow_mod_timeout_ms: u64,

    /// Deadline for stand-alone barriers.
    #[serde(default = "default_barrier_timeout")]
    pub barrier_timeout_ms: u64,

    /// Deadline for statistics reads.
    #[serde(default = "default_stats_timeout")]
    pub stats_timeout_ms: u64,

    /// Flag the last flow-mod per device in a batch as barrier-bearing.
    #[serde(default = "default_fence_batches")]
    pub fence_batches: bool,
}

fn default_flow_mod_timeout() -> u64 {
    5000
}

fn default_barrier_timeout() -> u64 {
    5000
}

fn default_stats_timeout() -> u64 {
    10000
}

fn default_fence_batches() -> bool {
    true
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            flow_mod_timeout_ms: default_flow_mod_timeout(),
            barrier_timeout_ms: default_barrier_timeout(),
            stats_timeout_ms: default_stats_timeout(),
            fence_batches: default_fence_batches(),
        }
    }
}

impl RpcConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).map_err(|e| match e {
                ConfigError::Parse { message, .. } => ConfigError::Parse {
                    path: path.display().to_string(),
                    message,
                },
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parses a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("flow_mod_timeout_ms", self.flow_mod_timeout_ms),
            ("barrier_timeout_ms", self.barrier_timeout_ms),
            ("stats_timeout_ms", self.stats_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }

    pub fn flow_mod_timeout(&self) -> Duration {
        Duration::from_millis(self.flow_mod_timeout_ms)
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_timeout_ms)
    }
}
