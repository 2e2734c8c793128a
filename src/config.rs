//! Aggregate configuration for every component.
//!
//! Each component owns its own config struct; [`OrchestratorConfig`] nests
//! them so one JSON document can tune the whole service. Every field is
//! optional and falls back to the component default.

use crate::bus::domain::BusConfig;
use crate::limiter::domain::LimiterConfig;
use crate::pipeline::domain::{JobKind, PipelineConfig};
use crate::progress::domain::ProgressConfig;
use crate::scheduler::domain::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: Arc<std::io::Error>,
    },

    /// The document is not valid configuration JSON.
    #[error("malformed configuration: {0}")]
    Parse(Arc<serde_json::Error>),

    /// The values are well-formed but inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(Arc::new(err))
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration of the whole orchestration core.
///
/// # Examples
///
/// ```
/// use assay::config::OrchestratorConfig;
///
/// let config = OrchestratorConfig::from_json_str(r#"{ "limiter": { "messages_per_second": 3 } }"#)
///     .expect("valid configuration");
/// assert_eq!(config.limiter.messages_per_second, 3);
/// assert_eq!(config.limiter.messages_per_minute, 100);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Message bus settings.
    pub bus: BusConfig,
    /// Agent registry settings.
    pub registry: RegistryConfig,
    /// Job queue settings.
    pub pipeline: PipelineConfig,
    /// Progress retention settings.
    pub progress: ProgressConfig,
    /// Connection and rate limits.
    pub limiter: LimiterConfig,
}

impl OrchestratorConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or
    /// [`ConfigError::Invalid`] for inconsistent values.
    pub fn from_json_str(document: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, plus the
    /// errors of [`OrchestratorConfig::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let location = path.as_ref();
        let document = std::fs::read_to_string(location).map_err(|source| ConfigError::Read {
            path: location.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::from_json_str(&document)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated
    /// constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bus.degraded_pending_threshold > self.bus.unhealthy_pending_threshold {
            return Err(ConfigError::Invalid(
                "bus degraded threshold exceeds unhealthy threshold".to_owned(),
            ));
        }
        for kind in JobKind::ALL {
            let settings = self.pipeline.settings(kind);
            if settings.concurrency == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{kind} queue concurrency must be positive"
                )));
            }
            if settings.heartbeat_ms >= settings.lease_ms {
                return Err(ConfigError::Invalid(format!(
                    "{kind} queue heartbeat must be shorter than its lease"
                )));
            }
            if settings.default_options.attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{kind} queue must allow at least one attempt"
                )));
            }
        }
        if self.limiter.max_connections_per_user > self.limiter.max_total_connections {
            return Err(ConfigError::Invalid(
                "per-user connection limit exceeds the global limit".to_owned(),
            ));
        }
        if self.limiter.messages_per_second > self.limiter.messages_per_minute {
            return Err(ConfigError::Invalid(
                "per-second message budget exceeds the per-minute budget".to_owned(),
            ));
        }
        Ok(())
    }
}
