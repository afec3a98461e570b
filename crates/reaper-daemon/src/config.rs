//! Configuration for reaper-daemon

use crate::error::{DaemonError, DaemonResult};
use reaper_types::TTL_ANNOTATION;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Controller configuration
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Namespace scoping
    #[serde(default)]
    pub namespaces: NamespaceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Annotation holding the resource TTL
    #[serde(default = "default_ttl_annotation")]
    pub ttl_annotation: String,

    /// Extra random delay added to TTL requeues, as a fraction of the delay
    #[serde(default = "default_requeue_jitter")]
    pub requeue_jitter: f64,

    /// First retry delay after a failed reconciliation, in milliseconds
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Retry delay cap, in seconds; also used for malformed TTLs
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Deadline for each store call, in seconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            ttl_annotation: default_ttl_annotation(),
            requeue_jitter: default_requeue_jitter(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
            store_timeout_secs: default_store_timeout(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ControllerConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Namespace scoping, mirroring how an operator is installed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace the reaper itself runs in
    #[serde(default)]
    pub operator_namespace: String,

    /// Comma-separated namespaces to watch; empty means all
    #[serde(default)]
    pub target_namespaces: String,
}

impl NamespaceConfig {
    pub fn target_namespace_list(&self) -> Vec<String> {
        self.target_namespaces
            .split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_ttl_annotation() -> String {
    TTL_ANNOTATION.to_string()
}

fn default_requeue_jitter() -> f64 {
    0.1
}

fn default_base_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    1000
}

fn default_store_timeout() -> u64 {
    30
}

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, then `REAPER__*` env vars
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // e.g. REAPER__CONTROLLER__STORE_TIMEOUT_SECS=10
        builder = builder.add_source(
            config::Environment::with_prefix("REAPER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> DaemonResult<()> {
        let controller = &self.controller;
        if controller.workers == 0 {
            return Err(DaemonError::Config("controller.workers must be at least 1".into()));
        }
        if controller.ttl_annotation.trim().is_empty() {
            return Err(DaemonError::Config(
                "controller.ttl_annotation must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&controller.requeue_jitter) {
            return Err(DaemonError::Config(format!(
                "controller.requeue_jitter must be within [0, 1], got {}",
                controller.requeue_jitter
            )));
        }
        if controller.store_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "controller.store_timeout_secs must be positive".into(),
            ));
        }
        if controller.max_backoff() < controller.base_backoff() {
            return Err(DaemonError::Config(
                "controller.max_backoff_secs must not be below base_backoff_ms".into(),
            ));
        }
        if controller.event_buffer == 0 {
            return Err(DaemonError::Config(
                "controller.event_buffer must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.controller.ttl_annotation, TTL_ANNOTATION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_controller_durations() {
        let config = ControllerConfig::default();
        assert_eq!(config.base_backoff(), Duration::from_millis(5));
        assert_eq!(config.max_backoff(), Duration::from_secs(1000));
        assert_eq!(config.store_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_target_namespace_list() {
        let config = NamespaceConfig {
            operator_namespace: "reaper".to_string(),
            target_namespaces: " apps, ,jobs ".to_string(),
        };
        assert_eq!(config.target_namespace_list(), vec!["apps", "jobs"]);
        assert!(NamespaceConfig::default().target_namespace_list().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DaemonConfig::default();
        config.controller.requeue_jitter = 1.5;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.controller.workers = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.controller.ttl_annotation = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.controller.workers, 4);
    }
}
