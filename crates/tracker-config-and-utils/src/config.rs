//! Configuration management for the tracker pipeline.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default collection server.
pub const DEFAULT_SERVER_HOST: &str = "https://collect.tracker.dev";

/// Lower bound for the retention window, in days.
pub const MIN_DATA_VALIDITY_PERIOD_DAYS: u32 = 3;

/// Upper bound for the retention window, in days.
pub const MAX_DATA_VALIDITY_PERIOD_DAYS: u32 = 30;

/// Wire encoding used for delivered batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarshallerKind {
    /// `application/json` envelopes.
    #[default]
    Json,
    /// Compact tagged binary envelopes.
    Binary,
}

impl std::str::FromStr for MarshallerKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "binary" => Ok(Self::Binary),
            other => Err(CoreError::Config(format!("unknown marshaller: {other}"))),
        }
    }
}

/// Main tracker configuration.
///
/// Every field has a default so a partial `config.json` is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Project the collected events belong to.
    pub project_id: String,
    /// Base URL of the collection server.
    pub data_collection_server_host: String,
    /// Seconds between batched sends. `0` sends after every cached event.
    pub data_upload_interval_secs: u64,
    /// Days a stored event is kept before the overdue sweep drops it.
    pub data_validity_period_days: u32,
    /// Number of cached BATCH events that triggers a send.
    pub events_bulk_size: usize,
    /// Events per request.
    pub max_events_per_request: usize,
    /// Events per request while the host reports low memory.
    pub low_memory_events_per_request: usize,
    /// Wire encoding for delivered batches.
    pub marshaller: MarshallerKind,
    /// Gzip request bodies.
    pub compress: bool,
    /// Transport connect timeout.
    pub connect_timeout_secs: u64,
    /// Transport read timeout.
    pub read_timeout_secs: u64,
    /// Transport-level retries for connection errors and 5xx responses.
    pub max_retries: u32,
    /// Delay before the first transport retry; doubles per attempt.
    pub retry_delay_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            project_id: String::new(),
            data_collection_server_host: DEFAULT_SERVER_HOST.to_string(),
            data_upload_interval_secs: 15,
            data_validity_period_days: 7,
            events_bulk_size: 100,
            max_events_per_request: 50,
            low_memory_events_per_request: 3,
            marshaller: MarshallerKind::Json,
            compress: true,
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            max_retries: 2,
            retry_delay_ms: 200,
        }
    }
}

impl TrackerConfig {
    /// Create a new config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrackerConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from `TRACKER_*` environment variables.
    pub fn load_from_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TRACKER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(project_id) = lookup("TRACKER_PROJECT_ID") {
            self.project_id = project_id;
        }
        if let Some(host) = lookup("TRACKER_SERVER_HOST") {
            self.data_collection_server_host = host;
        }
        if let Some(interval) = lookup("TRACKER_UPLOAD_INTERVAL") {
            match interval.parse() {
                Ok(secs) => self.data_upload_interval_secs = secs,
                Err(_) => {
                    tracing::warn!(value = %interval, "ignoring invalid TRACKER_UPLOAD_INTERVAL")
                }
            }
        }
        if let Some(kind) = lookup("TRACKER_MARSHALLER") {
            match kind.parse() {
                Ok(kind) => self.marshaller = kind,
                Err(e) => tracing::warn!(error = %e, "ignoring invalid TRACKER_MARSHALLER"),
            }
        }
    }

    /// Check the settings the pipeline cannot run without.
    pub fn validate(&self) -> CoreResult<()> {
        if self.project_id.trim().is_empty() {
            return Err(CoreError::Config("project_id is required".to_string()));
        }
        self.server_url()?;
        if self.max_events_per_request == 0 || self.low_memory_events_per_request == 0 {
            return Err(CoreError::Config(
                "events per request must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the collection server as a parsed URL.
    pub fn server_url(&self) -> CoreResult<Url> {
        Url::parse(&self.data_collection_server_host).map_err(CoreError::from)
    }

    /// Retention window in days, clamped to the supported range.
    pub fn data_validity_period_days(&self) -> u32 {
        self.data_validity_period_days.clamp(
            MIN_DATA_VALIDITY_PERIOD_DAYS,
            MAX_DATA_VALIDITY_PERIOD_DAYS,
        )
    }

    /// Interval between batched sends, `None` when sending after every event.
    pub fn upload_interval(&self) -> Option<Duration> {
        (self.data_upload_interval_secs > 0)
            .then(|| Duration::from_secs(self.data_upload_interval_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.data_upload_interval_secs, 15);
        assert_eq!(config.events_bulk_size, 100);
        assert_eq!(config.max_events_per_request, 50);
        assert_eq!(config.marshaller, MarshallerKind::Json);
        assert!(config.compress);
    }

    #[test]
    fn test_config_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{ "project_id": "bc675c65b3b0290e", "marshaller": "binary" }"#,
        )
        .unwrap();

        let config = TrackerConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.project_id, "bc675c65b3b0290e");
        assert_eq!(config.marshaller, MarshallerKind::Binary);
        assert_eq!(config.read_timeout_secs, 10);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = TrackerConfig {
            project_id: "demo".to_string(),
            data_upload_interval_secs: 0,
            ..Default::default()
        };
        config.save(&paths).unwrap();

        let loaded = TrackerConfig::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.project_id, "demo");
        assert_eq!(loaded.data_upload_interval_secs, 0);
        assert!(loaded.upload_interval().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TRACKER_PROJECT_ID", "from-env"),
            ("TRACKER_UPLOAD_INTERVAL", "30"),
            ("TRACKER_MARSHALLER", "nope"),
        ]);

        let mut config = TrackerConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.project_id, "from-env");
        assert_eq!(config.data_upload_interval_secs, 30);
        assert_eq!(config.marshaller, MarshallerKind::Json);
    }

    #[test]
    fn test_validity_period_is_clamped() {
        let mut config = TrackerConfig::default();
        config.data_validity_period_days = 1;
        assert_eq!(config.data_validity_period_days(), 3);
        config.data_validity_period_days = 90;
        assert_eq!(config.data_validity_period_days(), 30);
        config.data_validity_period_days = 7;
        assert_eq!(config.data_validity_period_days(), 7);
    }

    #[test]
    fn test_validate() {
        let mut config = TrackerConfig::default();
        assert!(config.validate().is_err());

        config.project_id = "demo".to_string();
        assert!(config.validate().is_ok());

        config.data_collection_server_host = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
