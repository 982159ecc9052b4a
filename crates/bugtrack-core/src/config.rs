//! bugtrack-ops.toml configuration parser and environment overrides.
//!
//! Settings come from an optional TOML file first; environment variables are
//! layered on top. The environment is read through a lookup function so the
//! same code path is exercised by tests without touching the process
//! environment.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "bugtrack-ops.toml";

pub const DEFAULT_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ALERT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_RETENTION_COUNT: usize = 7;
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub monitor: MonitorConfig,
    pub backup: BackupConfig,
    pub reporting: ReportingConfig,
}

/// Health monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Probed in this order; alert batches preserve it.
    pub endpoints: Vec<EndpointConfig>,
    pub interval_ms: u64,
    /// Omitting the webhook disables alerting.
    pub webhook_url: Option<String>,
    /// Upper bound on one webhook delivery, connect through response.
    pub alert_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

/// Backup archiver and retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub retention_count: usize,
    pub upload_url: Option<String>,
    pub upload_timeout_ms: u64,
    pub mongodb_uri: Option<String>,
    pub dump_program: String,
    pub restore_program: String,
    pub order: RetentionOrder,
}

/// Which timestamp ranks archives during a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionOrder {
    /// The instant embedded in `backup-<timestamp>.gz`, falling back to the
    /// file's mtime when the name carries no parseable timestamp.
    #[default]
    EmbeddedTimestamp,
    /// Filesystem modification time only.
    ModifiedTime,
}

/// Tags attached to every reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub environment: String,
    pub release: String,
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            interval_ms: DEFAULT_INTERVAL_MS,
            webhook_url: None,
            alert_timeout_ms: DEFAULT_ALERT_TIMEOUT_MS,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            retention_count: DEFAULT_RETENTION_COUNT,
            upload_url: None,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            mongodb_uri: None,
            dump_program: "mongodump".to_string(),
            restore_program: "mongorestore".to_string(),
            order: RetentionOrder::default(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            release: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl OpsConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load the config file (explicit path, else `bugtrack-ops.toml` when it
    /// exists, else defaults) and apply environment overrides from `lookup`.
    pub fn load<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Layer environment variables over the file settings.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(uri) = get("MONGODB_URI") {
            self.backup.mongodb_uri = Some(uri);
        }
        if let Some(dir) = get("BACKUP_DIR") {
            self.backup.dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("BACKUP_RETENTION_DAYS") {
            self.backup.retention_count = parse_retention_count(Some(&raw));
        }
        if let Some(url) = get("BACKUP_UPLOAD_URL") {
            self.backup.upload_url = Some(url);
        }
        if let Some(url) = get("SLACK_WEBHOOK_URL") {
            self.monitor.webhook_url = Some(url);
        }
        if let Some(raw) = get("HEALTH_CHECK_INTERVAL_MS") {
            self.monitor.interval_ms =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "HEALTH_CHECK_INTERVAL_MS".to_string(),
                    reason: format!("expected milliseconds, got {raw:?}"),
                })?;
        }
        if let Some(env) = get("NODE_ENV") {
            self.reporting.environment = env;
        }
        if let Some(release) = get("APP_VERSION") {
            self.reporting.release = release;
        }

        if self.monitor.endpoints.is_empty() {
            self.monitor.endpoints =
                default_endpoints(get("BACKEND_URL").as_deref(), get("FRONTEND_URL").as_deref());
            debug!(
                endpoints = self.monitor.endpoints.len(),
                "derived default endpoint set from environment"
            );
        }
        Ok(())
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_millis(self.alert_timeout_ms)
    }

    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::Invalid {
                key: "monitor.endpoints".to_string(),
                reason: "at least one endpoint is required".to_string(),
            });
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "monitor.interval_ms".to_string(),
                reason: "interval must be greater than zero".to_string(),
            });
        }
        if self.alert_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "monitor.alert_timeout_ms".to_string(),
                reason: "timeout must be greater than zero".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ConfigError::Invalid {
                    key: "monitor.endpoints".to_string(),
                    reason: format!("duplicate endpoint name {:?}", endpoint.name),
                });
            }
            if endpoint.url.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: format!("monitor.endpoints.{}", endpoint.name),
                    reason: "url must not be empty".to_string(),
                });
            }
            if endpoint.timeout_ms == 0 {
                return Err(ConfigError::Invalid {
                    key: format!("monitor.endpoints.{}", endpoint.name),
                    reason: "timeout_ms must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl BackupConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    /// The data-store URI, or `ConfigError::Missing` when unset.
    pub fn require_uri(&self) -> Result<&str, ConfigError> {
        self.mongodb_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(ConfigError::Missing("MONGODB_URI"))
    }
}

/// Parse a retention count.
///
/// Absent or non-numeric input falls back to 7. A numeric value at or below
/// zero keeps zero archives.
pub fn parse_retention_count(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_RETENTION_COUNT;
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n <= 0 => 0,
        Ok(n) => usize::try_from(n).unwrap_or(usize::MAX),
        Err(_) => {
            warn!(value = %raw, default = DEFAULT_RETENTION_COUNT, "invalid retention count, using default");
            DEFAULT_RETENTION_COUNT
        }
    }
}

/// The stock endpoint set: backend health route, frontend root, and a
/// database-backed API route.
fn default_endpoints(backend: Option<&str>, frontend: Option<&str>) -> Vec<EndpointConfig> {
    let mut endpoints = Vec::new();
    let endpoint = |name: &str, url: String| EndpointConfig {
        name: name.to_string(),
        url,
        timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
    };

    let backend = backend.map(|b| b.trim_end_matches('/'));
    if let Some(backend) = backend {
        endpoints.push(endpoint("Backend API", format!("{backend}/health")));
    }
    if let Some(frontend) = frontend {
        endpoints.push(endpoint("Frontend App", frontend.to_string()));
    }
    if let Some(backend) = backend {
        endpoints.push(endpoint("Database", format!("{backend}/api/bugs")));
    }
    endpoints
}
