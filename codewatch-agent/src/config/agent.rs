//! Static agent configuration supplied by the host process.

use std::path::PathBuf;
use std::time::Duration;

use codebase_fingerprint::FingerprintConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scheduler::SchedulerConfig;
use crate::{Error, Result};

/// Prefix of every environment variable read by [`AgentConfig::from_env`].
pub const ENV_PREFIX: &str = "CODEWATCH_";

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
const DEFAULT_VISIBILITY: &str = "protected";

/// Static configuration of one agent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Master switch; a disabled agent never starts its scheduler.
    pub enabled: bool,
    /// Base URL of the control plane.
    pub server_url: String,
    /// Credential sent as a bearer token with every request.
    pub license_key: String,
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
    /// Host name reported to the control plane. Resolved lazily when unset.
    pub host_name: Option<String>,
    /// Roots of the monitored code base.
    pub code_base: Vec<PathBuf>,
    /// Inclusion patterns.
    pub packages: Vec<String>,
    /// Exclusion patterns.
    pub exclude_packages: Vec<String>,
    /// Visibility filter for enumerated items.
    pub visibility: String,
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
    /// Base period of the scheduler tick.
    pub tick_period_secs: u64,
    /// Upper bound on waiting for an in-flight tick during shutdown.
    pub shutdown_timeout_secs: u64,
    /// Directory used to stage payload files before upload.
    pub work_dir: PathBuf,
    /// Directory for rolling log files. Console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: DEFAULT_SERVER_URL.to_string(),
            license_key: String::new(),
            app_name: String::new(),
            app_version: "unspecified".to_string(),
            environment: "default".to_string(),
            host_name: None,
            code_base: Vec::new(),
            packages: Vec::new(),
            exclude_packages: Vec::new(),
            visibility: DEFAULT_VISIBILITY.to_string(),
            http_connect_timeout_secs: 10,
            http_request_timeout_secs: 30,
            tick_period_secs: 10,
            shutdown_timeout_secs: 5,
            work_dir: std::env::temp_dir().join("codewatch"),
            log_dir: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from `CODEWATCH_*` environment variables, after
    /// applying a `.env` file when one is present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// `lookup` receives full variable names such as `CODEWATCH_APP_NAME`.
    /// Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("ENABLED") {
            config.enabled = parse_bool("ENABLED", &v)?;
        }
        if let Some(v) = get("SERVER_URL") {
            config.server_url = v;
        }
        if let Some(v) = get("LICENSE_KEY") {
            config.license_key = v;
        }
        if let Some(v) = get("APP_NAME") {
            config.app_name = v;
        }
        if let Some(v) = get("APP_VERSION") {
            config.app_version = v;
        }
        if let Some(v) = get("ENVIRONMENT") {
            config.environment = v;
        }
        config.host_name = get("HOST_NAME");
        if let Some(v) = get("CODE_BASE") {
            config.code_base = split_list(&v).into_iter().map(PathBuf::from).collect();
        }
        if let Some(v) = get("PACKAGES") {
            config.packages = split_list(&v);
        }
        if let Some(v) = get("EXCLUDE_PACKAGES") {
            config.exclude_packages = split_list(&v);
        }
        if let Some(v) = get("VISIBILITY") {
            config.visibility = v;
        }
        if let Some(v) = get("HTTP_CONNECT_TIMEOUT_SECS") {
            config.http_connect_timeout_secs = parse_u64("HTTP_CONNECT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("HTTP_REQUEST_TIMEOUT_SECS") {
            config.http_request_timeout_secs = parse_u64("HTTP_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("TICK_PERIOD_SECS") {
            config.tick_period_secs = parse_u64("TICK_PERIOD_SECS", &v)?;
        }
        if let Some(v) = get("SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout_secs = parse_u64("SHUTDOWN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("WORK_DIR") {
            config.work_dir = PathBuf::from(v);
        }
        config.log_dir = get("LOG_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// Check the configuration for values the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.server_url)
            .map_err(|e| Error::config(format!("Invalid server_url '{}': {}", self.server_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Unsupported server_url scheme '{}'",
                url.scheme()
            )));
        }
        if self.app_name.trim().is_empty() {
            return Err(Error::config("app_name must not be empty"));
        }
        if self.code_base.is_empty() {
            return Err(Error::config("code_base must name at least one path"));
        }
        if self.http_connect_timeout_secs == 0 || self.http_request_timeout_secs == 0 {
            return Err(Error::config("HTTP timeouts must be greater than zero"));
        }
        if self.tick_period_secs == 0 {
            return Err(Error::config("tick_period_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Host name to report, falling back to `$HOSTNAME` and then `localhost`.
    pub fn resolved_host_name(&self) -> String {
        self.host_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| "localhost".to_string())
    }

    pub fn fingerprint_config(&self) -> FingerprintConfig {
        FingerprintConfig::new(
            self.packages.iter().cloned(),
            self.exclude_packages.iter().cloned(),
            self.visibility.clone(),
        )
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_period: Duration::from_secs(self.tick_period_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            ..SchedulerConfig::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout_secs)
    }

    /// `server_url` joined with `path`, without doubled slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::config(format!("{ENV_PREFIX}{name} must be an integer, got '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::config(format!(
            "{ENV_PREFIX}{name} must be true or false, got '{value}'"
        ))),
    }
}
