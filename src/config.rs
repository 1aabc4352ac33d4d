//! Configuration management for Solarizer
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.
//! The environment variables keep the names used by the container deployment
//! (`SOLAR_WEB_*`, `INFLUX_*`, `API_TOKENS`).

use crate::error::{Result, SolarizerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SOLARIZER_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Solar.web account and transport settings
    pub solarweb: SolarWebConfig,

    /// Circuit breaker thresholds for Solar.web calls
    pub breaker: BreakerConfig,

    /// Polling cadences
    pub schedule: ScheduleConfig,

    /// InfluxDB v2 sink; empty url means log-only
    pub influx: InfluxConfig,

    /// API facade binding and tokens
    pub web: WebConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Solar.web connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarWebConfig {
    /// PV system identifier used in every endpoint query
    pub pv_system_id: String,

    /// Base URL of the dashboard
    pub base_url: String,

    /// Name of the session cookie
    pub cookie_name: String,

    /// Explicit session token; replaces the persisted one at startup
    #[serde(skip_serializing)]
    pub auth_cookie: Option<String>,

    /// Durable copy of the session token
    pub auth_cookie_file: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Browser identity sent with every request
    pub user_agent: String,
}

/// Failure-rate circuit breaker parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Minimum completed calls in the current window before the breaker may trip
    pub min_requests: u32,

    /// Failure ratio (failures / requests) at which the breaker trips
    pub failure_ratio: f64,

    /// Time spent open before trial calls are allowed
    pub cooldown_secs: u64,

    /// Number of trial calls admitted while half-open
    pub half_open_max_requests: u32,
}

/// Polling cadences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Power snapshot interval
    pub fast_interval_secs: u64,

    /// Earnings and grid balance interval
    pub slow_interval_secs: u64,
}

/// InfluxDB v2 write target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,

    #[serde(skip_serializing)]
    pub token: String,

    pub org: String,

    pub bucket: String,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Bearer tokens accepted by the API
    #[serde(skip_serializing)]
    pub api_tokens: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Directory or file path for the rolling log; console only when unset
    pub file: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl InfluxConfig {
    /// True when a write target is configured
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

impl Default for SolarWebConfig {
    fn default() -> Self {
        Self {
            pv_system_id: String::new(),
            base_url: "https://www.solarweb.com".to_string(),
            cookie_name: ".AspNet.Auth".to_string(),
            auth_cookie: None,
            auth_cookie_file: "/tmp/solarizer/authcookie".to_string(),
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 3,
            failure_ratio: 0.6,
            cooldown_secs: 60,
            half_open_max_requests: 1,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fast_interval_secs: 15,
            slow_interval_secs: 300,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_tokens: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: None,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first file found, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => {
                let default_paths = ["solarizer.yaml", "/etc/solarizer/config.yaml"];
                match default_paths.iter().find(|p| Path::new(p).exists()) {
                    Some(path) => Self::from_file(path)?,
                    None => Config::default(),
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup; empty values are ignored
    /// except for the auth cookie
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SOLAR_WEB_PV_SYSTEM_ID") {
            self.solarweb.pv_system_id = v.trim().to_string();
        }
        // Set-but-empty is kept: it clears the stored session at startup
        if let Some(v) = lookup("SOLAR_WEB_AUTH_COOKIE") {
            self.solarweb.auth_cookie = Some(v.trim().to_string());
        }
        if let Some(v) = get("SOLAR_WEB_AUTH_COOKIE_FILE") {
            self.solarweb.auth_cookie_file = v;
        }
        if let Some(v) = get("INFLUX_URL") {
            self.influx.url = v;
        }
        if let Some(v) = get("INFLUX_TOKEN") {
            self.influx.token = v;
        }
        if let Some(v) = get("INFLUX_ORG") {
            self.influx.org = v;
        }
        if let Some(v) = get("INFLUX_BUCKET") {
            self.influx.bucket = v;
        }
        if let Some(v) = get("API_TOKENS") {
            self.web.api_tokens = v
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(v) = get("SOLARIZER_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.solarweb.pv_system_id.trim().is_empty() {
            return Err(SolarizerError::validation(
                "solarweb.pv_system_id",
                "PV system id cannot be empty",
            ));
        }

        if reqwest::Url::parse(&self.solarweb.base_url).is_err() {
            return Err(SolarizerError::validation(
                "solarweb.base_url",
                "Must be an absolute URL",
            ));
        }

        if self.solarweb.timeout_secs == 0 {
            return Err(SolarizerError::validation(
                "solarweb.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.breaker.min_requests == 0 {
            return Err(SolarizerError::validation(
                "breaker.min_requests",
                "Must be greater than 0",
            ));
        }

        if !(self.breaker.failure_ratio > 0.0 && self.breaker.failure_ratio <= 1.0) {
            return Err(SolarizerError::validation(
                "breaker.failure_ratio",
                "Must be within (0, 1]",
            ));
        }

        if self.breaker.half_open_max_requests == 0 {
            return Err(SolarizerError::validation(
                "breaker.half_open_max_requests",
                "Must be greater than 0",
            ));
        }

        if self.schedule.fast_interval_secs == 0 || self.schedule.slow_interval_secs == 0 {
            return Err(SolarizerError::validation(
                "schedule",
                "Intervals must be greater than 0",
            ));
        }

        if self.web.api_tokens.is_empty() {
            return Err(SolarizerError::validation(
                "web.api_tokens",
                "At least one API token is required",
            ));
        }

        if self.influx.is_enabled()
            && (self.influx.token.is_empty()
                || self.influx.org.is_empty()
                || self.influx.bucket.is_empty())
        {
            return Err(SolarizerError::validation(
                "influx",
                "token, org and bucket are required when url is set",
            ));
        }

        Ok(())
    }
}
