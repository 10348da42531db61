//! Configuration management for psegli
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{PsegError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Utility portal account
    pub account: AccountConfig,

    /// Upstream usage API
    pub utility: UtilityConfig,

    /// Cookie acquisition gateway (server side and discovery)
    pub gateway: GatewayConfig,

    /// Statistics store and ingestion policy
    pub statistics: StatisticsConfig,

    /// Background synchronization
    pub sync: SyncConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Utility portal credentials and optional banked cookie
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AccountConfig {
    /// Portal username (email)
    pub username: String,

    /// Portal password
    pub password: String,

    /// Pre-seeded cookie string (`MM_SID=...; __RequestVerificationToken=...`)
    pub cookie: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Upstream usage API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityConfig {
    /// Root URL of the smart-energy portal
    pub url_root: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Default backfill window for manual syncs
    pub days_back: u32,
}

/// Per-step timeouts of the scripted login, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepTimeouts {
    /// Default navigation timeout
    pub navigation_ms: u64,

    /// Waiting for a selector (login button, form fields, submit)
    pub selector_ms: u64,

    /// Waiting for the identity provider login page
    pub login_page_ms: u64,

    /// Waiting for dashboard redirects
    pub dashboard_ms: u64,

    /// Pause after the dashboard loads so background requests can be captured
    pub settle_ms: u64,
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address of the gateway HTTP server
    pub host: String,

    /// TCP port of the gateway HTTP server
    pub port: u16,

    /// JSON file holding manually banked cookies
    pub manual_cookie_file: String,

    /// WebDriver endpoint (chromedriver) used for the scripted login
    pub webdriver_url: String,

    /// Run the browser headless
    pub headless: bool,

    /// Per-step timeouts
    pub timeouts: StepTimeouts,

    /// Candidate base URLs probed in order when locating the gateway
    pub candidates: Vec<String>,

    /// Fixed base URL; when set, discovery is skipped and only this address is checked
    pub fixed_url: Option<String>,

    /// Health probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Timeout of a remote `POST /login` in seconds
    pub login_timeout_secs: u64,

    /// Timeout of a remote `GET /cookies/get` in seconds
    pub manual_cookies_timeout_secs: u64,
}

/// Statistics store and ingestion policy
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Home Assistant base URL
    pub ha_url: String,

    /// Long-lived access token or supervisor token
    pub ha_token: String,

    /// Trailing window searched for the continuity anchor
    pub lookback_days: i64,

    /// Hourly values above this are treated as glitches
    pub implausible_threshold_kwh: f64,

    /// Replacement value for glitches
    pub glitch_cap_kwh: f64,

    /// Zone used for timestamps without an offset
    pub timezone: String,
}

impl std::fmt::Debug for StatisticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsConfig")
            .field("ha_url", &self.ha_url)
            .field("ha_token", &"<redacted>")
            .field("lookback_days", &self.lookback_days)
            .field("implausible_threshold_kwh", &self.implausible_threshold_kwh)
            .field("glitch_cap_kwh", &self.glitch_cap_kwh)
            .field("timezone", &self.timezone)
            .finish()
    }
}

/// Background synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether the scheduler runs
    pub enabled: bool,

    /// Scheduler period in minutes
    pub interval_minutes: u64,

    /// State file holding the refreshed cookie and last sync time
    pub state_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (directory is used for daily rotation)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            url_root: "https://mysmartenergy.nj.pseg.com".to_string(),
            request_timeout_secs: 30,
            days_back: 0,
        }
    }
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            selector_ms: 10_000,
            login_page_ms: 15_000,
            dashboard_ms: 20_000,
            settle_ms: 3_000,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            manual_cookie_file: "/data/manual_cookies.json".to_string(),
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            headless: true,
            timeouts: StepTimeouts::default(),
            candidates: vec![
                "http://172.30.32.1:8000".to_string(),
                "http://homeassistant.local:8000".to_string(),
                "http://localhost:8000".to_string(),
                "http://host.docker.internal:8000".to_string(),
            ],
            fixed_url: None,
            probe_timeout_ms: 3_000,
            login_timeout_secs: 120,
            manual_cookies_timeout_secs: 10,
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            ha_url: "http://homeassistant.local:8123".to_string(),
            ha_token: String::new(),
            lookback_days: 7,
            implausible_threshold_kwh: 1000.0,
            glitch_cap_kwh: 100.0,
            timezone: "America/New_York".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
            state_file: "/data/psegli_state.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/psegli.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl StepTimeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn selector(&self) -> Duration {
        Duration::from_millis(self.selector_ms)
    }

    pub fn login_page(&self) -> Duration {
        Duration::from_millis(self.login_page_ms)
    }

    pub fn dashboard(&self) -> Duration {
        Duration::from_millis(self.dashboard_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations, then apply environment overrides
    pub fn load() -> Result<Self> {
        let default_paths = [
            "psegli_config.yaml",
            "/data/psegli_config.yaml",
            "/etc/psegli/config.yaml",
        ];

        let mut config = Config::default();
        for path in &default_paths {
            if Path::new(path).exists() {
                config = Self::from_file(path)?;
                break;
            }
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path, falling back to the default search
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let mut config = Self::from_file(p)?;
                config.apply_env_overrides();
                Ok(config)
            }
            None => Self::load(),
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Apply `PSEGLI_*` and supervisor environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("PSEGLI_USERNAME") {
            self.account.username = v;
        }
        if let Some(v) = non_empty("PSEGLI_PASSWORD") {
            self.account.password = v;
        }
        if let Some(v) = non_empty("PSEGLI_COOKIE") {
            self.account.cookie = Some(v);
        }
        // Add-on mode: the supervisor proxies core under a fixed URL
        if let Some(v) = non_empty("SUPERVISOR_TOKEN") {
            self.statistics.ha_token = v;
            self.statistics.ha_url = "http://supervisor/core".to_string();
        }
        if let Some(v) = non_empty("PSEGLI_HA_URL") {
            self.statistics.ha_url = v;
        }
        if let Some(v) = non_empty("PSEGLI_HA_TOKEN") {
            self.statistics.ha_token = v;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.utility.url_root.trim().is_empty() {
            return Err(PsegError::validation(
                "utility.url_root",
                "URL cannot be empty",
            ));
        }

        if self.utility.request_timeout_secs == 0 {
            return Err(PsegError::validation(
                "utility.request_timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.gateway.port == 0 {
            return Err(PsegError::validation(
                "gateway.port",
                "Port must be greater than 0",
            ));
        }

        if self.gateway.candidates.is_empty() && self.gateway.fixed_url.is_none() {
            return Err(PsegError::validation(
                "gateway.candidates",
                "At least one candidate or a fixed_url is required",
            ));
        }

        if self.gateway.probe_timeout_ms == 0 {
            return Err(PsegError::validation(
                "gateway.probe_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.statistics.lookback_days <= 0 {
            return Err(PsegError::validation(
                "statistics.lookback_days",
                "Must be positive",
            ));
        }

        if self.statistics.glitch_cap_kwh < 0.0
            || self.statistics.glitch_cap_kwh > self.statistics.implausible_threshold_kwh
        {
            return Err(PsegError::validation(
                "statistics.glitch_cap_kwh",
                "Must be between 0 and implausible_threshold_kwh",
            ));
        }

        if self.statistics.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(PsegError::validation(
                "statistics.timezone",
                "Unknown IANA time zone",
            ));
        }

        if self.sync.interval_minutes == 0 {
            return Err(PsegError::validation(
                "sync.interval_minutes",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Ensure credentials are present for operations that need them
    pub fn require_credentials(&self) -> Result<()> {
        if self.account.username.trim().is_empty() || self.account.password.is_empty() {
            return Err(PsegError::config("No username/password provided"));
        }
        Ok(())
    }
}
