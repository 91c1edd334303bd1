//! TOML-based configuration for the Beacon telemetry pipeline.

use crate::error::{BeaconError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Production collection endpoint.
pub const DEFAULT_EVENTS_BASE_URL: &str = "https://events.mapbox.com";

/// Collection endpoint used when `endpoint.china = true`.
pub const CHINA_EVENTS_BASE_URL: &str = "https://events.mapbox.cn";

/// Top-level configuration file, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    pub telemetry: TelemetryConfig,
}

/// Identity, transport and pipeline tuning for a telemetry controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub access_token: String,
    pub user_agent: String,
    /// Identifies the SDK that embeds the pipeline. Empty is sent as null.
    #[serde(default)]
    pub sdk_identifier: String,
    #[serde(default)]
    pub sdk_version: String,
    /// Host application identifier, prefixed to the User-Agent when set.
    #[serde(default)]
    pub app_identifier: Option<String>,
    /// Value of the `source` attribute on location events.
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_source() -> String {
    "mapbox".into()
}

/// Where batches are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub china: bool,
    #[serde(default)]
    pub staging_url: Option<String>,
    #[serde(default)]
    pub staging_access_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            china: false,
            staging_url: None,
            staging_access_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_EVENTS_BASE_URL.into()
}

fn default_request_timeout() -> u64 {
    30
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Staging URL and token, only when both are present and non-empty.
    pub fn staging(&self) -> Option<(&str, &str)> {
        let url = self.staging_url.as_deref().filter(|s| !s.is_empty())?;
        let token = self
            .staging_access_token
            .as_deref()
            .filter(|s| !s.is_empty())?;
        Some((url, token))
    }
}

/// Bounded event queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

/// Periodic flush timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    #[serde(default = "default_flush_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_flush_period")]
    pub period_secs: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_flush_delay(),
            period_secs: default_flush_period(),
        }
    }
}

/// Upper bound for the flush delay and period: one week.
pub const MAX_FLUSH_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

fn default_flush_delay() -> u64 {
    10
}

fn default_flush_period() -> u64 {
    180
}

impl FlushConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Session token rotation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_rotation_hours")]
    pub rotation_hours: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rotation_hours: default_rotation_hours(),
        }
    }
}

fn default_rotation_hours() -> u32 {
    24
}

/// Exponential backoff used while polling for a runtime permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,
    /// Randomization fraction applied to each delay; 0 disables jitter.
    #[serde(default)]
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval(),
            jitter: 0.0,
        }
    }
}

fn default_initial_interval() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_interval() -> u64 {
    600_000
}

impl TelemetryConfig {
    /// Minimal configuration with every tunable at its default.
    pub fn new(access_token: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_agent: user_agent.into(),
            sdk_identifier: String::new(),
            sdk_version: String::new(),
            app_identifier: None,
            source: default_source(),
            debug_logging: false,
            endpoint: EndpointConfig::default(),
            queue: QueueConfig::default(),
            flush: FlushConfig::default(),
            session: SessionConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }

    /// Validate identity and tuning values.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(BeaconError::Config(
                "telemetry.access_token must not be empty".into(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(BeaconError::Config(
                "telemetry.user_agent must not be empty".into(),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(BeaconError::Config(
                "telemetry.queue.capacity must be at least 1".into(),
            ));
        }

        if self.flush.period_secs == 0 {
            return Err(BeaconError::Config(
                "telemetry.flush.period_secs must be greater than 0".into(),
            ));
        }
        if self.flush.initial_delay_secs > MAX_FLUSH_INTERVAL_SECS
            || self.flush.period_secs > MAX_FLUSH_INTERVAL_SECS
        {
            return Err(BeaconError::Config(format!(
                "telemetry.flush intervals must not exceed {MAX_FLUSH_INTERVAL_SECS} seconds"
            )));
        }

        if !(1..=24).contains(&self.session.rotation_hours) {
            return Err(BeaconError::Config(format!(
                "telemetry.session.rotation_hours must be between 1 and 24, got {}",
                self.session.rotation_hours
            )));
        }

        let backoff = &self.backoff;
        if backoff.initial_interval_ms == 0 {
            return Err(BeaconError::Config(
                "telemetry.backoff.initial_interval_ms must be greater than 0".into(),
            ));
        }
        if backoff.max_interval_ms < backoff.initial_interval_ms {
            return Err(BeaconError::Config(
                "telemetry.backoff.max_interval_ms must not be below initial_interval_ms".into(),
            ));
        }
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(BeaconError::Config(
                "telemetry.backoff.multiplier must be a finite value >= 1.0".into(),
            ));
        }
        if !(0.0..1.0).contains(&backoff.jitter) {
            return Err(BeaconError::Config(
                "telemetry.backoff.jitter must be in [0, 1)".into(),
            ));
        }

        if self.endpoint.request_timeout_secs == 0 {
            return Err(BeaconError::Config(
                "telemetry.endpoint.request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Base URL batches are posted to, after china/staging overrides.
    pub fn events_base_url(&self) -> &str {
        if self.endpoint.china {
            CHINA_EVENTS_BASE_URL
        } else if let Some((url, _)) = self.endpoint.staging() {
            url
        } else {
            &self.endpoint.base_url
        }
    }

    /// Access token matching [`TelemetryConfig::events_base_url`].
    pub fn effective_access_token(&self) -> &str {
        match self.endpoint.staging() {
            Some((_, token)) if !self.endpoint.china => token,
            _ => &self.access_token,
        }
    }

    /// Full User-Agent header, prefixed with the app identifier when present.
    pub fn full_user_agent(&self) -> String {
        match self.app_identifier.as_deref().map(str::trim) {
            Some(app) if !app.is_empty() => {
                let ua = format!("{app} {}", self.user_agent);
                ua.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
            }
            _ => self.user_agent.clone(),
        }
    }
}

impl BeaconConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BeaconError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.telemetry.validate()
    }

    /// Generate a default configuration with a placeholder access token.
    pub fn generate_default() -> Self {
        let mut telemetry = TelemetryConfig::new("pk.replace-me", "MapboxTelemetryAndroid/3.0");
        telemetry.sdk_identifier = "beacon-cli".into();
        telemetry.sdk_version = env!("CARGO_PKG_VERSION").into();
        Self { telemetry }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BeaconError::Serialization(format!("failed to render config: {e}")))
    }
}
