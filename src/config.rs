//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PowermonError, Result};
use crate::link::{DhcpPolicy, IfConfig, MacAddress};
use crate::sampler::LoopSettings;
use crate::transport::encoding::Encoding;
use crate::transport::EndpointConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub sink: SinkConfig,
    pub device: DeviceConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Behaviour when DHCP does not produce an address
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DhcpFailureMode {
    /// Apply the static configuration and carry on
    #[default]
    Fallback,
    /// Keep requesting a lease, never use the static configuration
    Retry,
}

/// Network interface configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_dhcp_enabled")]
    pub dhcp_enabled: bool,

    #[serde(default = "default_interface")]
    pub interface: String,

    pub mac: MacAddress,
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,

    #[serde(default)]
    pub dhcp_failure_policy: DhcpFailureMode,

    #[serde(default = "default_dhcp_retry_backoff_ms")]
    pub dhcp_retry_backoff_ms: u64,

    #[serde(default = "default_dhcp_timeout_ms")]
    pub dhcp_timeout_ms: u64,

    #[serde(default = "default_reset_hold_ms")]
    pub reset_hold_ms: u64,

    #[serde(default)]
    pub reset_gpio: Option<u32>,

    /// DHCP client run for each lease request; empty leaves DHCP to the OS
    #[serde(default = "default_dhcp_client")]
    pub dhcp_client: String,
}

/// Telemetry sink configuration
#[derive(Deserialize, Clone)]
pub struct SinkConfig {
    pub url: String,

    #[serde(default)]
    pub encoding: Encoding,

    #[serde(default = "default_measurement")]
    pub measurement: String,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,

    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("url", &self.url)
            .field("encoding", &self.encoding)
            .field("measurement", &self.measurement)
            .field("auth_scheme", &self.auth_scheme)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Device identity used as tags
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub device_id: String,

    #[serde(default)]
    pub location: String,
}

/// Power sensor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_hwmon_name")]
    pub hwmon_name: String,

    #[serde(default)]
    pub hwmon_path: Option<PathBuf>,
}

/// Sampling loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_timestamps")]
    pub timestamps: bool,

    #[serde(default = "default_rebring_up_after")]
    pub rebring_up_after: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<PathBuf>,
}

// Default value functions
fn default_dhcp_enabled() -> bool { true }
fn default_interface() -> String { "eth0".to_string() }
fn default_dhcp_retry_backoff_ms() -> u64 { 5000 }
fn default_dhcp_timeout_ms() -> u64 { 10000 }
fn default_dhcp_client() -> String { "udhcpc".to_string() }
fn default_reset_hold_ms() -> u64 { 1000 }

fn default_measurement() -> String { "power_data".to_string() }
fn default_auth_scheme() -> String { "Bearer".to_string() }
fn default_sink_timeout_ms() -> u64 { 20000 }

fn default_hwmon_name() -> String { "ina260".to_string() }

fn default_period_ms() -> u64 { 10000 }
fn default_timestamps() -> bool { true }
fn default_rebring_up_after() -> u32 { 3 }

fn default_log_level() -> String { "info".to_string() }

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            hwmon_name: default_hwmon_name(),
            hwmon_path: None,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            timestamps: default_timestamps(),
            rebring_up_after: default_rebring_up_after(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl NetworkConfig {
    /// Static interface configuration from the config file
    pub fn static_ifconfig(&self) -> IfConfig {
        IfConfig {
            ip: self.ip,
            subnet_mask: self.subnet,
            gateway: self.gateway,
            dns: self.dns,
        }
    }

    pub fn dhcp_policy(&self) -> DhcpPolicy {
        match self.dhcp_failure_policy {
            DhcpFailureMode::Fallback => DhcpPolicy::FallbackToStatic,
            DhcpFailureMode::Retry => DhcpPolicy::RetryForever {
                backoff: Duration::from_millis(self.dhcp_retry_backoff_ms),
            },
        }
    }

    pub fn dhcp_timeout(&self) -> Duration {
        Duration::from_millis(self.dhcp_timeout_ms)
    }

    pub fn reset_hold(&self) -> Duration {
        Duration::from_millis(self.reset_hold_ms)
    }

    /// Whether the static fields can end up on the interface
    fn uses_static(&self) -> bool {
        !self.dhcp_enabled || self.dhcp_failure_policy == DhcpFailureMode::Fallback
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use powermon::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Endpoint for the telemetry transport
    ///
    /// An empty `auth_token` counts as no token.
    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            url: self.sink.url.clone(),
            auth_token: self.sink.auth_token.clone().filter(|t| !t.is_empty()),
            auth_scheme: self.sink.auth_scheme.clone(),
            device_id: self.device.device_id.clone(),
            location: self.device.location.clone(),
            measurement: self.sink.measurement.clone(),
            encoding: self.sink.encoding,
            timeout: Duration::from_millis(self.sink.timeout_ms),
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            period: Duration::from_millis(self.sampling.period_ms),
            timestamps: self.sampling.timestamps,
            rebring_up_after: self.sampling.rebring_up_after,
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate network configuration
        if self.network.interface.is_empty() {
            return Err(invalid("network interface cannot be empty"));
        }

        if self.network.reset_hold_ms < 1000 || self.network.reset_hold_ms > 10000 {
            return Err(invalid("reset_hold_ms must be between 1000 and 10000"));
        }

        if self.network.dhcp_timeout_ms == 0 || self.network.dhcp_timeout_ms > 60000 {
            return Err(invalid("dhcp_timeout_ms must be between 1 and 60000"));
        }

        if self.network.dhcp_retry_backoff_ms == 0 || self.network.dhcp_retry_backoff_ms > 300000 {
            return Err(invalid("dhcp_retry_backoff_ms must be between 1 and 300000"));
        }

        if self.network.uses_static() {
            for (name, addr) in [
                ("ip", self.network.ip),
                ("subnet", self.network.subnet),
                ("gateway", self.network.gateway),
            ] {
                if addr.is_unspecified() {
                    return Err(invalid(format!(
                        "network {} must be set when static addressing can be used",
                        name
                    )));
                }
            }
        }

        // Validate sink configuration
        let url = reqwest::Url::parse(&self.sink.url)
            .map_err(|e| invalid(format!("sink url {:?} is invalid: {}", self.sink.url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid("sink url must use http or https"));
        }

        if self.sink.measurement.is_empty() {
            return Err(invalid("measurement cannot be empty"));
        }

        if self.sink.auth_scheme.is_empty() || self.sink.auth_scheme.contains(char::is_whitespace) {
            return Err(invalid("auth_scheme must be a single non-empty word"));
        }

        if self.sink.timeout_ms == 0 || self.sink.timeout_ms > 20000 {
            return Err(invalid("sink timeout_ms must be between 1 and 20000"));
        }

        // Validate device identity
        if self.device.device_id.is_empty() {
            return Err(invalid("device_id cannot be empty"));
        }

        // Validate sensor configuration
        if self.sensor.hwmon_path.is_none() && self.sensor.hwmon_name.is_empty() {
            return Err(invalid("either hwmon_path or hwmon_name must be set"));
        }

        // Validate sampling configuration
        if self.sampling.period_ms < 100 || self.sampling.period_ms > 3_600_000 {
            return Err(invalid("period_ms must be between 100 and 3600000"));
        }

        // Validate log level
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(msg: T) -> PowermonError {
    PowermonError::Config(toml::de::Error::custom(msg))
}

#[cfg(test)]
impl NetworkConfig {
    /// Valid network section with a 192.168.1.100/24 static fallback
    pub(crate) fn for_tests(dhcp_enabled: bool) -> Self {
        Self {
            dhcp_enabled,
            interface: default_interface(),
            mac: MacAddress([0xde, 0xad, 0xbe, 0xef, 0xfe, 0xed]),
            ip: Ipv4Addr::new(192, 168, 1, 100),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns: Ipv4Addr::new(8, 8, 8, 8),
            dhcp_failure_policy: DhcpFailureMode::Fallback,
            dhcp_retry_backoff_ms: default_dhcp_retry_backoff_ms(),
            dhcp_timeout_ms: default_dhcp_timeout_ms(),
            reset_hold_ms: default_reset_hold_ms(),
            reset_gpio: None,
            dhcp_client: String::new(),
        }
    }
}
