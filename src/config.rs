//! Controller settings from JSON or `RINNAI_*` environment variables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

pub const ENV_DEVICE_HOST: &str = "RINNAI_DEVICE_HOST";
pub const ENV_CONTROLLER_IP: &str = "RINNAI_CONTROLLER_IP";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "RINNAI_REQUEST_TIMEOUT_MS";
pub const ENV_STEP_DELAY_MS: &str = "RINNAI_STEP_DELAY_MS";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
const DEFAULT_STEP_DELAY_MS: u64 = 100;
const DEFAULT_MAX_RETRIES: u32 = 5;
// Sixteen set points means fifteen steps end to end; leave room for a device
// that swallows the odd command.
const DEFAULT_MAX_STEPS: u32 = 32;

/// Process configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Host (and optional port) of the heater, e.g. `192.168.0.40`.
    pub device_host: String,
    /// Address of this controller. Used as the priority token and to tell
    /// our own claims apart from another controller's.
    pub controller_ip: IpAddr,
    pub request_timeout_ms: u64,
    /// Settle time between two step commands.
    pub step_delay_ms: u64,
    /// Consecutive failed attempts allowed after the first one.
    pub max_retries: u32,
    /// Upper bound on step commands in one convergence chain.
    pub max_steps: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_host: String::new(),
            controller_ip: IpAddr::from([127, 0, 0, 1]),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl ControllerConfig {
    pub fn new(device_host: impl Into<String>, controller_ip: IpAddr) -> Self {
        Self {
            device_host: device_host.into(),
            controller_ip,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration from `RINNAI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let device_host = lookup(ENV_DEVICE_HOST).ok_or(ConfigError::Missing(ENV_DEVICE_HOST))?;
        let controller_ip = lookup(ENV_CONTROLLER_IP)
            .ok_or(ConfigError::Missing(ENV_CONTROLLER_IP))?
            .trim()
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: ENV_CONTROLLER_IP,
                reason: e.to_string(),
            })?;

        let mut config = Self::new(device_host.trim(), controller_ip);
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout_ms = parse_millis(ENV_REQUEST_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_STEP_DELAY_MS) {
            config.step_delay_ms = parse_millis(ENV_STEP_DELAY_MS, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_host.trim().is_empty() {
            return Err(ConfigError::Missing("device_host"));
        }
        // The device reports the holder as `addr:tag`, so only IPv4 round-trips.
        if self.controller_ip.is_ipv6() {
            return Err(ConfigError::Invalid {
                key: "controller_ip",
                reason: format!("`{}` is not an IPv4 address", self.controller_ip),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid {
                key: "max_steps",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("`{value}` is not a number of milliseconds"),
    })
}
