use std::time::Duration;
use thiserror::Error;

/// Failure talking to, or understanding, the heater.
///
/// Every variant is retried by the convergence loop. Losing priority to
/// another controller is not an error and is reported through
/// [`crate::controller::ConvergenceOutcome`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("malformed {response} response: {reason}")]
    MalformedResponse {
        response: &'static str,
        reason: String,
    },
}

impl DeviceError {
    pub fn malformed(response: &'static str, reason: impl Into<String>) -> Self {
        DeviceError::MalformedResponse {
            response,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
