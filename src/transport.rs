//! Request/response primitive between the controller and the heater.
//!
//! The controller only needs "send this named command, give me the body
//! back". [`HttpTransport`] does that against a real device; the in-process
//! [`crate::simulator::SimulatedTransport`] does it for tests.

use crate::error::DeviceError;
use crate::protocol::DeviceCommand;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Issue `command` and return the raw response body.
    async fn request(&self, command: &DeviceCommand) -> Result<String, DeviceError>;
}

#[async_trait]
impl<T: DeviceTransport + ?Sized> DeviceTransport for std::sync::Arc<T> {
    async fn request(&self, command: &DeviceCommand) -> Result<String, DeviceError> {
        (**self).request(command).await
    }
}

/// Plain HTTP GET against `http://<host><command path>`, no authentication.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(host: &str, timeout: Duration) -> Self {
        let host = host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();

        Self { base_url, agent }
    }

    pub fn url_for(&self, command: &DeviceCommand) -> String {
        format!("{}{}", self.base_url, command.path())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeviceTransport for HttpTransport {
    async fn request(&self, command: &DeviceCommand) -> Result<String, DeviceError> {
        let url = self.url_for(command);
        let agent = self.agent.clone();
        debug!("GET {}", url);

        // ureq is blocking; keep it off the async workers.
        let result = tokio::task::spawn_blocking(move || match agent.get(&url).call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| DeviceError::Transport(format!("failed to read body from {url}: {e}"))),
            Err(ureq::Error::Status(status, _)) => {
                Err(DeviceError::Transport(format!("{url} answered with HTTP {status}")))
            }
            Err(e) => Err(DeviceError::Transport(format!("{url}: {e}"))),
        })
        .await;

        match result {
            Ok(body) => body,
            Err(e) => Err(DeviceError::Transport(format!("request task failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let transport = HttpTransport::new("192.168.0.20/", Duration::from_secs(1));
        assert_eq!(transport.url_for(&DeviceCommand::ReadState), "http://192.168.0.20/tela_");

        let transport = HttpTransport::new("http://heater.local", Duration::from_secs(1));
        assert_eq!(
            transport.url_for(&DeviceCommand::SetPriority(None)),
            "http://heater.local/ip:null:pri"
        );
    }
}
