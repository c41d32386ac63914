//! Request deadline and the telemetry read paths.

use crate::error::DeviceError;
use crate::protocol::{self, ConsumptionSnapshot, DeviceCommand, DeviceParameters, DeviceState};
use crate::transport::DeviceTransport;
use std::time::Duration;
use tracing::debug;

/// A transport plus the per-request deadline, and the telemetry read paths
/// that go straight to the decoder.
#[derive(Debug)]
pub struct DeviceClient<T> {
    transport: T,
    request_timeout: Duration,
}

impl<T: DeviceTransport> DeviceClient<T> {
    pub fn new(transport: T, request_timeout: Duration) -> Self {
        Self {
            transport,
            request_timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one command. A request that outlives the deadline is a
    /// [`DeviceError::Timeout`].
    pub async fn send(&self, command: &DeviceCommand) -> Result<String, DeviceError> {
        match tokio::time::timeout(self.request_timeout, self.transport.request(command)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Timeout {
                command: command.path(),
                timeout: self.request_timeout,
            }),
        }
    }

    /// Send a command whose response is a primary status string.
    pub async fn send_for_state(&self, command: &DeviceCommand) -> Result<DeviceState, DeviceError> {
        let body = self.send(command).await?;
        protocol::decode_state(&body)
    }

    pub async fn get_state(&self) -> Result<DeviceState, DeviceError> {
        debug!("fetching heater state");
        self.send_for_state(&DeviceCommand::ReadState).await
    }

    pub async fn get_parameters(&self) -> Result<DeviceParameters, DeviceError> {
        debug!("fetching heater parameters");
        let body = self.send(&DeviceCommand::ReadParameters).await?;
        protocol::decode_parameters(&body)
    }

    pub async fn get_consumption(&self) -> Result<ConsumptionSnapshot, DeviceError> {
        debug!("fetching heater consumption");
        let body = self.send(&DeviceCommand::ReadConsumption).await?;
        protocol::decode_consumption(&body)
    }
}
