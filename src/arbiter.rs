//! The heater's single-writer priority lock.

use crate::client::DeviceClient;
use crate::protocol::{DeviceCommand, DeviceState};
use crate::transport::DeviceTransport;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Claims and releases the heater's single-writer lock.
///
/// Holds no state of its own: the device is the only source of truth for who
/// currently owns write access.
#[derive(Debug)]
pub struct PriorityArbiter<T> {
    client: Arc<DeviceClient<T>>,
    own_ip: IpAddr,
}

impl<T: DeviceTransport> PriorityArbiter<T> {
    pub fn new(client: Arc<DeviceClient<T>>, own_ip: IpAddr) -> Self {
        Self { client, own_ip }
    }

    pub fn own_ip(&self) -> IpAddr {
        self.own_ip
    }

    /// Name this controller (`true`) or nobody (`false`) as priority holder.
    ///
    /// Returns whether the round trip succeeded. Failures are logged and
    /// swallowed; contention shows up later in decoded state.
    pub async fn claim_priority(&self, want_priority: bool) -> bool {
        let holder = want_priority.then_some(self.own_ip);
        let command = DeviceCommand::SetPriority(holder);
        info!(
            "set priority to {}",
            holder.map_or_else(|| crate::protocol::NO_HOLDER.to_string(), |ip| ip.to_string())
        );

        match self.client.send(&command).await {
            Ok(_) => true,
            Err(e) => {
                warn!("priority request {} failed: {}", command, e);
                false
            }
        }
    }

    pub async fn release(&self) -> bool {
        self.claim_priority(false).await
    }

    /// A holder is foreign when it is present and is not this controller.
    pub fn is_foreign(&self, holder: Option<IpAddr>) -> bool {
        holder.is_some_and(|ip| ip != self.own_ip)
    }

    pub fn foreign_holder(&self, state: &DeviceState) -> Option<IpAddr> {
        state.priority_holder.filter(|ip| *ip != self.own_ip)
    }
}
