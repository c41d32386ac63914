//! Set-point convergence and the other write paths.
//!
//! The heater has no "set temperature" command. Reaching a target means
//! claiming priority, then issuing single `inc`/`dec` steps and re-reading the
//! reported set point after each one until it matches. Ownership of the
//! device lock can change between any two steps, so the reported holder is
//! checked on every response.
//!
//! All write sequences (convergence, power toggle, buttons) are serialized by
//! one async mutex per controller. Telemetry reads never touch it and stay
//! available while a chain is in flight.

use crate::arbiter::PriorityArbiter;
use crate::client::DeviceClient;
use crate::config::ControllerConfig;
use crate::error::{ConfigError, DeviceError};
use crate::protocol::{ConsumptionSnapshot, DeviceCommand, DeviceParameters, DeviceState};
use crate::temperature::clamp_to_set_point;
use crate::transport::{DeviceTransport, HttpTransport};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Increase,
    Decrease,
}

impl StepDirection {
    pub fn toward(current: u8, target: u8) -> Self {
        if current > target {
            StepDirection::Decrease
        } else {
            StepDirection::Increase
        }
    }

    pub fn command(self) -> DeviceCommand {
        match self {
            StepDirection::Increase => DeviceCommand::Increase,
            StepDirection::Decrease => DeviceCommand::Decrease,
        }
    }
}

/// How a convergence request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    /// The device reports the requested set point.
    Converged { set_point: u8, steps: u32 },
    /// Another controller holds the write lock; nothing further was sent
    /// except releasing our own claim.
    ForeignPriority { holder: IpAddr },
    /// The device moved past the target. The chain stops instead of
    /// reversing.
    Overshot { set_point: u8, target: u8 },
    /// The step budget ran out before the target was reached.
    StepLimitReached { set_point: u8, target: u8 },
    /// Every attempt in the retry budget failed.
    Exhausted { attempts: u32, last_error: DeviceError },
    /// Another write sequence is in flight (only from `try_converge`).
    Busy,
}

impl ConvergenceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConvergenceOutcome::Converged { .. })
    }

    /// The converged set point, `None` for every failure outcome.
    pub fn set_point(&self) -> Option<u8> {
        match self {
            ConvergenceOutcome::Converged { set_point, .. } => Some(*set_point),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerOutcome {
    /// Already in the requested state; no command was sent.
    Unchanged(DeviceState),
    Toggled(DeviceState),
}

impl PowerOutcome {
    pub fn state(&self) -> &DeviceState {
        match self {
            PowerOutcome::Unchanged(state) | PowerOutcome::Toggled(state) => state,
        }
    }
}

/// Progress of one convergence chain, kept across retries.
#[derive(Debug)]
struct Chain {
    target: u8,
    known_current: Option<u8>,
    direction: Option<StepDirection>,
    steps: u32,
    failures: u32,
}

impl Chain {
    fn new(target: u8) -> Self {
        Self {
            target,
            known_current: None,
            direction: None,
            steps: 0,
            failures: 0,
        }
    }
}

pub struct HeaterController<T> {
    client: Arc<DeviceClient<T>>,
    arbiter: PriorityArbiter<T>,
    config: ControllerConfig,
    writer: Mutex<()>,
}

impl HeaterController<HttpTransport> {
    /// Controller for a real device over HTTP.
    pub fn connect(config: ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.device_host, config.request_timeout());
        Ok(Self::new(transport, config))
    }
}

impl<T: DeviceTransport> HeaterController<T> {
    pub fn new(transport: T, config: ControllerConfig) -> Self {
        let client = Arc::new(DeviceClient::new(transport, config.request_timeout()));
        let arbiter = PriorityArbiter::new(Arc::clone(&client), config.controller_ip);
        Self {
            client,
            arbiter,
            config,
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn client(&self) -> &DeviceClient<T> {
        &self.client
    }

    pub fn arbiter(&self) -> &PriorityArbiter<T> {
        &self.arbiter
    }

    /// True while a convergence chain or another write sequence holds the
    /// device. Callers polling telemetry can use it to skip a refresh that
    /// would show intermediate set points.
    pub fn is_busy(&self) -> bool {
        self.writer.try_lock().is_err()
    }

    /// Drive the device set point to `target` °C, waiting for any write
    /// sequence already in flight.
    pub async fn converge(&self, target: f64) -> ConvergenceOutcome {
        let _writer = self.writer.lock().await;
        self.run_chain(target).await
    }

    /// Like [`converge`](Self::converge) but returns
    /// [`ConvergenceOutcome::Busy`] instead of waiting.
    pub async fn try_converge(&self, target: f64) -> ConvergenceOutcome {
        match self.writer.try_lock() {
            Ok(_writer) => self.run_chain(target).await,
            Err(_) => {
                warn!("set point change to {} rejected: controller busy", target);
                ConvergenceOutcome::Busy
            }
        }
    }

    async fn run_chain(&self, requested: f64) -> ConvergenceOutcome {
        let mut chain = Chain::new(clamp_to_set_point(requested));
        info!("converging set point to {}°C (requested {})", chain.target, requested);

        loop {
            match self.advance(&mut chain).await {
                Ok(outcome) => {
                    match &outcome {
                        ConvergenceOutcome::Converged { set_point, steps } => {
                            info!("set point at {}°C after {} steps", set_point, steps);
                        }
                        other => warn!("convergence to {}°C stopped: {:?}", chain.target, other),
                    }
                    return outcome;
                }
                Err(e) if chain.failures < self.config.max_retries => {
                    chain.failures += 1;
                    warn!(
                        "convergence attempt failed: {} (retry {}/{})",
                        e, chain.failures, self.config.max_retries
                    );
                }
                Err(e) => {
                    error!("set temperature error: {}", e);
                    self.arbiter.release().await;
                    return ConvergenceOutcome::Exhausted {
                        attempts: chain.failures + 1,
                        last_error: e,
                    };
                }
            }
        }
    }

    /// One attempt: pick the chain up where it stands and step until a
    /// terminal outcome or the first failure.
    async fn advance(&self, chain: &mut Chain) -> Result<ConvergenceOutcome, DeviceError> {
        let mut current = if let Some(current) = chain.known_current {
            current
        } else {
            let state = self.client.get_state().await?;
            if let Some(holder) = self.arbiter.foreign_holder(&state) {
                warn!("other device has priority: {}", holder);
                return Ok(ConvergenceOutcome::ForeignPriority { holder });
            }
            self.arbiter.claim_priority(true).await;
            chain.known_current = Some(state.target_temperature);
            state.target_temperature
        };

        loop {
            if current == chain.target {
                self.arbiter.release().await;
                return Ok(ConvergenceOutcome::Converged {
                    set_point: current,
                    steps: chain.steps,
                });
            }

            let direction = StepDirection::toward(current, chain.target);
            if chain.direction.is_some_and(|initial| initial != direction) {
                self.arbiter.release().await;
                return Ok(ConvergenceOutcome::Overshot {
                    set_point: current,
                    target: chain.target,
                });
            }
            chain.direction = Some(direction);

            if chain.steps >= self.config.max_steps {
                self.arbiter.release().await;
                return Ok(ConvergenceOutcome::StepLimitReached {
                    set_point: current,
                    target: chain.target,
                });
            }

            let state = self.client.send_for_state(&direction.command()).await?;
            chain.steps += 1;
            chain.failures = 0;
            current = state.target_temperature;
            chain.known_current = Some(current);

            if let Some(holder) = self.arbiter.foreign_holder(&state) {
                warn!("other device took priority: {}", holder);
                self.arbiter.release().await;
                return Ok(ConvergenceOutcome::ForeignPriority { holder });
            }

            if current != chain.target {
                tokio::time::sleep(self.config.step_delay()).await;
            }
        }
    }

    /// Switch the heater on or off. Toggling is the only power command, so
    /// the current state is read first and nothing is sent when it already
    /// matches.
    pub async fn set_power_state(&self, turn_on: bool) -> Result<PowerOutcome, DeviceError> {
        let _writer = self.writer.lock().await;
        let state = self.client.get_state().await?;
        if state.is_powered_on == turn_on {
            return Ok(PowerOutcome::Unchanged(state));
        }

        info!("turning heater {}", if turn_on { "on" } else { "off" });
        let state = self.client.send_for_state(&DeviceCommand::TogglePower).await?;
        Ok(PowerOutcome::Toggled(state))
    }

    /// Send a one-shot button command under momentary priority.
    pub async fn press_button(&self, button: &str) -> Result<DeviceState, DeviceError> {
        let _writer = self.writer.lock().await;
        self.arbiter.claim_priority(true).await;
        let result = self
            .client
            .send_for_state(&DeviceCommand::Button(button.to_string()))
            .await;
        self.arbiter.release().await;
        result
    }

    pub async fn get_state(&self) -> Result<DeviceState, DeviceError> {
        self.client.get_state().await
    }

    pub async fn get_parameters(&self) -> Result<DeviceParameters, DeviceError> {
        self.client.get_parameters().await
    }

    pub async fn get_consumption(&self) -> Result<ConsumptionSnapshot, DeviceError> {
        self.client.get_consumption().await
    }
}

static_assertions::assert_impl_all!(HeaterController<HttpTransport>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_direction() {
        assert_eq!(StepDirection::toward(40, 45), StepDirection::Increase);
        assert_eq!(StepDirection::toward(50, 45), StepDirection::Decrease);
        assert_eq!(StepDirection::Decrease.command(), DeviceCommand::Decrease);
    }

    #[test]
    fn test_outcome_helpers() {
        let done = ConvergenceOutcome::Converged { set_point: 42, steps: 2 };
        assert!(done.is_success());
        assert_eq!(done.set_point(), Some(42));

        let lost = ConvergenceOutcome::ForeignPriority {
            holder: IpAddr::from([10, 0, 0, 9]),
        };
        assert!(!lost.is_success());
        assert_eq!(lost.set_point(), None);
    }
}
