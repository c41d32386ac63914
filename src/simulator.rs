//! Software model of the heater, for tests and for the `heater-sim` binary.
//!
//! [`SimulatedHeater`] answers commands with response strings in the same
//! positional formats the real firmware uses. [`SimulatedTransport`] plugs it
//! into the controller in-process and adds fault injection plus a log of every
//! request issued.

use crate::error::DeviceError;
use crate::protocol::{DeviceCommand, GAS_DIVISOR, NO_HOLDER, POWER_OFF_CODE, WATER_DIVISOR};
use crate::temperature::{clamp_to_set_point, encode_temperature, step_down, step_up};
use crate::transport::DeviceTransport;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const POWER_ON_CODE: &str = "00";
const PARAMETER_FIELD_COUNT: usize = 40;
const NOMINAL_INLET_C: f64 = 21.5;
const NOMINAL_FLOW_LPM: f64 = 8.2;
const BURNER_OUTPUT_KCAL: f64 = 1600.0;
// Device units per second of flow.
const WATER_UNITS_PER_SEC: u64 = 137;
const GAS_UNITS_PER_SEC: u64 = 52;

#[derive(Debug, Clone)]
pub struct SimulatedHeater {
    powered_on: bool,
    set_point: u8,
    priority_holder: Option<IpAddr>,
    priority_tag: u32,
    water_flowing: bool,
    step_size: u8,
    burner_seconds: u64,
    water_units: u64,
    gas_units: u64,
    device_ip: IpAddr,
    mac_address: String,
    wifi_signal_strength: i32,
    last_button: Option<String>,
}

impl SimulatedHeater {
    pub fn new(set_point: u8) -> Self {
        Self {
            powered_on: true,
            set_point: clamp_to_set_point(f64::from(set_point)),
            priority_holder: None,
            priority_tag: 0,
            water_flowing: false,
            step_size: 1,
            burner_seconds: 0,
            water_units: 0,
            gas_units: 0,
            device_ip: IpAddr::from([192, 168, 0, 40]),
            mac_address: "a4:cf:12:5e:77:01".to_string(),
            wifi_signal_strength: -58,
            last_button: None,
        }
    }

    pub fn set_point(&self) -> u8 {
        self.set_point
    }

    pub fn is_powered_on(&self) -> bool {
        self.powered_on
    }

    pub fn is_heating(&self) -> bool {
        self.powered_on && self.water_flowing
    }

    pub fn priority_holder(&self) -> Option<IpAddr> {
        self.priority_holder
    }

    pub fn last_button(&self) -> Option<&str> {
        self.last_button.as_deref()
    }

    pub fn set_set_point(&mut self, celsius: u8) {
        self.set_point = clamp_to_set_point(f64::from(celsius));
    }

    pub fn set_powered_on(&mut self, on: bool) {
        self.powered_on = on;
    }

    pub fn set_water_flowing(&mut self, flowing: bool) {
        self.water_flowing = flowing;
    }

    pub fn set_priority_holder(&mut self, holder: Option<IpAddr>) {
        self.priority_holder = holder;
        self.priority_tag = self.priority_tag.wrapping_add(1);
    }

    /// Set-point positions moved per step command. Values above one model
    /// firmware that skips entries.
    pub fn set_step_size(&mut self, positions: u8) {
        self.step_size = positions.max(1);
    }

    /// Advance the consumption counters by `seconds` of wall time.
    pub fn run_for(&mut self, seconds: u64) {
        if !self.is_heating() {
            return;
        }
        self.burner_seconds += seconds;
        self.water_units += seconds * WATER_UNITS_PER_SEC;
        self.gas_units += seconds * GAS_UNITS_PER_SEC;
    }

    fn may_write(&self, caller: IpAddr) -> bool {
        self.priority_holder.map_or(true, |holder| holder == caller)
    }

    /// Apply `command` as if it came from `caller` and return the body the
    /// firmware would send back.
    pub fn handle(&mut self, command: &DeviceCommand, caller: IpAddr) -> String {
        match command {
            DeviceCommand::SetPriority(Some(ip)) => {
                if self.may_write(caller) {
                    self.set_priority_holder(Some(*ip));
                }
                self.state_response()
            }
            DeviceCommand::SetPriority(None) => {
                if self.may_write(caller) {
                    self.set_priority_holder(None);
                }
                self.state_response()
            }
            DeviceCommand::ReadState => self.state_response(),
            DeviceCommand::ReadParameters => self.parameters_response(),
            DeviceCommand::ReadConsumption => self.consumption_response(),
            DeviceCommand::Increase | DeviceCommand::Decrease | DeviceCommand::TogglePower | DeviceCommand::Button(_)
                if !self.may_write(caller) =>
            {
                debug!("simulated heater ignored {} from {}", command, caller);
                self.state_response()
            }
            DeviceCommand::Increase => {
                for _ in 0..self.step_size {
                    self.set_point = step_up(self.set_point);
                }
                self.state_response()
            }
            DeviceCommand::Decrease => {
                for _ in 0..self.step_size {
                    self.set_point = step_down(self.set_point);
                }
                self.state_response()
            }
            DeviceCommand::TogglePower => {
                self.powered_on = !self.powered_on;
                self.state_response()
            }
            DeviceCommand::Button(name) => {
                self.last_button = Some(name.trim_start_matches('/').to_string());
                self.state_response()
            }
        }
    }

    fn power_code(&self) -> &'static str {
        if self.powered_on {
            POWER_ON_CODE
        } else {
            POWER_OFF_CODE
        }
    }

    fn set_point_code(&self) -> u16 {
        // set_point only ever holds table entries
        encode_temperature(self.set_point).unwrap_or_default()
    }

    fn holder_token(&self) -> String {
        let holder = self
            .priority_holder
            .map_or_else(|| NO_HOLDER.to_string(), |ip| ip.to_string());
        format!("{holder}:{}", self.priority_tag)
    }

    pub fn state_response(&self) -> String {
        format!(
            "{},0,{},0,0,0,{},{},0,0,0,0",
            self.power_code(),
            u8::from(self.is_heating()),
            self.holder_token(),
            self.set_point_code(),
        )
    }

    pub fn parameters_response(&self) -> String {
        let heating = self.is_heating();
        let inlet = NOMINAL_INLET_C;
        let outlet = if heating { f64::from(self.set_point) } else { inlet };
        let flow = if self.water_flowing { NOMINAL_FLOW_LPM } else { 0.0 };
        let power = if heating { BURNER_OUTPUT_KCAL } else { 0.0 };

        let mut fields = vec!["0".to_string(); PARAMETER_FIELD_COUNT];
        fields[0] = self.power_code().to_string();
        fields[4] = self.burner_seconds.to_string();
        fields[9] = format!("{:.0}", power * 100.0);
        fields[10] = format!("{:.0}", inlet * 100.0);
        fields[11] = format!("{:.0}", outlet * 100.0);
        fields[12] = format!("{:.0}", flow * 100.0);
        fields[16] = self.device_ip.to_string();
        fields[18] = self.set_point_code().to_string();
        fields[25] = self.mac_address.clone();
        fields[37] = self.wifi_signal_strength.to_string();
        fields.join(",")
    }

    pub fn consumption_response(&self) -> String {
        format!(
            "{:02}:{:02},{},{}",
            self.burner_seconds / 60,
            self.burner_seconds % 60,
            self.water_units,
            self.gas_units
        )
    }

    pub fn water_m3(&self) -> f64 {
        self.water_units as f64 / WATER_DIVISOR
    }

    pub fn gas_m3(&self) -> f64 {
        self.gas_units as f64 / GAS_DIVISOR
    }
}

impl Default for SimulatedHeater {
    fn default() -> Self {
        Self::new(40)
    }
}

#[derive(Debug, Clone, Default)]
struct FaultPlan {
    fail_next: u32,
    fail_all: bool,
    malformed_next: u32,
    fail_step: Option<u32>,
    takeover: Option<(u32, IpAddr)>,
    latency: Option<Duration>,
}

#[derive(Debug)]
struct SimulationState {
    heater: SimulatedHeater,
    faults: FaultPlan,
    log: Vec<DeviceCommand>,
    steps_received: u32,
    steps_applied: u32,
}

/// In-process transport backed by a [`SimulatedHeater`].
#[derive(Debug)]
pub struct SimulatedTransport {
    caller_ip: IpAddr,
    state: Mutex<SimulationState>,
}

impl SimulatedTransport {
    /// `caller_ip` is the address the simulated device sees for every request.
    pub fn new(heater: SimulatedHeater, caller_ip: IpAddr) -> Self {
        Self {
            caller_ip,
            state: Mutex::new(SimulationState {
                heater,
                faults: FaultPlan::default(),
                log: Vec::new(),
                steps_received: 0,
                steps_applied: 0,
            }),
        }
    }

    /// Every command received so far, including the ones that failed.
    pub async fn commands(&self) -> Vec<DeviceCommand> {
        self.state.lock().await.log.clone()
    }

    pub async fn count(&self, predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.state.lock().await.log.iter().filter(|c| predicate(*c)).count()
    }

    pub async fn clear_log(&self) {
        self.state.lock().await.log.clear();
    }

    pub async fn heater(&self) -> SimulatedHeater {
        self.state.lock().await.heater.clone()
    }

    pub async fn configure(&self, f: impl FnOnce(&mut SimulatedHeater)) {
        f(&mut self.state.lock().await.heater);
    }

    /// Fail the next `n` requests with a transport error.
    pub async fn fail_next(&self, n: u32) {
        self.state.lock().await.faults.fail_next = n;
    }

    pub async fn fail_all(&self, enabled: bool) {
        self.state.lock().await.faults.fail_all = enabled;
    }

    /// Answer the next `n` requests with a body no decoder accepts.
    pub async fn malform_next(&self, n: u32) {
        self.state.lock().await.faults.malformed_next = n;
    }

    /// Drop the `nth` step command (1-based) with a transport error. The
    /// device never sees it.
    pub async fn fail_step(&self, nth: u32) {
        self.state.lock().await.faults.fail_step = Some(nth);
    }

    /// Hand priority to `holder` right after the `steps`-th step command is
    /// applied, as if another controller grabbed the lock.
    pub async fn foreign_takeover_after_steps(&self, steps: u32, holder: IpAddr) {
        self.state.lock().await.faults.takeover = Some((steps, holder));
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.faults.latency = latency;
    }
}

#[async_trait]
impl DeviceTransport for SimulatedTransport {
    async fn request(&self, command: &DeviceCommand) -> Result<String, DeviceError> {
        let latency = {
            let mut state = self.state.lock().await;
            state.log.push(command.clone());
            state.faults.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if state.faults.fail_all {
            return Err(DeviceError::Transport("simulated link down".into()));
        }
        if state.faults.fail_next > 0 {
            state.faults.fail_next -= 1;
            return Err(DeviceError::Transport("simulated request failure".into()));
        }
        if state.faults.malformed_next > 0 {
            state.faults.malformed_next -= 1;
            return Ok("ERR".to_string());
        }
        if command.is_step() {
            state.steps_received += 1;
            if state.faults.fail_step == Some(state.steps_received) {
                state.faults.fail_step = None;
                return Err(DeviceError::Transport("simulated step failure".into()));
            }
        }

        let body = state.heater.handle(command, self.caller_ip);
        if command.is_step() {
            state.steps_applied += 1;
            if let Some((after, holder)) = state.faults.takeover {
                if state.steps_applied >= after {
                    state.faults.takeover = None;
                    state.heater.set_priority_holder(Some(holder));
                    return Ok(state.heater.state_response());
                }
            }
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_consumption, decode_parameters, decode_state};

    fn me() -> IpAddr {
        IpAddr::from([192, 168, 0, 2])
    }

    fn other() -> IpAddr {
        IpAddr::from([192, 168, 0, 99])
    }

    #[test]
    fn test_responses_decode() {
        let mut heater = SimulatedHeater::new(42);
        heater.set_water_flowing(true);
        heater.run_for(750);

        let state = decode_state(&heater.state_response()).unwrap();
        assert!(state.is_powered_on);
        assert!(state.is_heating);
        assert_eq!(state.target_temperature, 42);
        assert_eq!(state.priority_holder, None);

        let params = decode_parameters(&heater.parameters_response()).unwrap();
        assert_eq!(params.target_temperature, 42);
        assert_eq!(params.inlet_temperature, 21.5);
        assert_eq!(params.outlet_temperature, 42.0);
        assert_eq!(params.water_flow, 8.2);
        assert_eq!(params.working_time, 750);
        assert_eq!(params.wifi_signal_strength, -58);

        let consumption = decode_consumption(&heater.consumption_response()).unwrap();
        assert_eq!(consumption.working_time_secs, 750);
    }

    #[test]
    fn test_priority_is_exclusive() {
        let mut heater = SimulatedHeater::new(40);
        heater.handle(&DeviceCommand::SetPriority(Some(other())), other());

        // we can neither steal the lock nor step while someone else holds it
        heater.handle(&DeviceCommand::SetPriority(Some(me())), me());
        heater.handle(&DeviceCommand::Increase, me());
        assert_eq!(heater.priority_holder(), Some(other()));
        assert_eq!(heater.set_point(), 40);

        heater.handle(&DeviceCommand::SetPriority(None), other());
        heater.handle(&DeviceCommand::Increase, me());
        assert_eq!(heater.set_point(), 41);
    }

    #[test]
    fn test_power_toggle_and_buttons() {
        let mut heater = SimulatedHeater::new(40);
        let body = heater.handle(&DeviceCommand::TogglePower, me());
        assert!(!decode_state(&body).unwrap().is_powered_on);

        heater.handle(&DeviceCommand::Button("banho".into()), me());
        assert_eq!(heater.last_button(), Some("banho"));
    }

    #[test]
    fn test_idle_heater_does_not_accumulate() {
        let mut heater = SimulatedHeater::new(40);
        heater.run_for(120);
        assert_eq!(heater.consumption_response(), "00:00,0,0");
    }
}
