//! Request names and response decoding for the heater's HTTP interface.
//!
//! Every response body is a flat comma-separated list of tokens read by fixed
//! position. Only the positions documented on each decoder are inspected; the
//! rest of the payload is opaque and may change between firmware versions.

use crate::error::DeviceError;
use crate::temperature::decode_temperature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Power-state code the device reports in field 0 while switched off.
pub const POWER_OFF_CODE: &str = "11";
/// Literal used in place of an address when nobody holds priority.
pub const NO_HOLDER: &str = "null";
/// kcal/h to kW.
pub const KCAL_TO_KW: f64 = 0.014_330_754;
pub const WATER_DIVISOR: f64 = 1000.0;
pub const GAS_DIVISOR: f64 = 9400.0;
pub const DISPLAY_PRECISION: i32 = 2;

const STATE_FIELDS: usize = 8;
const PARAMETER_FIELDS: usize = 38;
const CONSUMPTION_FIELDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    /// `ip:<addr>:pri`, or `ip:null:pri` to release.
    SetPriority(Option<IpAddr>),
    Increase,
    Decrease,
    TogglePower,
    ReadState,
    ReadParameters,
    ReadConsumption,
    Button(String),
}

impl DeviceCommand {
    /// Request path relative to the device root, always starting with `/`.
    pub fn path(&self) -> String {
        match self {
            DeviceCommand::SetPriority(Some(ip)) => format!("/ip:{ip}:pri"),
            DeviceCommand::SetPriority(None) => format!("/ip:{NO_HOLDER}:pri"),
            DeviceCommand::Increase => "/inc".to_string(),
            DeviceCommand::Decrease => "/dec".to_string(),
            DeviceCommand::TogglePower => "/lig".to_string(),
            DeviceCommand::ReadState => "/tela_".to_string(),
            DeviceCommand::ReadParameters => "/bus".to_string(),
            DeviceCommand::ReadConsumption => "/consumo".to_string(),
            DeviceCommand::Button(name) => {
                if name.starts_with('/') {
                    name.clone()
                } else {
                    format!("/{name}")
                }
            }
        }
    }

    /// Inverse of [`DeviceCommand::path`]. Anything unrecognised is a button.
    pub fn from_path(path: &str) -> Self {
        let name = path.trim_start_matches('/');
        match name {
            "inc" => DeviceCommand::Increase,
            "dec" => DeviceCommand::Decrease,
            "lig" => DeviceCommand::TogglePower,
            "tela_" => DeviceCommand::ReadState,
            "bus" => DeviceCommand::ReadParameters,
            "consumo" => DeviceCommand::ReadConsumption,
            _ => {
                if let Some(holder) = name.strip_prefix("ip:").and_then(|rest| rest.strip_suffix(":pri")) {
                    if holder == NO_HOLDER {
                        return DeviceCommand::SetPriority(None);
                    }
                    if let Ok(ip) = holder.parse() {
                        return DeviceCommand::SetPriority(Some(ip));
                    }
                }
                DeviceCommand::Button(name.to_string())
            }
        }
    }

    pub fn is_step(&self) -> bool {
        matches!(self, DeviceCommand::Increase | DeviceCommand::Decrease)
    }

    /// Commands the device only honours from the current priority holder.
    pub fn requires_priority(&self) -> bool {
        matches!(
            self,
            DeviceCommand::Increase | DeviceCommand::Decrease | DeviceCommand::TogglePower | DeviceCommand::Button(_)
        )
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Primary status, decoded from `/tela_` and from every step/button response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub is_powered_on: bool,
    pub is_heating: bool,
    pub target_temperature: u8,
    pub priority_holder: Option<IpAddr>,
}

/// Extended diagnostics from `/bus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceParameters {
    pub is_powered_on: bool,
    pub target_temperature: u8,
    pub inlet_temperature: f64,
    pub outlet_temperature: f64,
    pub power_kw: f64,
    pub water_flow: f64,
    pub working_time: u64,
    pub ip_address: String,
    pub mac_address: String,
    pub wifi_signal_strength: i32,
}

/// Cumulative counters from `/consumo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSnapshot {
    pub working_time_secs: u64,
    pub water_m3: f64,
    pub gas_m3: f64,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn split_fields<'a>(raw: &'a str, response: &'static str, expected: usize) -> Result<Vec<&'a str>, DeviceError> {
    let fields: Vec<&str> = raw.trim().split(',').map(str::trim).collect();
    if fields.len() < expected {
        return Err(DeviceError::malformed(
            response,
            format!("expected at least {expected} fields, got {}", fields.len()),
        ));
    }
    Ok(fields)
}

fn numeric<T: FromStr>(fields: &[&str], index: usize, response: &'static str) -> Result<T, DeviceError> {
    fields[index]
        .parse()
        .map_err(|_| DeviceError::malformed(response, format!("field {index} is not numeric: `{}`", fields[index])))
}

fn power_state(fields: &[&str], response: &'static str) -> Result<bool, DeviceError> {
    numeric::<u32>(fields, 0, response)?;
    Ok(fields[0] != POWER_OFF_CODE)
}

fn priority_holder(token: &str) -> Result<Option<IpAddr>, DeviceError> {
    let holder = token.split(':').next().unwrap_or_default();
    if holder == NO_HOLDER {
        return Ok(None);
    }
    holder
        .parse()
        .map(Some)
        .map_err(|_| DeviceError::malformed("state", format!("invalid priority holder `{holder}`")))
}

/// Decode the primary status string.
///
/// Field 0 is the power code, field 2 the heating flag, field 6 is
/// `holder:tag` and field 7 the encoded set point.
pub fn decode_state(raw: &str) -> Result<DeviceState, DeviceError> {
    let fields = split_fields(raw, "state", STATE_FIELDS)?;

    Ok(DeviceState {
        is_powered_on: power_state(&fields, "state")?,
        is_heating: numeric::<u8>(&fields, 2, "state")? == 1,
        target_temperature: decode_temperature(fields[7])?,
        priority_holder: priority_holder(fields[6])?,
    })
}

/// Decode the extended diagnostics string.
pub fn decode_parameters(raw: &str) -> Result<DeviceParameters, DeviceError> {
    const R: &str = "parameters";
    let fields = split_fields(raw, R, PARAMETER_FIELDS)?;

    let power_kcal = numeric::<f64>(&fields, 9, R)? / 100.0;

    Ok(DeviceParameters {
        is_powered_on: power_state(&fields, R)?,
        target_temperature: decode_temperature(fields[18])?,
        inlet_temperature: numeric::<f64>(&fields, 10, R)? / 100.0,
        outlet_temperature: numeric::<f64>(&fields, 11, R)? / 100.0,
        power_kw: round_to(power_kcal * KCAL_TO_KW, DISPLAY_PRECISION),
        water_flow: round_to(numeric::<f64>(&fields, 12, R)? / 100.0, DISPLAY_PRECISION),
        working_time: numeric(&fields, 4, R)?,
        ip_address: fields[16].to_string(),
        mac_address: fields[25].to_string(),
        wifi_signal_strength: numeric(&fields, 37, R)?,
    })
}

/// Decode the consumption counters. Field 0 is `MM:SS` of burner time.
pub fn decode_consumption(raw: &str) -> Result<ConsumptionSnapshot, DeviceError> {
    const R: &str = "consumption";
    let fields = split_fields(raw, R, CONSUMPTION_FIELDS)?;

    let (minutes, seconds) = fields[0]
        .split_once(':')
        .ok_or_else(|| DeviceError::malformed(R, format!("working time `{}` is not MM:SS", fields[0])))?;
    let minutes: u64 = minutes
        .parse()
        .map_err(|_| DeviceError::malformed(R, format!("invalid minutes `{minutes}`")))?;
    let seconds: u64 = seconds
        .parse()
        .map_err(|_| DeviceError::malformed(R, format!("invalid seconds `{seconds}`")))?;
    let working_time_secs = minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(|| DeviceError::malformed(R, format!("working time `{}` out of range", fields[0])))?;

    Ok(ConsumptionSnapshot {
        working_time_secs,
        water_m3: round_to(numeric::<f64>(&fields, 1, R)? / WATER_DIVISOR, DISPLAY_PRECISION),
        gas_m3: round_to(numeric::<f64>(&fields, 2, R)? / GAS_DIVISOR, DISPLAY_PRECISION),
    })
}
