//! Set-point encoding used by the heater firmware.
//!
//! The device never reports degrees directly. Set points travel as codes in
//! half-degree units, and only the entries in [`SET_POINTS`] are reachable
//! with the `inc`/`dec` step commands: 1 °C steps from 35 to 46 °C, then the
//! coarse 48, 50, 55 and 60 °C positions.

use crate::error::DeviceError;

/// `(device code, degrees Celsius)` for every set point the heater accepts,
/// ordered from coldest to hottest.
pub const SET_POINTS: [(u16, u8); 16] = [
    (70, 35),
    (72, 36),
    (74, 37),
    (76, 38),
    (78, 39),
    (80, 40),
    (82, 41),
    (84, 42),
    (86, 43),
    (88, 44),
    (90, 45),
    (92, 46),
    (96, 48),
    (100, 50),
    (110, 55),
    (120, 60),
];

pub const MIN_SET_POINT_C: u8 = SET_POINTS[0].1;
pub const MAX_SET_POINT_C: u8 = SET_POINTS[SET_POINTS.len() - 1].1;

static_assertions::const_assert!(MIN_SET_POINT_C < MAX_SET_POINT_C);

/// Decode a raw set-point field into degrees Celsius.
pub fn decode_temperature(raw: &str) -> Result<u8, DeviceError> {
    let code: u16 = raw
        .trim()
        .parse()
        .map_err(|_| DeviceError::malformed("temperature", format!("non-numeric set point `{raw}`")))?;

    SET_POINTS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, celsius)| *celsius)
        .ok_or_else(|| DeviceError::malformed("temperature", format!("unknown set-point code {code}")))
}

/// Device code for a supported set point, `None` when the device cannot hold
/// that temperature.
pub fn encode_temperature(celsius: u8) -> Option<u16> {
    SET_POINTS
        .iter()
        .find(|(_, c)| *c == celsius)
        .map(|(code, _)| *code)
}

/// Snap a requested temperature onto the nearest reachable set point.
///
/// Requests outside the supported range clamp to the boundary. Ties between
/// two neighbours resolve to the colder one.
pub fn clamp_to_set_point(requested: f64) -> u8 {
    if requested.is_nan() {
        return MIN_SET_POINT_C;
    }
    let clamped = requested.clamp(f64::from(MIN_SET_POINT_C), f64::from(MAX_SET_POINT_C));

    let mut best = MIN_SET_POINT_C;
    let mut best_distance = f64::INFINITY;
    for &(_, celsius) in &SET_POINTS {
        let distance = (f64::from(celsius) - clamped).abs();
        if distance < best_distance {
            best = celsius;
            best_distance = distance;
        }
    }
    best
}

fn position(celsius: u8) -> Option<usize> {
    SET_POINTS.iter().position(|(_, c)| *c == celsius)
}

/// Set point reached by one `inc` command. Saturates at the hottest entry.
pub fn step_up(celsius: u8) -> u8 {
    match position(celsius) {
        Some(i) if i + 1 < SET_POINTS.len() => SET_POINTS[i + 1].1,
        Some(_) => MAX_SET_POINT_C,
        None => clamp_to_set_point(f64::from(celsius)),
    }
}

/// Set point reached by one `dec` command. Saturates at the coldest entry.
pub fn step_down(celsius: u8) -> u8 {
    match position(celsius) {
        Some(i) if i > 0 => SET_POINTS[i - 1].1,
        Some(_) => MIN_SET_POINT_C,
        None => clamp_to_set_point(f64::from(celsius)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_codes() {
        assert_eq!(decode_temperature("70").unwrap(), 35);
        assert_eq!(decode_temperature("72").unwrap(), 36);
        assert_eq!(decode_temperature("96").unwrap(), 48);
        assert_eq!(decode_temperature("120").unwrap(), 60);
    }

    #[test]
    fn test_decode_rejects_unknown_and_garbage() {
        assert!(matches!(
            decode_temperature("71"),
            Err(DeviceError::MalformedResponse { .. })
        ));
        assert!(matches!(
            decode_temperature("hot"),
            Err(DeviceError::MalformedResponse { .. })
        ));
        assert!(decode_temperature("").is_err());
    }

    #[test]
    fn test_clamp_out_of_range() {
        assert_eq!(clamp_to_set_point(10.0), MIN_SET_POINT_C);
        assert_eq!(clamp_to_set_point(-5.0), MIN_SET_POINT_C);
        assert_eq!(clamp_to_set_point(75.0), MAX_SET_POINT_C);
        assert_eq!(clamp_to_set_point(f64::NAN), MIN_SET_POINT_C);
    }

    #[test]
    fn test_clamp_snaps_to_nearest_entry() {
        assert_eq!(clamp_to_set_point(40.0), 40);
        assert_eq!(clamp_to_set_point(40.4), 40);
        assert_eq!(clamp_to_set_point(40.6), 41);
        assert_eq!(clamp_to_set_point(47.0), 46); // tie between 46 and 48
        assert_eq!(clamp_to_set_point(53.0), 55);
        assert_eq!(clamp_to_set_point(57.0), 55);
    }

    #[test]
    fn test_boundaries_round_trip() {
        for boundary in [MIN_SET_POINT_C, MAX_SET_POINT_C] {
            let code = encode_temperature(boundary).unwrap();
            let decoded = decode_temperature(&code.to_string()).unwrap();
            assert_eq!(encode_temperature(decoded), Some(code));
            assert_eq!(clamp_to_set_point(f64::from(decoded)), boundary);
        }
    }

    #[test]
    fn test_steps_walk_the_table() {
        assert_eq!(step_up(46), 48);
        assert_eq!(step_up(55), 60);
        assert_eq!(step_up(60), 60);
        assert_eq!(step_down(48), 46);
        assert_eq!(step_down(35), 35);
    }
}
