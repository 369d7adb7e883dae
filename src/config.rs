// Sounding Rocket Program
//
// Configuration loading, validation and snapshotting.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::phase::Phase;

/// Per-sensor sampling intervals, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Intervals {
    pub baro: f64,
    pub acc: f64,
    pub gyro: f64,
    pub mag: f64,
}

impl Intervals {
    fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("baro", self.baro),
            ("acc", self.acc),
            ("gyro", self.gyro),
            ("mag", self.mag),
        ] {
            if !(value > 0.0) {
                return Err(Error::Config(format!(
                    "intervals.{} must be > 0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Board-numbered GPIO pin assignments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pins {
    pub battery_level_pin: u8,
    pub arm_switch_pin: u8,
    pub liftoff_pin: u8,
    pub deploy_vote_pin: u8,
    pub green_led_pin: u8,
    pub red_led_pin: u8,
}

/// Physical constants and filter coefficients used by the altimetry estimator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AltimetryConfig {
    pub exp_factor_p: f64,
    pub exp_factor_vv: f64,
    pub t0: f64,
    pub a: f64,
    pub r: f64,
    pub g0: f64,
}

impl AltimetryConfig {
    fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("exp_factor_p", self.exp_factor_p),
            ("exp_factor_vv", self.exp_factor_vv),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Config(format!(
                    "altimetry.{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(self.t0 > 0.0) {
            return Err(Error::Config(format!(
                "altimetry.t0 must be > 0, got {}",
                self.t0
            )));
        }
        if self.a == 0.0 {
            return Err(Error::Config("altimetry.a must be nonzero".to_string()));
        }
        if !(self.r > 0.0) {
            return Err(Error::Config(format!(
                "altimetry.r must be > 0, got {}",
                self.r
            )));
        }
        if !(self.g0 > 0.0) {
            return Err(Error::Config(format!(
                "altimetry.g0 must be > 0, got {}",
                self.g0
            )));
        }
        Ok(())
    }
}

/// Flight-logic thresholds governing deploy voting and landing detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlightLogicConfig {
    pub min_deploy_time: f64,
    pub min_flight_duration: f64,
    pub vv_deploy_threshold: f64,
    pub landing_altitude_range: f64,
    pub landing_vertical_velocity_range: f64,
}

impl FlightLogicConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.min_deploy_time < 0.0 {
            return Err(Error::Config("min_deploy_time must be >= 0".to_string()));
        }
        if self.min_flight_duration < 0.0 {
            return Err(Error::Config(
                "min_flight_duration must be >= 0".to_string(),
            ));
        }
        if !(self.vv_deploy_threshold < 0.0) {
            return Err(Error::Config(
                "vv_deploy_threshold must be negative".to_string(),
            ));
        }
        if !(self.landing_altitude_range > 0.0) {
            return Err(Error::Config(
                "landing_altitude_range must be > 0".to_string(),
            ));
        }
        if !(self.landing_vertical_velocity_range > 0.0) {
            return Err(Error::Config(
                "landing_vertical_velocity_range must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Immutable, validated program configuration. Loaded once at boot and passed
/// explicitly (via `Arc<Config>`) to every component constructor; there are no
/// implicit globals anywhere in this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dry_run: bool,
    pub intervals: Intervals,
    pub state_intervals: HashMap<String, f64>,
    pub blink_half_period: f64,
    pub pins: Pins,
    pub altimetry: AltimetryConfig,
    pub flight_logic: FlightLogicConfig,
}

impl Config {
    /// Load and validate a configuration file. A missing file, unparseable
    /// JSON, or a value that fails `validate` are all reported as
    /// `Error::Config`, not the underlying `io`/`serde_json` error: every
    /// failure to produce a usable configuration is the same fatal condition
    /// to the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Lookup the control-loop period for a given phase.
    ///
    /// Every phase name enumerated in [`Phase::ALL`] is guaranteed present
    /// after [`Config::validate`] has succeeded.
    pub fn state_interval(&self, phase: Phase) -> f64 {
        self.state_intervals[phase.config_key()]
    }

    fn validate(&self) -> Result<(), Error> {
        self.intervals.validate()?;
        self.altimetry.validate()?;
        self.flight_logic.validate()?;

        for phase in Phase::ALL {
            let key = phase.config_key();
            match self.state_intervals.get(key) {
                Some(value) if *value > 0.0 => {}
                Some(value) => {
                    return Err(Error::Config(format!(
                        "state_intervals.{} must be > 0, got {}",
                        key, value
                    )))
                }
                None => {
                    return Err(Error::Config(format!(
                        "state_intervals is missing required phase '{}'",
                        key
                    )))
                }
            }
        }

        if !(self.blink_half_period > 0.0) {
            return Err(Error::Config(format!(
                "blink_half_period must be > 0, got {}",
                self.blink_half_period
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "dry_run": true,
            "intervals": {"baro": 0.1, "acc": 0.01, "gyro": 0.01, "mag": 0.1},
            "state_intervals": {
                "SYSTEMS_CHECK": 1.0,
                "ERROR": 0.5,
                "IDLE": 0.5,
                "ARMED": 0.1,
                "LAUNCHED": 0.05,
                "DEPLOYED": 0.05,
                "LANDED": 1.0
            },
            "blink_half_period": 0.3,
            "pins": {
                "battery_level_pin": 7, "arm_switch_pin": 11, "liftoff_pin": 13,
                "deploy_vote_pin": 15, "green_led_pin": 16, "red_led_pin": 18
            },
            "altimetry": {
                "exp_factor_p": 0.3, "exp_factor_vv": 0.3,
                "t0": 288.15, "a": -0.0065, "r": 287.05, "g0": 9.80665
            },
            "flight_logic": {
                "min_deploy_time": 3.0, "min_flight_duration": 10.0,
                "vv_deploy_threshold": -5.0, "landing_altitude_range": 3.0,
                "landing_vertical_velocity_range": 1.0
            }
        }"#
    }

    #[test]
    fn valid_config_parses_and_validates() {
        let config: Config = serde_json::from_str(valid_json()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.state_interval(Phase::Idle), 0.5);
    }

    #[test]
    fn missing_state_interval_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(valid_json()).unwrap();
        value["state_intervals"]
            .as_object_mut()
            .unwrap()
            .remove("LANDED");
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn out_of_range_exp_factor_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(valid_json()).unwrap();
        value["altimetry"]["exp_factor_p"] = serde_json::json!(1.5);
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn non_negative_vv_deploy_threshold_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(valid_json()).unwrap();
        value["flight_logic"]["vv_deploy_threshold"] = serde_json::json!(5.0);
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
