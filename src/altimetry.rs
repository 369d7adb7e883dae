// Sounding Rocket Program
//
// Recursive filter producing smoothed pressure, altitude and vertical
// velocity from raw barometer samples.

use std::sync::{Arc, Mutex};

use crate::config::AltimetryConfig;
use crate::error::Error;

/// A consistent `(alt[0], vv[0])` snapshot, plus the raw smoothed pressure,
/// shared between the barometer sampler (single writer) and the phase
/// controller (single reader) behind a `Mutex`. The lock's hold time is a
/// handful of float copies, so a lock is simpler than a sequence-counter
/// protocol for no measurable cost; either would satisfy the "never observe a
/// torn pair" requirement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltimetrySnapshot {
    pub altitude: f64,
    pub vertical_velocity: f64,
}

/// Shared handle to the latest altimetry snapshot.
#[derive(Clone)]
pub struct AltimetryState {
    inner: Arc<Mutex<AltimetrySnapshot>>,
}

impl AltimetryState {
    pub fn new() -> AltimetryState {
        AltimetryState {
            inner: Arc::new(Mutex::new(AltimetrySnapshot {
                altitude: 0.0,
                vertical_velocity: 0.0,
            })),
        }
    }

    pub fn publish(&self, snapshot: AltimetrySnapshot) {
        *self.inner.lock().expect("altimetry state mutex poisoned") = snapshot;
    }

    pub fn read(&self) -> AltimetrySnapshot {
        *self.inner.lock().expect("altimetry state mutex poisoned")
    }
}

impl Default for AltimetryState {
    fn default() -> Self {
        AltimetryState::new()
    }
}

/// The recursive filter itself. Owns the two-element windows of smoothed
/// pressure, altitude and vertical velocity, plus the calibration reference
/// pressure `p0`. Lives entirely on the barometer `SamplerTask`'s thread; only
/// its published [`AltimetrySnapshot`]s cross the thread boundary.
pub struct AltimetryEstimator {
    config: AltimetryConfig,
    baro_interval_s: f64,
    p0: f64,
    p_prev: f64,
    alt_prev: f64,
    vv_prev: f64,
}

impl AltimetryEstimator {
    /// Calibrate against `N_calib` successive raw readings, setting `p0` to
    /// their arithmetic mean in Pa and zeroing the altitude/velocity windows.
    pub fn calibrate(config: AltimetryConfig, baro_interval_s: f64, raw_readings: &[i32]) -> Result<AltimetryEstimator, Error> {
        if raw_readings.is_empty() {
            return Err(Error::AltimetryInvalid(
                "calibration requires at least one raw reading".to_string(),
            ));
        }
        let sum: f64 = raw_readings.iter().map(|&raw| raw_to_pa(raw)).sum();
        let p0 = sum / raw_readings.len() as f64;
        if !(p0 > 0.0) {
            return Err(Error::AltimetryInvalid(format!(
                "calibration produced non-positive p0={}",
                p0
            )));
        }
        Ok(AltimetryEstimator {
            config,
            baro_interval_s,
            p0,
            p_prev: p0,
            alt_prev: 0.0,
            vv_prev: 0.0,
        })
    }

    /// The calibration reference pressure, in Pa.
    pub fn p0(&self) -> f64 {
        self.p0
    }

    /// Feed one new raw barometer reading, returning the updated snapshot, or
    /// `Err(Error::AltimetryInvalid)` if the update would produce a
    /// non-positive pressure or a non-finite altitude/velocity. On error, the
    /// estimator's internal state is left unchanged so a later, valid reading
    /// can still recover it (the caller decides whether to keep sampling).
    pub fn update(&mut self, raw: i32) -> Result<AltimetrySnapshot, Error> {
        let p_raw = raw_to_pa(raw);
        let p_new = self.config.exp_factor_p * p_raw + (1.0 - self.config.exp_factor_p) * self.p_prev;
        if !(p_new > 0.0) {
            return Err(Error::AltimetryInvalid(format!(
                "smoothed pressure went non-positive: {}",
                p_new
            )));
        }

        let exponent = -(self.config.r * self.config.a) / self.config.g0;
        let alt_new = (self.config.t0 / self.config.a) * ((p_new / self.p0).powf(exponent) - 1.0);

        let vv_raw = (alt_new - self.alt_prev) / self.baro_interval_s;
        let vv_new = self.config.exp_factor_vv * vv_raw + (1.0 - self.config.exp_factor_vv) * self.vv_prev;

        if !alt_new.is_finite() || !vv_new.is_finite() {
            return Err(Error::AltimetryInvalid(format!(
                "non-finite altitude/velocity: alt={} vv={}",
                alt_new, vv_new
            )));
        }

        self.p_prev = p_new;
        self.alt_prev = alt_new;
        self.vv_prev = vv_new;

        Ok(AltimetrySnapshot {
            altitude: alt_new,
            vertical_velocity: vv_new,
        })
    }
}

fn raw_to_pa(raw: i32) -> f64 {
    f64::from(raw) / 40.96
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AltimetryConfig {
        AltimetryConfig {
            exp_factor_p: 0.3,
            exp_factor_vv: 0.3,
            t0: 288.15,
            a: -0.0065,
            r: 287.05,
            g0: 9.80665,
        }
    }

    #[test]
    fn calibration_averages_raw_readings_into_p0() {
        let readings = vec![101325; 50];
        let estimator =
            AltimetryEstimator::calibrate(test_config(), 0.1, &readings).unwrap();
        assert!((estimator.p0() - 101325.0 / 40.96).abs() < 1e-6);
    }

    #[test]
    fn constant_pressure_at_p0_yields_zero_altitude_and_velocity_at_steady_state() {
        let readings = vec![101325; 50];
        let mut estimator =
            AltimetryEstimator::calibrate(test_config(), 0.1, &readings).unwrap();
        let raw_at_p0 = (estimator.p0() * 40.96).round() as i32;

        let mut last = AltimetrySnapshot {
            altitude: 0.0,
            vertical_velocity: 0.0,
        };
        for _ in 0..200 {
            last = estimator.update(raw_at_p0).unwrap();
        }
        assert!(last.altitude.abs() < 1e-6, "altitude={}", last.altitude);
        assert!(
            last.vertical_velocity.abs() < 1e-6,
            "vv={}",
            last.vertical_velocity
        );
    }

    #[test]
    fn rising_pressure_below_p0_yields_negative_altitude() {
        // A pressure reading lower than p0 corresponds to gaining altitude
        // (pressure falls with altitude), so feed a *lower* raw reading and
        // expect positive altitude.
        let readings = vec![101325; 50];
        let mut estimator =
            AltimetryEstimator::calibrate(test_config(), 0.1, &readings).unwrap();
        let mut last = AltimetrySnapshot {
            altitude: 0.0,
            vertical_velocity: 0.0,
        };
        for _ in 0..50 {
            last = estimator.update(95000).unwrap();
        }
        assert!(last.altitude > 0.0, "altitude={}", last.altitude);
    }

    #[test]
    fn non_positive_raw_pressure_is_reported_invalid() {
        let readings = vec![101325; 50];
        let mut estimator =
            AltimetryEstimator::calibrate(test_config(), 0.1, &readings).unwrap();
        let result = estimator.update(0);
        assert!(matches!(result, Err(Error::AltimetryInvalid(_))));
    }

    #[test]
    fn empty_calibration_set_is_rejected() {
        let result = AltimetryEstimator::calibrate(test_config(), 0.1, &[]);
        assert!(matches!(result, Err(Error::AltimetryInvalid(_))));
    }

    #[test]
    fn altimetry_state_snapshot_is_never_torn() {
        let state = AltimetryState::new();
        state.publish(AltimetrySnapshot {
            altitude: 123.0,
            vertical_velocity: -4.0,
        });
        let snap = state.read();
        assert_eq!(snap.altitude, 123.0);
        assert_eq!(snap.vertical_velocity, -4.0);
    }

    proptest::proptest! {
        #[test]
        fn steady_state_is_zero_for_any_valid_exp_factors(
            exp_p in 0.01f64..=1.0,
            exp_vv in 0.01f64..=1.0,
        ) {
            let config = AltimetryConfig { exp_factor_p: exp_p, exp_factor_vv: exp_vv, ..test_config() };
            let readings = vec![101325; 50];
            let mut estimator = AltimetryEstimator::calibrate(config, 0.1, &readings).unwrap();
            let raw_at_p0 = (estimator.p0() * 40.96).round() as i32;
            let mut last = AltimetrySnapshot { altitude: 0.0, vertical_velocity: 0.0 };
            for _ in 0..500 {
                last = estimator.update(raw_at_p0).unwrap();
            }
            assert!(last.altitude.abs() < 1e-4);
            assert!(last.vertical_velocity.abs() < 1e-4);
        }
    }
}
