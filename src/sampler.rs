// Sounding Rocket Program
//
// The periodic per-sensor sampler, using absolute-deadline scheduling so a
// slow readout does not accumulate drift across iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::altimetry::{AltimetryEstimator, AltimetryState};
use crate::ring::SampleRing;
use crate::sensor::{Reading, SensorName, SensorSpec};

/// Wiring needed only by the barometer's `SamplerTask`: it alone feeds the
/// altimetry filter, and it alone can report `AltimetryInvalid`.
pub struct BaroHook {
    pub estimator: AltimetryEstimator,
    pub state: AltimetryState,
    /// Set by the sampler thread the first time the filter reports an invalid
    /// update; cleared by nobody — once raised, it latches until the process
    /// restarts, matching the ERROR phase's "requires arm-switch cycling to
    /// leave" semantics in flight.
    pub invalid: Arc<AtomicBool>,
}

/// The periodic sampler for one sensor. Owns nothing other than a join
/// handle and a liveness flag; the [`SampleRing`] and (for the barometer)
/// the [`AltimetryState`] are the only state it publishes.
pub struct SamplerTask {
    handle: JoinHandle<()>,
}

impl SamplerTask {
    /// Spawn the sampler. `baro_hook` must be `Some` exactly when
    /// `spec.name == SensorName::Baro`.
    pub fn spawn(
        spec: SensorSpec,
        ring: Arc<SampleRing>,
        stop: Arc<AtomicBool>,
        baro_hook: Option<BaroHook>,
    ) -> SamplerTask {
        let handle = thread::spawn(move || run(spec, ring, stop, baro_hook));
        SamplerTask { handle }
    }

    /// `true` once the sampler thread has returned, whether or not `stop` was
    /// observed first — callers distinguish expected vs. unexpected exit by
    /// checking `stop` themselves.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) {
        let _ = self.handle.join();
    }
}

fn run(spec: SensorSpec, ring: Arc<SampleRing>, stop: Arc<AtomicBool>, mut baro_hook: Option<BaroHook>) {
    let mut next_call = Instant::now();
    while !stop.load(Ordering::Acquire) {
        match (spec.readout)() {
            Ok(reading) => {
                ring.append(reading);
                if let Some(hook) = baro_hook.as_mut() {
                    update_altimetry(spec.name, reading, hook);
                }
            }
            Err(e) => {
                warn!("[{}] sensor readout failed, skipping this tick: {}", spec.name, e);
            }
        }

        next_call += spec.interval;
        let now = Instant::now();
        if next_call > now {
            thread::sleep(next_call - now);
        }
    }
}

fn update_altimetry(name: SensorName, reading: Reading, hook: &mut BaroHook) {
    debug_assert_eq!(name, SensorName::Baro);
    let raw = match reading {
        Reading::Scalar(v) => v,
        Reading::Triple(_) => {
            warn!("[baro] readout produced a triple instead of a scalar; ignoring");
            return;
        }
    };
    match hook.estimator.update(raw) {
        Ok(snapshot) => hook.state.publish(snapshot),
        Err(e) => {
            warn!("altimetry invalid, latching fault: {}", e);
            hook.invalid.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::altimetry::AltimetryEstimator;
    use crate::config::AltimetryConfig;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn test_altimetry_config() -> AltimetryConfig {
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
    fn non_baro_sampler_appends_at_its_interval_and_stops_cleanly() {
        let ring = Arc::new(SampleRing::new());
        let stop = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let spec = SensorSpec::new(
            SensorName::Acc,
            0.01,
            Box::new(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Reading::Triple([1, 2, 3]))
            }),
        );

        let task = SamplerTask::spawn(spec, Arc::clone(&ring), Arc::clone(&stop), None);
        thread::sleep(Duration::from_millis(55));
        stop.store(true, Ordering::Release);
        task.join();

        assert!(ring.len() >= 3, "expected several samples, got {}", ring.len());
        assert_eq!(ring.len(), counter.load(Ordering::SeqCst));
    }

    #[test]
    fn readout_error_skips_the_tick_without_stopping_the_sampler() {
        let ring = Arc::new(SampleRing::new());
        let stop = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let spec = SensorSpec::new(
            SensorName::Gyro,
            0.005,
            Box::new(move || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 {
                    Err(Error::StartupFault("simulated readout failure".to_string()))
                } else {
                    Ok(Reading::Triple([0, 0, 0]))
                }
            }),
        );

        let task = SamplerTask::spawn(spec, Arc::clone(&ring), Arc::clone(&stop), None);
        thread::sleep(Duration::from_millis(60));
        stop.store(true, Ordering::Release);
        task.join();

        assert!(calls.load(Ordering::SeqCst) > ring.len());
    }

    #[test]
    fn baro_sampler_publishes_altimetry_and_latches_invalid_on_fault() {
        let ring = Arc::new(SampleRing::new());
        let stop = Arc::new(AtomicBool::new(false));
        let estimator =
            AltimetryEstimator::calibrate(test_altimetry_config(), 0.01, &[101325; 50]).unwrap();
        let state = AltimetryState::new();
        let invalid = Arc::new(AtomicBool::new(false));
        let hook = BaroHook {
            estimator,
            state: state.clone(),
            invalid: Arc::clone(&invalid),
        };

        let first = AtomicBool::new(true);
        let spec = SensorSpec::new(
            SensorName::Baro,
            0.005,
            Box::new(move || {
                if first.swap(false, Ordering::SeqCst) {
                    Ok(Reading::Scalar(101325))
                } else {
                    Ok(Reading::Scalar(0))
                }
            }),
        );

        let task = SamplerTask::spawn(spec, Arc::clone(&ring), Arc::clone(&stop), Some(hook));
        thread::sleep(Duration::from_millis(40));
        stop.store(true, Ordering::Release);
        task.join();

        assert!(invalid.load(Ordering::SeqCst));
    }
}
