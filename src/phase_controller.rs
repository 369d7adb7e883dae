// Sounding Rocket Program
//
// The state machine coupling discrete GPIO/I2C inputs with the
// barometer-derived altimetry stream to drive the rocket from boot through
// landing: transitions, deploy voting, landing detection, worker lifecycle
// and the final flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::altimetry::{AltimetryEstimator, AltimetrySnapshot, AltimetryState};
use crate::autosave::{self, AutosaveTask};
use crate::config::Config;
use crate::error::Error;
use crate::gpio::{I2cProbe, Led, SharedGpio};
use crate::led::LedController;
use crate::phase::Phase;
use crate::ring::SampleRing;
use crate::run_dir::RunDirectory;
use crate::sampler::{BaroHook, SamplerTask};
use crate::sensor::{Reading, SensorName, SensorSpec};
use crate::shutdown;

/// Number of successive raw readings averaged into `p0` on ARMED entry.
const N_CALIB: usize = 50;

/// The legal (from, to) pairs. `enter` asserts every transition it performs
/// against this table; tests additionally walk it directly. `(Armed, Error)`
/// covers a failed calibration; `(Launched, Error)` and `(Deployed, Error)`
/// cover an in-flight altimetry fault. None of the three are discrete-input
/// rows, but the same "non-positive pressure or non-finite altitude/velocity
/// goes to ERROR" rule applies during calibration as well as during flight.
const TRANSITIONS: &[(Phase, Phase)] = &[
    (Phase::SystemsCheck, Phase::Idle),
    (Phase::SystemsCheck, Phase::Error),
    (Phase::Error, Phase::Idle),
    (Phase::Error, Phase::Landed),
    (Phase::Idle, Phase::Armed),
    (Phase::Armed, Phase::Idle),
    (Phase::Armed, Phase::Launched),
    (Phase::Armed, Phase::Error),
    (Phase::Launched, Phase::Deployed),
    (Phase::Launched, Phase::Landed),
    (Phase::Launched, Phase::Error),
    (Phase::Deployed, Phase::Landed),
    (Phase::Deployed, Phase::Error),
];

fn is_legal_transition(from: Phase, to: Phase) -> bool {
    TRANSITIONS.contains(&(from, to))
}

/// What the control loop should do after one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Exit,
}

/// One sensor's paired workers, created once on ARMED entry.
struct SensorWorker {
    name: SensorName,
    ring: Arc<SampleRing>,
    sampler: SamplerTask,
    autosave: AutosaveTask,
}

/// The control loop itself. Owns `Phase` and all GPIO outputs exclusively;
/// no other task reads or writes either.
pub struct PhaseController {
    config: Arc<Config>,
    gpio: SharedGpio,
    i2c: Box<dyn I2cProbe>,
    leds: LedController,
    run_dir: RunDirectory,
    /// Taken exactly once, on the first ARMED tick; see the start-once
    /// decision recorded in `DESIGN.md`.
    sensors: Option<Vec<SensorSpec>>,
    stop: Arc<AtomicBool>,
    started: bool,
    phase: Phase,
    flight_start: Option<Instant>,
    /// Latched once an in-flight `AltimetryInvalid` has been observed; an
    /// in-flight `ERROR` only clears via the arm switch being cycled off,
    /// unlike the boot-time `ERROR` which self-clears.
    in_flight_fault: bool,
    altimetry: Option<AltimetryState>,
    baro_invalid: Option<Arc<AtomicBool>>,
    workers: Vec<SensorWorker>,
}

impl PhaseController {
    pub fn new(
        config: Arc<Config>,
        gpio: SharedGpio,
        i2c: Box<dyn I2cProbe>,
        leds: LedController,
        run_dir: RunDirectory,
        sensors: Vec<SensorSpec>,
    ) -> PhaseController {
        PhaseController {
            config,
            gpio,
            i2c,
            leds,
            run_dir,
            sensors: Some(sensors),
            stop: Arc::new(AtomicBool::new(false)),
            started: false,
            phase: Phase::SystemsCheck,
            flight_start: None,
            in_flight_fault: false,
            altimetry: None,
            baro_invalid: None,
            workers: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the control loop until the arm-switch-off transition out of
    /// LANDED, issuing the OS shutdown (outside dry-run) before returning.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            let loop_start = Instant::now();
            let outcome = self.tick()?;
            if outcome == TickOutcome::Exit {
                return Ok(());
            }

            let period = Duration::from_secs_f64(self.config.state_interval(self.phase));
            let elapsed = loop_start.elapsed();
            if period > elapsed {
                thread::sleep(period - elapsed);
            }
        }
    }

    fn tick(&mut self) -> Result<TickOutcome, Error> {
        match self.phase {
            Phase::SystemsCheck => self.tick_systems_check(),
            Phase::Error => self.tick_error(),
            Phase::Idle => self.tick_idle(),
            Phase::Armed => self.tick_armed(),
            Phase::Launched => self.tick_launched(),
            Phase::Deployed => self.tick_deployed(),
            Phase::Landed => self.tick_landed(),
        }
    }

    fn enter(&mut self, to: Phase) {
        debug_assert!(
            is_legal_transition(self.phase, to),
            "illegal transition {} -> {}",
            self.phase,
            to
        );
        info!("phase transition: {} -> {}", self.phase, to);
        self.phase = to;
    }

    fn battery_full(&self) -> Result<bool, Error> {
        self.gpio.lock().expect("gpio mutex poisoned").battery_full()
    }

    fn arm_switch_on(&self) -> Result<bool, Error> {
        self.gpio.lock().expect("gpio mutex poisoned").arm_switch_on()
    }

    fn liftoff_signal_received(&self) -> Result<bool, Error> {
        self.gpio
            .lock()
            .expect("gpio mutex poisoned")
            .liftoff_signal_received()
    }

    fn vote_deploy(&self) -> Result<(), Error> {
        self.gpio.lock().expect("gpio mutex poisoned").vote_deploy()
    }

    fn tick_systems_check(&mut self) -> Result<TickOutcome, Error> {
        if self.battery_full()? && self.i2c.sensors_present()? {
            self.enter(Phase::Idle);
        } else {
            warn!("systems check failed: battery low or a sensor did not respond");
            self.leds.blink(Led::Red, self.config.blink_half_period);
            self.enter(Phase::Error);
        }
        Ok(TickOutcome::Continue)
    }

    fn tick_error(&mut self) -> Result<TickOutcome, Error> {
        if self.in_flight_fault {
            if !self.arm_switch_on()? {
                self.run_landing_handler()?;
                self.leds.off(Led::Red);
                self.enter(Phase::Landed);
            }
            return Ok(TickOutcome::Continue);
        }

        if self.battery_full()? && self.i2c.sensors_present()? {
            self.leds.off(Led::Red);
            self.enter(Phase::Idle);
        }
        Ok(TickOutcome::Continue)
    }

    fn tick_idle(&mut self) -> Result<TickOutcome, Error> {
        self.leds.on(Led::Green);
        if self.arm_switch_on()? {
            self.leds.off(Led::Green);
            self.leds.blink(Led::Green, 5.0 * self.config.blink_half_period);
            self.enter(Phase::Armed);
        }
        Ok(TickOutcome::Continue)
    }

    fn tick_armed(&mut self) -> Result<TickOutcome, Error> {
        if !self.started {
            match self.calibrate_and_start() {
                Ok(()) => {
                    self.started = true;
                    self.leds.off(Led::Green);
                    self.leds.blink(Led::Green, self.config.blink_half_period);
                }
                Err(e) => {
                    error!("calibration failed, aborting to ERROR: {}", e);
                    self.leds.blink(Led::Red, self.config.blink_half_period);
                    self.enter(Phase::Error);
                    return Ok(TickOutcome::Continue);
                }
            }
        }

        if !self.arm_switch_on()? {
            self.leds.off(Led::Green);
            self.enter(Phase::Idle);
            return Ok(TickOutcome::Continue);
        }

        if self.liftoff_signal_received()? {
            self.leds.alternate(self.config.blink_half_period);
            self.flight_start = Some(Instant::now());
            info!("liftoff detected, flight clock started");
            self.enter(Phase::Launched);
        }
        Ok(TickOutcome::Continue)
    }

    fn tick_launched(&mut self) -> Result<TickOutcome, Error> {
        if self.altimetry_invalid() {
            self.in_flight_fault = true;
            self.leds.blink(Led::Red, self.config.blink_half_period);
            self.enter(Phase::Error);
            return Ok(TickOutcome::Continue);
        }
        if !self.workers_alive() {
            let fault = Error::WorkerLost("a sampler or autosave task terminated unexpectedly".to_string());
            error!("{}", fault);
            self.run_landing_handler()?;
            self.enter(Phase::Landed);
            return Ok(TickOutcome::Continue);
        }

        let snapshot = self.read_altimetry();
        let now = Instant::now();
        let flight_start = self.flight_start.expect("flight_start set on LAUNCHED entry");
        let fl = &self.config.flight_logic;

        let deploy_ready = now > flight_start + Duration::from_secs_f64(fl.min_deploy_time)
            && snapshot.vertical_velocity < fl.vv_deploy_threshold;
        let landing_ready = self.landing_predicate(flight_start, now, &snapshot);

        // Deploy takes precedence when both fire on the same tick (see
        // DESIGN.md): the controller moves to DEPLOYED and reconsiders
        // landing on the next tick rather than skipping the vote.
        if deploy_ready {
            self.vote_deploy()?;
            info!("deploy vote asserted");
            self.leds.off(Led::Green);
            self.leds.off(Led::Red);
            self.enter(Phase::Deployed);
        } else if landing_ready || !self.arm_switch_on()? {
            self.run_landing_handler()?;
            self.leds.off(Led::Green);
            self.leds.off(Led::Red);
            self.enter(Phase::Landed);
        }
        Ok(TickOutcome::Continue)
    }

    fn tick_deployed(&mut self) -> Result<TickOutcome, Error> {
        if self.altimetry_invalid() {
            self.in_flight_fault = true;
            self.leds.blink(Led::Red, self.config.blink_half_period);
            self.enter(Phase::Error);
            return Ok(TickOutcome::Continue);
        }
        if !self.workers_alive() {
            let fault = Error::WorkerLost("a sampler or autosave task terminated unexpectedly".to_string());
            error!("{}", fault);
            self.run_landing_handler()?;
            self.enter(Phase::Landed);
            return Ok(TickOutcome::Continue);
        }

        self.leds.on(Led::Red);

        let snapshot = self.read_altimetry();
        let now = Instant::now();
        let flight_start = self.flight_start.expect("flight_start set on LAUNCHED entry");

        if self.landing_predicate(flight_start, now, &snapshot) || !self.arm_switch_on()? {
            self.run_landing_handler()?;
            self.leds.off(Led::Red);
            self.enter(Phase::Landed);
        }
        Ok(TickOutcome::Continue)
    }

    fn tick_landed(&mut self) -> Result<TickOutcome, Error> {
        self.leds.on(Led::Green);
        if !self.arm_switch_on()? {
            info!("arm switch off, shutting down in 1s");
            thread::sleep(Duration::from_secs(1));
            if !self.config.dry_run {
                shutdown::issue_os_shutdown()?;
            }
            return Ok(TickOutcome::Exit);
        }
        Ok(TickOutcome::Continue)
    }

    fn landing_predicate(&self, flight_start: Instant, now: Instant, snapshot: &AltimetrySnapshot) -> bool {
        let fl = &self.config.flight_logic;
        now > flight_start + Duration::from_secs_f64(fl.min_flight_duration)
            && snapshot.altitude.abs() < fl.landing_altitude_range
            && snapshot.vertical_velocity.abs() < fl.landing_vertical_velocity_range
    }

    fn read_altimetry(&self) -> AltimetrySnapshot {
        self.altimetry
            .as_ref()
            .expect("altimetry published once ARMED calibration completes")
            .read()
    }

    fn altimetry_invalid(&self) -> bool {
        self.baro_invalid
            .as_ref()
            .map(|flag| flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn workers_alive(&self) -> bool {
        self.workers
            .iter()
            .all(|w| !w.sampler.is_finished() && !w.autosave.is_finished())
    }

    /// Calibrate the altimetry filter against `N_CALIB` raw barometer
    /// readings taken on the control thread, then spawn every sampler and
    /// autosave task. Called at most once per process (`self.sensors` is
    /// `Option::take`n here).
    fn calibrate_and_start(&mut self) -> Result<(), Error> {
        let sensors = self.sensors.take().expect("calibrate_and_start runs at most once");
        let baro_index = sensors
            .iter()
            .position(|s| s.name == SensorName::Baro)
            .expect("baro sensor must be configured");
        let baro_interval_s = sensors[baro_index].interval.as_secs_f64();

        let mut raw_readings = Vec::with_capacity(N_CALIB);
        for _ in 0..N_CALIB {
            match (sensors[baro_index].readout)()? {
                Reading::Scalar(raw) => raw_readings.push(raw),
                Reading::Triple(_) => {
                    return Err(Error::AltimetryInvalid(
                        "baro sensor returned a triple during calibration".to_string(),
                    ));
                }
            }
            thread::sleep(Duration::from_secs_f64(baro_interval_s));
        }

        let mut estimator = Some(AltimetryEstimator::calibrate(
            self.config.altimetry,
            baro_interval_s,
            &raw_readings,
        )?);
        info!("calibration complete, p0={:.3} Pa", estimator.as_ref().unwrap().p0());

        let altimetry_state = AltimetryState::new();
        let baro_invalid = Arc::new(AtomicBool::new(false));
        self.altimetry = Some(altimetry_state.clone());
        self.baro_invalid = Some(Arc::clone(&baro_invalid));

        for spec in sensors {
            let name = spec.name;
            let ring = Arc::new(SampleRing::new());
            let hook = if name == SensorName::Baro {
                Some(BaroHook {
                    estimator: estimator.take().expect("baro sensor spec appears exactly once"),
                    state: altimetry_state.clone(),
                    invalid: Arc::clone(&baro_invalid),
                })
            } else {
                None
            };
            let sampler = SamplerTask::spawn(spec, Arc::clone(&ring), Arc::clone(&self.stop), hook);
            let autosave_task =
                AutosaveTask::spawn(Arc::clone(&ring), self.run_dir.csv_path(name), Arc::clone(&self.stop));
            self.workers.push(SensorWorker {
                name,
                ring,
                sampler,
                autosave: autosave_task,
            });
        }

        info!("started at {:.6}", crate::ring::wall_clock_now());
        Ok(())
    }

    /// Wait to capture the touchdown transient, stop every worker, join them,
    /// and flush each ring's final tail with a closing trailer row.
    fn run_landing_handler(&mut self) -> Result<(), Error> {
        info!("landing detected, waiting 2s to capture touchdown transient");
        thread::sleep(Duration::from_secs(2));
        self.stop.store(true, Ordering::Release);

        for worker in self.workers.drain(..) {
            worker.sampler.join();
            worker.autosave.join();
            let path = self.run_dir.csv_path(worker.name);
            match autosave::final_flush(&worker.ring, &path) {
                Ok(()) => info!("[{}] logged final data", worker.name),
                Err(e) => warn!("[{}] final flush failed: {}", worker.name, e),
            }
        }
        Ok(())
    }
}
