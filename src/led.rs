// Sounding Rocket Program
//
// A single shared LED task driving both status LEDs, replacing the
// one-thread-per-blinking-LED design of the original source (see §9 of
// SPEC_FULL.md).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::gpio::{GpioBackend, Led, SharedGpio};

/// One LED's current pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pattern {
    Off,
    On,
    Blink { half_period: Duration },
}

#[derive(Debug, Clone, Copy)]
struct LedState {
    pattern: Pattern,
    lit: bool,
    last_toggle: Instant,
}

impl LedState {
    fn new() -> LedState {
        LedState {
            pattern: Pattern::Off,
            lit: false,
            last_toggle: Instant::now(),
        }
    }
}

/// Shared LED state, mutated by the phase controller and rendered by the
/// single [`LedTask`].
#[derive(Clone)]
pub struct LedController {
    green: Arc<Mutex<LedState>>,
    red: Arc<Mutex<LedState>>,
}

impl LedController {
    pub fn new() -> LedController {
        LedController {
            green: Arc::new(Mutex::new(LedState::new())),
            red: Arc::new(Mutex::new(LedState::new())),
        }
    }

    fn state(&self, led: Led) -> &Arc<Mutex<LedState>> {
        match led {
            Led::Green => &self.green,
            Led::Red => &self.red,
        }
    }

    /// Steady on. Does not touch `lit` directly — `tick` compares the pattern
    /// against the last physically-written level and writes only on change.
    pub fn on(&self, led: Led) {
        let mut state = self.state(led).lock().expect("led state mutex poisoned");
        state.pattern = Pattern::On;
    }

    pub fn off(&self, led: Led) {
        let mut state = self.state(led).lock().expect("led state mutex poisoned");
        state.pattern = Pattern::Off;
    }

    /// Start blinking. `last_toggle` is backdated by a full half-period so the
    /// very next tick toggles immediately, matching the original LED thread
    /// (which flips its state before its first sleep, not after).
    pub fn blink(&self, led: Led, half_period_s: f64) {
        let half_period = Duration::from_secs_f64(half_period_s);
        let mut state = self.state(led).lock().expect("led state mutex poisoned");
        state.pattern = Pattern::Blink { half_period };
        state.last_toggle = Instant::now() - half_period;
    }

    /// Both LEDs blink at `half_period_s`, one half-period out of phase, so
    /// exactly one is lit at any instant.
    pub fn alternate(&self, half_period_s: f64) {
        self.blink(Led::Green, half_period_s);
        let half_period = Duration::from_secs_f64(half_period_s);
        let mut red = self.red.lock().expect("led state mutex poisoned");
        red.pattern = Pattern::Blink { half_period };
        red.last_toggle = Instant::now();
    }

    /// Render one tick: for each LED whose blink half-period has elapsed,
    /// flip it and push the new level through `gpio`.
    fn tick(&self, gpio: &mut dyn GpioBackend) {
        for led in [Led::Green, Led::Red] {
            let mut state = self.state(led).lock().expect("led state mutex poisoned");
            let changed = match state.pattern {
                Pattern::Off => state.lit.then(|| false),
                Pattern::On => (!state.lit).then(|| true),
                Pattern::Blink { half_period } => {
                    if state.last_toggle.elapsed() >= half_period {
                        state.last_toggle = Instant::now();
                        Some(!state.lit)
                    } else {
                        None
                    }
                }
            };
            if let Some(lit) = changed {
                state.lit = lit;
                drop(state);
                let _ = gpio.led_write(led, lit);
            }
        }
    }
}

impl Default for LedController {
    fn default() -> Self {
        LedController::new()
    }
}

/// The single OS thread rendering both LEDs' patterns.
pub struct LedTask {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl LedTask {
    /// Spawn the LED task. `gpio` is the same shared handle the
    /// `PhaseController` uses for its discrete inputs and deploy vote; the
    /// controller keeps a cheap, cloneable handle ([`LedController`]) to
    /// mutate LED patterns from the caller's thread.
    pub fn spawn(controller: LedController, gpio: SharedGpio, tick_period: Duration) -> LedTask {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::Acquire) {
                {
                    let mut gpio = gpio.lock().expect("gpio mutex poisoned");
                    controller.tick(&mut **gpio);
                }
                thread::sleep(tick_period);
            }
        });

        LedTask { handle, stop }
    }

    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct RecordingGpio {
        writes: Vec<(Led, bool)>,
    }

    impl GpioBackend for RecordingGpio {
        fn battery_full(&mut self) -> Result<bool, Error> {
            Ok(true)
        }
        fn arm_switch_on(&mut self) -> Result<bool, Error> {
            Ok(true)
        }
        fn liftoff_signal_received(&mut self) -> Result<bool, Error> {
            Ok(false)
        }
        fn vote_deploy(&mut self) -> Result<(), Error> {
            Ok(())
        }
        fn led_write(&mut self, led: Led, on: bool) -> Result<(), Error> {
            self.writes.push((led, on));
            Ok(())
        }
    }

    #[test]
    fn steady_on_writes_exactly_once() {
        let controller = LedController::new();
        controller.on(Led::Green);
        let mut gpio = RecordingGpio { writes: Vec::new() };
        controller.tick(&mut gpio);
        controller.tick(&mut gpio);
        assert_eq!(gpio.writes, vec![(Led::Green, true)]);
    }

    #[test]
    fn blink_toggles_after_half_period_elapses() {
        let controller = LedController::new();
        controller.blink(Led::Red, 0.01);
        let mut gpio = RecordingGpio { writes: Vec::new() };
        controller.tick(&mut gpio); // first tick always turns it on
        std::thread::sleep(Duration::from_millis(15));
        controller.tick(&mut gpio);
        assert_eq!(gpio.writes, vec![(Led::Red, true), (Led::Red, false)]);
    }

    #[test]
    fn off_after_on_writes_false_once() {
        let controller = LedController::new();
        controller.on(Led::Green);
        let mut gpio = RecordingGpio { writes: Vec::new() };
        controller.tick(&mut gpio);
        controller.off(Led::Green);
        controller.tick(&mut gpio);
        controller.tick(&mut gpio);
        assert_eq!(gpio.writes, vec![(Led::Green, true), (Led::Green, false)]);
    }
}
