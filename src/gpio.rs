// Sounding Rocket Program
//
// The GPIO / I2C trait boundary. `PhaseController` never talks to hardware
// directly; it only ever calls through `GpioBackend` and `I2cProbe`, so the
// same control loop logic runs identically against real hardware and against
// the dry-run stand-in.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::config::Pins;
use crate::error::Error;

/// The two status LEDs the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Green,
    Red,
}

/// The discrete inputs and outputs the phase controller needs, independent of
/// whether they are backed by real pins or by a human at a terminal.
pub trait GpioBackend: Send {
    /// `true` when the battery is not in its low-voltage alarm state.
    fn battery_full(&mut self) -> Result<bool, Error>;
    /// `true` when ground crew has closed the arm switch.
    fn arm_switch_on(&mut self) -> Result<bool, Error>;
    /// `true` once the liftoff signal (breakwire / launch rail contact) fires.
    fn liftoff_signal_received(&mut self) -> Result<bool, Error>;
    /// Pull the deploy vote pin low. Idempotent: calling this more than once
    /// has no additional effect.
    fn vote_deploy(&mut self) -> Result<(), Error>;
    /// Drive one LED's raw on/off state (active-low at the pin level; this
    /// method takes the logical state, not the pin level).
    fn led_write(&mut self, led: Led, on: bool) -> Result<(), Error>;
}

/// The I2C bus probe used once at `SYSTEMS_CHECK` to decide whether all three
/// IMU/barometer addresses answer.
pub trait I2cProbe: Send {
    fn sensors_present(&mut self) -> Result<bool, Error>;
}

/// The `PhaseController` and the single `LedTask` both drive GPIO outputs
/// (deploy vote / discrete inputs vs. the two status LEDs), so the backend is
/// shared behind a mutex rather than owned outright by either one.
pub type SharedGpio = Arc<Mutex<Box<dyn GpioBackend>>>;

/// Prompts on stdin for every discrete input, and logs every output, in place
/// of real hardware. Selected at startup whenever `Config::dry_run` is true.
pub struct DryRunBackend {
    deployed: bool,
}

impl DryRunBackend {
    pub fn new() -> DryRunBackend {
        DryRunBackend { deployed: false }
    }

    fn prompt_bool(prompt: &str) -> Result<bool, Error> {
        print!("{} (1/0): ", prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim() == "1")
    }
}

impl Default for DryRunBackend {
    fn default() -> Self {
        DryRunBackend::new()
    }
}

impl GpioBackend for DryRunBackend {
    fn battery_full(&mut self) -> Result<bool, Error> {
        Self::prompt_bool("battery level")
    }

    fn arm_switch_on(&mut self) -> Result<bool, Error> {
        Self::prompt_bool("arm switch")
    }

    fn liftoff_signal_received(&mut self) -> Result<bool, Error> {
        Self::prompt_bool("liftoff signal")
    }

    fn vote_deploy(&mut self) -> Result<(), Error> {
        if !self.deployed {
            info!("[dry-run] deploy vote asserted");
            self.deployed = true;
        }
        Ok(())
    }

    fn led_write(&mut self, led: Led, on: bool) -> Result<(), Error> {
        debug!("[dry-run] LED {:?} -> {}", led, if on { "on" } else { "off" });
        Ok(())
    }
}

impl I2cProbe for DryRunBackend {
    fn sensors_present(&mut self) -> Result<bool, Error> {
        Self::prompt_bool("sensors present")
    }
}

/// Real Raspberry Pi GPIO/I2C backend, built on `rppal`.
#[cfg(feature = "hardware")]
pub mod hardware {
    use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
    use rppal::i2c::I2c;

    use super::*;

    /// I2C addresses the sensor driver library is expected to answer on.
    const SENSOR_I2C_ADDRESSES: [u16; 3] = [0x1e, 0x5d, 0x6b];

    pub struct HardwareBackend {
        battery_level_pin: InputPin,
        arm_switch_pin: InputPin,
        liftoff_pin: InputPin,
        deploy_vote_pin: OutputPin,
        green_led_pin: OutputPin,
        red_led_pin: OutputPin,
    }

    impl HardwareBackend {
        pub fn new(pins: &Pins) -> Result<HardwareBackend, Error> {
            let gpio = Gpio::new()?;

            let mut battery_level_pin = gpio.get(pins.battery_level_pin)?.into_input_pullup();
            let mut arm_switch_pin = gpio.get(pins.arm_switch_pin)?.into_input_pullup();
            let liftoff_pin = gpio.get(pins.liftoff_pin)?.into_input_pullup();
            let mut deploy_vote_pin = gpio.get(pins.deploy_vote_pin)?.into_output_high();
            let mut green_led_pin = gpio.get(pins.green_led_pin)?.into_output_high();
            let mut red_led_pin = gpio.get(pins.red_led_pin)?.into_output_high();

            // Pins start in their idle/inactive state: inputs settle
            // naturally under the pull-up, outputs are driven to their
            // documented initial level (HIGH == not voting / LED off).
            let _ = &mut battery_level_pin;
            let _ = &mut arm_switch_pin;
            deploy_vote_pin.set_high();
            green_led_pin.set_high();
            red_led_pin.set_high();

            Ok(HardwareBackend {
                battery_level_pin,
                arm_switch_pin,
                liftoff_pin,
                deploy_vote_pin,
                green_led_pin,
                red_led_pin,
            })
        }
    }

    impl GpioBackend for HardwareBackend {
        fn battery_full(&mut self) -> Result<bool, Error> {
            // active-low: logical TRUE when the pin reads LOW.
            Ok(self.battery_level_pin.read() == Level::Low)
        }

        fn arm_switch_on(&mut self) -> Result<bool, Error> {
            Ok(self.arm_switch_pin.read() == Level::Low)
        }

        fn liftoff_signal_received(&mut self) -> Result<bool, Error> {
            // active-high.
            Ok(self.liftoff_pin.read() == Level::High)
        }

        fn vote_deploy(&mut self) -> Result<(), Error> {
            self.deploy_vote_pin.set_low();
            Ok(())
        }

        fn led_write(&mut self, led: Led, on: bool) -> Result<(), Error> {
            let pin = match led {
                Led::Green => &mut self.green_led_pin,
                Led::Red => &mut self.red_led_pin,
            };
            // LED pins are active-low.
            if on {
                pin.set_low();
            } else {
                pin.set_high();
            }
            Ok(())
        }
    }

    pub struct HardwareI2cProbe {
        bus: I2c,
    }

    impl HardwareI2cProbe {
        pub fn new() -> Result<HardwareI2cProbe, Error> {
            Ok(HardwareI2cProbe { bus: I2c::new()? })
        }
    }

    impl I2cProbe for HardwareI2cProbe {
        fn sensors_present(&mut self) -> Result<bool, Error> {
            for address in SENSOR_I2C_ADDRESSES {
                self.bus.set_slave_address(address)?;
                // A 0-byte write is a pure presence probe: it completes only
                // if some device acknowledges the address.
                if self.bus.write(&[]).is_err() {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_deploy_vote_is_idempotent_and_logged_once() {
        let mut backend = DryRunBackend::new();
        assert!(!backend.deployed);
        backend.vote_deploy().unwrap();
        assert!(backend.deployed);
        // calling again must not panic or change observable state
        backend.vote_deploy().unwrap();
        assert!(backend.deployed);
    }
}
