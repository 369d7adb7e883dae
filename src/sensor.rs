// Sounding Rocket Program
//
// Declarative sensor descriptors.

use std::time::Duration;

use crate::error::Error;

/// The four logical sensors the core samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorName {
    Baro,
    Acc,
    Gyro,
    Mag,
}

impl SensorName {
    pub const ALL: [SensorName; 4] = [
        SensorName::Baro,
        SensorName::Acc,
        SensorName::Gyro,
        SensorName::Mag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorName::Baro => "baro",
            SensorName::Acc => "acc",
            SensorName::Gyro => "gyro",
            SensorName::Mag => "mag",
        }
    }
}

impl std::fmt::Display for SensorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The value produced by one sensor readout.
///
/// The barometer returns a scalar raw pressure reading; the accelerometer,
/// gyroscope and magnetometer each return a 3-axis tuple of signed integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Scalar(i32),
    Triple([i32; 3]),
}

impl Reading {
    /// Render this reading the way the CSV column expects: a bare integer for
    /// a scalar, or `"[x, y, z]"` for a triple.
    pub fn to_csv_field(self) -> String {
        match self {
            Reading::Scalar(v) => v.to_string(),
            Reading::Triple([x, y, z]) => format!("[{}, {}, {}]", x, y, z),
        }
    }
}

/// A function that performs one sensor readout. Boxed so that the dry-run PRNG
/// source and the real hardware driver share one call signature.
pub type Readout = Box<dyn Fn() -> Result<Reading, Error> + Send>;

/// Immutable descriptor `{name, interval, readout()}`. No failure is modelled
/// at this layer: a sensor driver error surfaces through the `Readout`
/// function's `Result` and is handled by the caller (fatal at startup, skipped
/// mid-flight — see [`crate::sampler::SamplerTask`]).
pub struct SensorSpec {
    pub name: SensorName,
    pub interval: Duration,
    pub readout: Readout,
}

impl SensorSpec {
    pub fn new(name: SensorName, interval_s: f64, readout: Readout) -> SensorSpec {
        assert!(interval_s > 0.0, "sensor interval must be > 0");
        SensorSpec {
            name,
            interval: Duration::from_secs_f64(interval_s),
            readout,
        }
    }
}

/// Real AltIMU-10 v5 driver, built on `rppal::i2c`. This is the one
/// collaborator the specification calls out as "out of scope" (`the sensor
/// driver library`): the three chips and their register layouts are fixed by
/// the board, not by this crate's design, so the surface here is kept to the
/// raw register reads the `SensorSpec` closures need.
#[cfg(feature = "hardware")]
pub mod hardware {
    use std::sync::{Arc, Mutex};

    use rppal::i2c::I2c;

    use super::{Reading, SensorName};
    use crate::error::Error;

    /// Same three addresses `I2cProbe::sensors_present` checks for.
    const LPS25H_ADDR: u16 = 0x5d;
    const LSM6DS33_ADDR: u16 = 0x6b;
    const LIS3MDL_ADDR: u16 = 0x1e;

    /// Register addresses with the auto-increment bit (0x80) set, so a single
    /// multi-byte read pulls all axes (or all three pressure bytes) at once.
    const LPS25H_PRESS_OUT_XL: u8 = 0x28 | 0x80;
    const LSM6DS33_OUTX_L_XL: u8 = 0x28 | 0x80;
    const LSM6DS33_OUTX_L_G: u8 = 0x22 | 0x80;
    const LIS3MDL_OUT_X_L: u8 = 0x28 | 0x80;

    /// All three chips share one I2C bus; reads from different `SamplerTask`
    /// threads are serialized through this mutex.
    pub struct ImuDriver {
        bus: Mutex<I2c>,
    }

    impl ImuDriver {
        pub fn new() -> Result<ImuDriver, Error> {
            Ok(ImuDriver {
                bus: Mutex::new(I2c::new()?),
            })
        }

        /// Dispatch to the register read for `name`, returning the `Reading`
        /// shape the rest of the crate expects for that sensor.
        pub fn read(self: &Arc<Self>, name: SensorName) -> Result<Reading, Error> {
            match name {
                SensorName::Baro => self.read_baro(),
                SensorName::Acc => self.read_triple(LSM6DS33_ADDR, LSM6DS33_OUTX_L_XL),
                SensorName::Gyro => self.read_triple(LSM6DS33_ADDR, LSM6DS33_OUTX_L_G),
                SensorName::Mag => self.read_triple(LIS3MDL_ADDR, LIS3MDL_OUT_X_L),
            }
        }

        fn read_baro(&self) -> Result<Reading, Error> {
            let mut buf = [0u8; 3];
            self.read_registers(LPS25H_ADDR, LPS25H_PRESS_OUT_XL, &mut buf)?;
            let raw = (i32::from(buf[2]) << 16) | (i32::from(buf[1]) << 8) | i32::from(buf[0]);
            Ok(Reading::Scalar(raw))
        }

        fn read_triple(&self, address: u16, register: u8) -> Result<Reading, Error> {
            let mut buf = [0u8; 6];
            self.read_registers(address, register, &mut buf)?;
            let x = i32::from(i16::from_le_bytes([buf[0], buf[1]]));
            let y = i32::from(i16::from_le_bytes([buf[2], buf[3]]));
            let z = i32::from(i16::from_le_bytes([buf[4], buf[5]]));
            Ok(Reading::Triple([x, y, z]))
        }

        fn read_registers(&self, address: u16, register: u8, buf: &mut [u8]) -> Result<(), Error> {
            let mut bus = self.bus.lock().expect("i2c bus mutex poisoned");
            bus.set_slave_address(address)?;
            bus.write_read(&[register], buf)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_renders_as_bare_integer() {
        assert_eq!(Reading::Scalar(101325).to_csv_field(), "101325");
    }

    #[test]
    fn triple_renders_with_brackets_and_spaces() {
        assert_eq!(
            Reading::Triple([1, -2, 3]).to_csv_field(),
            "[1, -2, 3]"
        );
    }

    #[test]
    fn sensor_names_are_all_distinct() {
        let mut names: Vec<&str> = SensorName::ALL.iter().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SensorName::ALL.len());
    }
}
