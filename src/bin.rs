// Sounding Rocket Program

#[macro_use]
extern crate log;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use srp_flight_core::config::Config;
use srp_flight_core::error::Error;
use srp_flight_core::gpio::{DryRunBackend, GpioBackend, I2cProbe, SharedGpio};
use srp_flight_core::led::{LedController, LedTask};
use srp_flight_core::phase_controller::PhaseController;
use srp_flight_core::run_dir::RunDirectory;
use srp_flight_core::sensor::{Reading, SensorName, SensorSpec};

const CONFIG_PATH: &str = "config.json";
const DATA_DIR: &str = "data";

/// Duplicates every write to both sinks; used to send log records to stdout
/// and to the run directory's log file simultaneously, since `env_logger`
/// itself only ever targets one.
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.a.write_all(buf)?;
        self.b.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

fn init_logging(log_path: &Path) -> Result<(), Error> {
    let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;
    let target = Tee {
        a: io::stdout(),
        b: log_file,
    };
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(target)))
        .init();
    Ok(())
}

fn build_sensors(config: &Config) -> Result<Vec<SensorSpec>, Error> {
    #[cfg(feature = "hardware")]
    {
        if !config.dry_run {
            let driver = Arc::new(srp_flight_core::sensor::hardware::ImuDriver::new()?);
            return Ok(SensorName::ALL
                .into_iter()
                .map(|&name| {
                    let interval = match name {
                        SensorName::Baro => config.intervals.baro,
                        SensorName::Acc => config.intervals.acc,
                        SensorName::Gyro => config.intervals.gyro,
                        SensorName::Mag => config.intervals.mag,
                    };
                    let driver = Arc::clone(&driver);
                    SensorSpec::new(name, interval, Box::new(move || driver.read(name)))
                })
                .collect());
        }
    }

    Ok(SensorName::ALL
        .into_iter()
        .map(|&name| {
            let interval = match name {
                SensorName::Baro => config.intervals.baro,
                SensorName::Acc => config.intervals.acc,
                SensorName::Gyro => config.intervals.gyro,
                SensorName::Mag => config.intervals.mag,
            };
            SensorSpec::new(name, interval, dry_run_readout(name))
        })
        .collect())
}

/// A single uniform `0..100` PRNG readout shape serves every sensor, matching
/// the original flight software's one dummy-readout function used for
/// barometer, accelerometer, gyro and magnetometer alike.
fn dry_run_readout(name: SensorName) -> srp_flight_core::sensor::Readout {
    use rand::Rng;
    Box::new(move || {
        let mut rng = rand::thread_rng();
        let v = rng.gen_range(0..100);
        Ok(match name {
            SensorName::Baro => Reading::Scalar(v),
            _ => Reading::Triple([v, rng.gen_range(0..100), rng.gen_range(0..100)]),
        })
    })
}

fn build_gpio(config: &Config) -> Result<(SharedGpio, Box<dyn I2cProbe>), Error> {
    #[cfg(feature = "hardware")]
    {
        if !config.dry_run {
            let gpio: SharedGpio = Arc::new(Mutex::new(
                Box::new(srp_flight_core::gpio::hardware::HardwareBackend::new(&config.pins)?)
                    as Box<dyn GpioBackend>,
            ));
            let i2c: Box<dyn I2cProbe> = Box::new(srp_flight_core::gpio::hardware::HardwareI2cProbe::new()?);
            return Ok((gpio, i2c));
        }
    }

    let gpio: SharedGpio = Arc::new(Mutex::new(Box::new(DryRunBackend::new()) as Box<dyn GpioBackend>));
    let i2c: Box<dyn I2cProbe> = Box::new(DryRunBackend::new());
    Ok((gpio, i2c))
}

fn run() -> Result<(), Error> {
    let config = Config::load(CONFIG_PATH)?;
    let config = Arc::new(config);

    let run_dir = RunDirectory::create(Path::new(DATA_DIR), &config)?;
    init_logging(&run_dir.log_path())?;

    info!("configuration loaded, dry_run={}", config.dry_run);

    let (gpio, i2c) = build_gpio(&config)?;
    let sensors = build_sensors(&config)?;

    let leds = LedController::new();
    let tick_period = Duration::from_secs_f64(config.blink_half_period / 4.0);
    let led_task = LedTask::spawn(leds.clone(), Arc::clone(&gpio), tick_period);

    let mut controller = PhaseController::new(Arc::clone(&config), gpio, i2c, leds, run_dir, sensors);
    let result = controller.run();

    led_task.stop();
    result
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ Error::Config(_)) => {
            eprintln!("configuration error: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("unrecoverable error, shutting down: {}", e);
            ExitCode::FAILURE
        }
    }
}
