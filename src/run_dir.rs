// Sounding Rocket Program
//
// The timestamped run directory created once per boot: holds the CSV
// streams, the log file and a snapshot of the validated configuration.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::Config;
use crate::error::Error;
use crate::sensor::SensorName;

/// `data/<DD-MM-YY_HH-MM-SS>/`, plus the timestamp tag every file inside it
/// is prefixed with. Created after config validation and before any GPIO pin
/// is configured or thread spawned, so a bad config never leaves a
/// half-initialized run directory behind.
pub struct RunDirectory {
    dir: PathBuf,
    tag: String,
}

impl RunDirectory {
    pub fn create(base: &Path, config: &Config) -> Result<RunDirectory, Error> {
        let tag = Local::now().format("%d-%m-%y_%H-%M-%S").to_string();
        let dir = base.join(&tag);
        fs::create_dir_all(&dir)?;

        let snapshot = serde_json::to_string_pretty(config)?;
        fs::write(dir.join(format!("{}_config.json", tag)), snapshot)?;

        let run_dir = RunDirectory { dir, tag };

        // Open the log file and every sensor's CSV file up front, before any
        // thread is spawned, so a permissions problem or full disk surfaces
        // at boot rather than on the first autosave window.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(run_dir.log_path())?;
        for sensor in SensorName::ALL {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(run_dir.csv_path(sensor))?;
        }

        Ok(run_dir)
    }

    /// Build a `RunDirectory` around an already-existing directory and tag,
    /// without creating anything or writing a config snapshot. Used by tests
    /// that want the path-computation behavior without the filesystem setup.
    #[cfg(test)]
    fn at(dir: PathBuf, tag: String) -> RunDirectory {
        RunDirectory { dir, tag }
    }

    pub fn csv_path(&self, sensor: SensorName) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", self.tag, sensor))
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.tag))
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_base(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "srp-flight-core-rundir-test-{}-{}",
            std::process::id(),
            tag
        ))
    }

    #[test]
    fn create_makes_directory_and_writes_config_snapshot() {
        let base = temp_base("create");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();

        let config: Config = serde_json::from_str(super::tests_support::VALID_CONFIG_JSON).unwrap();
        let run_dir = RunDirectory::create(&base, &config).unwrap();

        assert!(run_dir.path().is_dir());
        let snapshot_path = run_dir.path().join(format!("{}_config.json", run_dir.tag));
        assert!(snapshot_path.is_file());
        let snapshot: Config = serde_json::from_str(&fs::read_to_string(snapshot_path).unwrap()).unwrap();
        assert_eq!(snapshot.dry_run, config.dry_run);

        assert!(run_dir.log_path().is_file());
        for sensor in SensorName::ALL {
            assert!(run_dir.csv_path(sensor).is_file(), "{:?} csv missing", sensor);
        }

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn csv_and_log_paths_share_the_run_tag() {
        let run_dir = RunDirectory::at(PathBuf::from("/tmp/whatever"), "01-01-26_00-00-00".to_string());
        assert_eq!(
            run_dir.csv_path(SensorName::Baro),
            PathBuf::from("/tmp/whatever/01-01-26_00-00-00_baro.csv")
        );
        assert_eq!(
            run_dir.log_path(),
            PathBuf::from("/tmp/whatever/01-01-26_00-00-00.log")
        );
    }
}

#[cfg(test)]
mod tests_support {
    pub const VALID_CONFIG_JSON: &str = r#"{
        "dry_run": true,
        "intervals": {"baro": 0.1, "acc": 0.01, "gyro": 0.01, "mag": 0.1},
        "state_intervals": {
            "SYSTEMS_CHECK": 1.0, "ERROR": 0.5, "IDLE": 0.5, "ARMED": 0.1,
            "LAUNCHED": 0.05, "DEPLOYED": 0.05, "LANDED": 1.0
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
    }"#;
}
