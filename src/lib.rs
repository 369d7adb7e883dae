// Sounding Rocket Program

#[macro_use]
extern crate log;

pub mod altimetry;
pub mod autosave;
pub mod config;
pub mod csv_log;
pub mod error;
pub mod gpio;
pub mod led;
pub mod phase;
pub mod phase_controller;
pub mod ring;
pub mod run_dir;
pub mod sampler;
pub mod sensor;
pub mod shutdown;

pub use config::Config;
pub use error::Error;
pub use phase::Phase;
pub use phase_controller::PhaseController;
