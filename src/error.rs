use thiserror::Error;

/// The error taxonomy for the flight control core.
///
/// Every fallible function in this crate returns `Result<T, Error>`. Only
/// `main` pattern-matches the terminal error to pick a log level and an exit
/// code; everywhere else errors are propagated with `?`.
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration option was missing, malformed, or out of its
    /// documented range.
    #[error("configuration error: {0}")]
    Config(String),

    /// The battery was low or a sensor did not respond during `SYSTEMS_CHECK`.
    #[error("startup fault: {0}")]
    StartupFault(String),

    /// The altimetry filter produced a non-positive pressure or a non-finite
    /// altitude/velocity.
    #[error("altimetry invalid: {0}")]
    AltimetryInvalid(String),

    /// A sampler or autosave task terminated before the stop flag was set.
    #[error("worker lost: {0}")]
    WorkerLost(String),

    /// Writing a sample (or a header/trailer row) to durable storage failed.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Wraps an I/O error from a collaborator (file, serial bus, stdin).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a JSON (de)serialization error from config loading/snapshotting.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wraps a CSV writer/reader error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "hardware")]
    #[cfg_attr(doc_cfg, doc(cfg(feature = "hardware")))]
    /// Wraps a hardware GPIO error from the `rppal` backend.
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[cfg(feature = "hardware")]
    #[cfg_attr(doc_cfg, doc(cfg(feature = "hardware")))]
    /// Wraps a hardware I2C error from the `rppal` backend.
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),
}
