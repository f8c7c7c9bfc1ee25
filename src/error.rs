//! Crate-wide error type.
//!
//! Everything returned here is either a fatal-init condition (the session is
//! aborted before `Running`) or a storage failure reported by a drain.
//! Latched faults are not errors; they travel in the session report.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Storage could not be mounted or appended to.
    #[error("storage error: {0}")]
    Storage(String),

    /// ADC could not be configured or read.
    #[error("adc error: {0}")]
    Adc(String),

    /// A peripheral other than storage or the ADC failed to initialise.
    #[error("peripheral init failed: {0}")]
    Init(String),

    /// The engine never confirmed running while armed.
    #[error("engine did not confirm running within {0:?}")]
    EngineConfirmTimeout(Duration),

    /// Setpoint sequences are unusable.
    #[error("invalid setpoint profile: {0}")]
    Profile(String),

    /// Session summary could not be written.
    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaqError>;
