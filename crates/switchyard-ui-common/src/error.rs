//! Error types for UI services.

use std::path::PathBuf;
use switchyard_core::SwitchyardError;
use thiserror::Error;

/// Result type for UI service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from UI service operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No scenario is currently loaded.
    #[error("no game loaded")]
    NoGameLoaded,

    /// Failed to load a scenario file.
    #[error("failed to load scenario from {path}: {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A menu stage was given a value that is not among its current options.
    #[error("invalid selection for {stage}: {value}")]
    InvalidSelection { stage: &'static str, value: String },

    /// The game or the simulator rejected an operation.
    #[error(transparent)]
    Simulation(#[from] SwitchyardError),

    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(crate::JobId),

    /// A run is already in progress; only one may drive the game at a time.
    #[error("a simulation run is already in progress")]
    RunInProgress,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn invalid(stage: &'static str, value: impl std::fmt::Display) -> Self {
        Error::InvalidSelection {
            stage,
            value: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
