//! Unified error types for switchyard.
//!
//! [`SwitchyardError`] covers every failure the core can surface: malformed
//! topologies, actions the simulation facade rejects, and the terminal
//! outcomes of the run loop (simulation failure, cancellation, tick budget).
//!
//! A missing line between two substations is *not* an error; the resolver
//! returns `None` for that case.
//!
//! # Example
//!
//! ```ignore
//! use switchyard_core::{SwitchyardError, SwitchyardResult};
//!
//! fn play(game: &mut Game<ReplayEnvironment>) -> SwitchyardResult<()> {
//!     let report = game.continue_simulation(&token, |_| {})?;
//!     println!("stopped after {} ticks", report.ticks);
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all switchyard operations.
#[derive(Error, Debug)]
pub enum SwitchyardError {
    /// I/O errors (scenario files, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Topology arrays violate a structural invariant
    #[error("Topology error: {0}")]
    Topology(String),

    /// A composite action references an element or busbar that does not exist
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// The simulation facade failed for a reason of its own
    #[error("Environment error: {0}")]
    Environment(String),

    /// The facade reported `done` before any line reached the overload threshold.
    ///
    /// Terminal: the simulation cannot be replayed without a full reset.
    #[error("Failed to run the power network at tick {tick}. Cumulative reward = {cumulative_reward}")]
    SimulationFailed { cumulative_reward: f64, tick: u64 },

    /// The run loop was cancelled through its token
    #[error("simulation run cancelled after {ticks} ticks")]
    Cancelled { ticks: u64 },

    /// The run loop hit its configured tick budget without an overload
    #[error("no line reached the overload threshold within {max_ticks} ticks")]
    TickBudgetExhausted { max_ticks: u64 },

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl SwitchyardError {
    /// True for outcomes that end the episode; the caller must reset before playing on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwitchyardError::SimulationFailed { .. })
    }
}

/// Convenience type alias for Results using SwitchyardError.
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;

impl From<anyhow::Error> for SwitchyardError {
    fn from(err: anyhow::Error) -> Self {
        SwitchyardError::Other(err.to_string())
    }
}

impl From<String> for SwitchyardError {
    fn from(s: String) -> Self {
        SwitchyardError::Other(s)
    }
}

impl From<&str> for SwitchyardError {
    fn from(s: &str) -> Self {
        SwitchyardError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SwitchyardError::SimulationFailed {
            cumulative_reward: 12.5,
            tick: 7,
        };
        let text = err.to_string();
        assert!(text.contains("tick 7"));
        assert!(text.contains("Cumulative reward = 12.5"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SwitchyardError = io_err.into();
        assert!(matches!(err, SwitchyardError::Io(_)));
    }

    #[test]
    fn test_only_simulation_failure_is_terminal() {
        assert!(SwitchyardError::SimulationFailed {
            cumulative_reward: 0.0,
            tick: 1
        }
        .is_terminal());
        assert!(!SwitchyardError::Cancelled { ticks: 3 }.is_terminal());
        assert!(!SwitchyardError::InvalidAction("x".into()).is_terminal());
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> SwitchyardResult<()> {
            Err(SwitchyardError::Topology("test".into()))
        }

        fn outer() -> SwitchyardResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
