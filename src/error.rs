use std::time::Duration;
use thiserror::Error;

use crate::engine::{ProcessId, SimTime};

/// Fatal errors raised while a single run is executing.
///
/// Every variant aborts the run that raised it and nothing else; the sweep
/// harness folds them into a per-point failure.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("cannot schedule an event at t={requested} when the clock is at t={now}")]
    InvalidSchedule { now: SimTime, requested: SimTime },
    #[error("{0} used after its run was torn down")]
    UseAfterTeardown(&'static str),
    #[error("process {0} cannot be resumed")]
    StaleProcess(ProcessId),
    #[error("run exceeded its wall-clock budget of {0:?}")]
    WallClockExceeded(Duration),
    #[error("run was cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
}

/// Errors detected while building a topology, before any simulated time elapses.
///
/// Each variant names the configuration field that caused it, e.g.
/// `topology.components[2].targets`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field}: unknown component '{name}'")]
    UnknownComponent { field: String, name: String },
    #[error("{field}: component name '{name}' is used more than once")]
    DuplicateComponent { field: String, name: String },
    #[error("{field}: missing parameter '{parameter}'")]
    MissingParameter { field: String, parameter: &'static str },
    #[error("{field}: capacity must be positive")]
    NonPositiveCapacity { field: String },
    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The configuration field this error was raised against.
    pub fn field(&self) -> &str {
        match self {
            ConfigError::UnknownComponent { field, .. }
            | ConfigError::DuplicateComponent { field, .. }
            | ConfigError::MissingParameter { field, .. }
            | ConfigError::NonPositiveCapacity { field }
            | ConfigError::Invalid { field, .. } => field,
        }
    }
}
