//! Configuration loader and validator for the queuesim simulator.
//! Reads experiment files and checks them before any run starts.

use std::fs;
use std::path::Path;

use queuesim::{SimulationConfig, Sweep, SweepConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Main Configuration Structs
// ------------------------------------------------------------------------------------------------

/// One experiment: a topology and workload, swept over load levels and seeds.
///
/// ```toml
/// name = "single_server"
///
/// [simulation]
/// horizon = { kind = "duration", time = 1000.0 }
/// ...
///
/// [sweep]
/// seeds_per_level = 5
/// load_range = { num_points = 10 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Name used for the results directory
    pub name: String,
    /// Base run; its workload rate is replaced by each load level
    pub simulation: SimulationConfig,
    /// Load levels, seeds and harness settings
    pub sweep: SweepConfig,
}

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] queuesim::ConfigError),
}

// ------------------------------------------------------------------------------------------------
// Configuration Implementation Methods
// ------------------------------------------------------------------------------------------------

impl ExperimentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self, ConfigError> {
        let config: ExperimentConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(queuesim::ConfigError::Invalid {
                field: "name".to_string(),
                reason: "experiment name must not be empty".to_string(),
            }
            .into());
        }
        self.sweep()?.validate()?;
        Ok(())
    }

    /// Builds the sweep harness for this experiment.
    pub fn sweep(&self) -> Result<Sweep, ConfigError> {
        Ok(Sweep::from_config(self.simulation.clone(), &self.sweep)?)
    }

    /// Absolute arrival rate of every load level.
    pub fn load_levels(&self) -> Result<Vec<f64>, ConfigError> {
        Ok(self.sweep.levels(&self.simulation)?)
    }
}
