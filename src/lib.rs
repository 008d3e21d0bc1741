pub mod components;
pub mod engine;
pub mod error;
pub mod resource;
pub mod sweep;
pub mod topology;
pub mod utils;

pub use engine::{Dispatcher, Engine, Until};
pub use error::{ConfigError, SimError};
pub use sweep::{sweep, CancelFlag, Sweep, SweepConfig, SweepError, SweepPoint, SweepResult};
pub use topology::{Horizon, RunStatistics, SimulationConfig, Topology};
