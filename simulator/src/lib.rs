pub mod config;
pub mod save_results;
pub mod summary;

pub use config::{ConfigError, ExperimentConfig};
pub use save_results::{save_results, SaveError};
pub use summary::format_summary;
