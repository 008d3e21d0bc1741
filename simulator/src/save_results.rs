use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use queuesim::sweep::SweepReport;
use queuesim::utils::logging;
use queuesim::SweepResult;
use serde::Serialize;
use thiserror::Error;

use crate::config::ExperimentConfig;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Failed to write results: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to serialize experiment config: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Parameters and outcome counts of a finished sweep.
#[derive(Debug, Serialize)]
struct Metadata<'a> {
    name: &'a str,
    finished_at: String,
    load_levels: Vec<f64>,
    seeds_per_level: usize,
    total_runs: usize,
    failed_runs: usize,
}

/// Saves a sweep's results to a fresh `<name>_<timestamp>` directory under `root`.
///
/// The directory holds:
/// * `metadata.json` - experiment name, load levels and run counts
/// * `experiment.toml` - the experiment exactly as it was run
/// * `runs.json` - statistics or failure of every `(level, seed)` point
/// * `levels.json` - per-level aggregates across seeds
///
/// Returns the directory written to.
pub fn save_results(
    root: &Path,
    experiment: &ExperimentConfig,
    result: &SweepResult,
) -> Result<PathBuf, SaveError> {
    let now = Local::now();
    let dir = root.join(format!("{}_{}", experiment.name, now.format("%Y%m%d_%H%M%S")));
    fs::create_dir_all(&dir)?;

    let report: SweepReport = result.report();
    let metadata = Metadata {
        name: &experiment.name,
        finished_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        load_levels: result.levels.iter().map(|level| level.load_level).collect(),
        seeds_per_level: experiment.sweep.seeds_per_level,
        total_runs: result.runs.len(),
        failed_runs: result.failures().count(),
    };

    write_json(&dir.join("metadata.json"), &metadata)?;
    fs::write(dir.join("experiment.toml"), toml::to_string(experiment)?)?;
    write_json(&dir.join("runs.json"), &report.runs)?;
    write_json(&dir.join("levels.json"), &report.levels)?;

    logging::log("SIMULATOR", &format!("Saved results to {}", dir.display()));
    Ok(dir)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SaveError> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
