use std::env;
use std::path::PathBuf;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use queuesim::utils::logging;
use queuesim::{CancelFlag, SweepError};
use simulator::{format_summary, save_results, ConfigError, ExperimentConfig, SaveError};
use thiserror::Error;

const DEFAULT_CONFIG: &str = "simulator/configs/single_server.toml";
const RESULTS_DIR: &str = "simulator/results";

#[derive(Error, Debug)]
enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Save(#[from] SaveError),
}

// ------------------------------------------------------------------------------------------------
// Main
// ------------------------------------------------------------------------------------------------

/// Loads an experiment, sweeps it and writes the results.
///
/// Usage: `simulator [experiment.toml] [results_dir]`
#[tokio::main]
async fn main() -> Result<(), SimulatorError> {
    logging::init_logging();

    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let results_root = PathBuf::from(args.next().unwrap_or_else(|| RESULTS_DIR.to_string()));

    let experiment = ExperimentConfig::load(&config_path)?;
    let levels = experiment.load_levels()?;
    let total = levels.len() * experiment.sweep.seeds_per_level;
    log_experiment(&experiment, &config_path, &levels);

    println!("Running sweep: {}", experiment.name);
    let progress_bar = create_progress_bar(total);
    let progress = progress_bar.clone();

    // Ctrl-C stops the sweep; finished runs are still reported.
    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = experiment
        .sweep()?
        .cancel_flag(cancel)
        .on_progress(move |point, outcome| {
            progress.inc(1);
            let status = if outcome.is_ok() { "done" } else { "failed" };
            progress.set_message(format!("{point}: {status}"));
        })
        .run()
        .await;
    progress_bar.finish_with_message("Sweep finished");
    let result = result?;

    println!("\n{}", format_summary(&result));
    let dir = save_results(&results_root, &experiment, &result)?;
    println!("Results written to {}", dir.display());
    Ok(())
}

/// Creates a progress bar for the sweep
fn create_progress_bar(total: usize) -> ProgressBar {
    let progress_bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("+>-");
    progress_bar.set_style(style);
    progress_bar
}

/// Logs the experiment before the sweep starts
fn log_experiment(experiment: &ExperimentConfig, path: &str, levels: &[f64]) {
    let start_time = Local::now();
    logging::log("SIMULATOR", "=== Experiment Configuration ===");
    logging::log("SIMULATOR", &format!("Start Time: {}", start_time.format("%Y-%m-%d %H:%M:%S")));
    logging::log("SIMULATOR", &format!("Config File: {}", path));
    logging::log(
        "SIMULATOR",
        &format!("Components: {}", experiment.simulation.topology.components.len()),
    );
    logging::log("SIMULATOR", &format!("Load Levels: {:?}", levels));
    logging::log("SIMULATOR", &format!("Seeds per Level: {}", experiment.sweep.seeds_per_level));
    logging::log("SIMULATOR", &format!("Base Seed: {}", experiment.sweep.base_seed));
    logging::log("SIMULATOR", "================================");
}
