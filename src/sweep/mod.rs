//! Parallel sweep harness.
//!
//! Every `(load level, seed)` pair becomes one fully isolated run. Runs are
//! pulled from a shared work list by a fixed number of tokio worker tasks,
//! each executing its run on the blocking pool, and their outcomes flow over
//! a channel to a single aggregator that keys them by [`SweepPoint`].

pub mod aggregate;
pub mod load_range;

pub use aggregate::{aggregate, LevelAggregate};
pub use load_range::{LoadRange, Skew};

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, SimError};
use crate::topology::{RunStatistics, SimulationConfig, Topology};

// ------------------------------------------------------------------------------------------------
// Points, failures and results
// ------------------------------------------------------------------------------------------------

/// One run of a sweep. Identified and ordered by `(level_index, seed)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweepPoint {
    pub level_index: usize,
    pub load_level: f64,
    pub seed: u64,
}

impl PartialEq for SweepPoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for SweepPoint {}

impl PartialOrd for SweepPoint {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for SweepPoint {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.level_index, self.seed).cmp(&(other.level_index, other.seed))
    }
}

impl Hash for SweepPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.level_index, self.seed).hash(state);
    }
}

impl fmt::Display for SweepPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level {} (load {}) seed {}",
            self.level_index, self.load_level, self.seed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunFailureKind {
    /// The run raised a fatal simulation error.
    Fatal,
    /// The run exceeded its wall-clock budget.
    TimedOut,
    /// The run was skipped or stopped by cancellation.
    Cancelled,
    /// The run panicked.
    Panicked,
}

/// A run that did not produce statistics.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind:?} at {point}: {message}")]
pub struct RunFailure {
    pub point: SweepPoint,
    pub kind: RunFailureKind,
    pub message: String,
}

impl RunFailure {
    fn new(point: SweepPoint, kind: RunFailureKind, message: impl Into<String>) -> Self {
        Self {
            point,
            kind,
            message: message.into(),
        }
    }

    fn from_sim_error(point: SweepPoint, err: SimError) -> Self {
        let kind = match err {
            SimError::WallClockExceeded(_) => RunFailureKind::TimedOut,
            SimError::Cancelled => RunFailureKind::Cancelled,
            _ => RunFailureKind::Fatal,
        };
        Self::new(point, kind, err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid sweep configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("failed to start the sweep runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("sweep aborted because {point} failed: {failure}")]
    Aborted {
        point: SweepPoint,
        failure: RunFailure,
    },
}

pub type RunOutcome = Result<RunStatistics, RunFailure>;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub runs: BTreeMap<SweepPoint, RunOutcome>,
    pub levels: Vec<LevelAggregate>,
}

/// One row of a [`SweepReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub point: SweepPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<RunStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

/// Serializable form of a [`SweepResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub runs: Vec<RunRecord>,
    pub levels: Vec<LevelAggregate>,
}

impl SweepResult {
    pub fn failures(&self) -> impl Iterator<Item = &RunFailure> {
        self.runs.values().filter_map(|outcome| outcome.as_ref().err())
    }

    pub fn get(&self, level_index: usize, seed: u64) -> Option<&RunOutcome> {
        self.runs
            .iter()
            .find(|(point, _)| point.level_index == level_index && point.seed == seed)
            .map(|(_, outcome)| outcome)
    }

    pub fn report(&self) -> SweepReport {
        let runs = self
            .runs
            .iter()
            .map(|(point, outcome)| RunRecord {
                point: *point,
                statistics: outcome.as_ref().ok().cloned(),
                failure: outcome.as_ref().err().cloned(),
            })
            .collect();
        SweepReport {
            runs,
            levels: self.levels.clone(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Cancellation
// ------------------------------------------------------------------------------------------------

/// Shared flag that stops a sweep: pending points are skipped and in-flight
/// runs stop at their next limit check.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

fn default_seeds_per_level() -> usize {
    1
}

/// Sweep parameters as read from an experiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Absolute arrival rates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_levels: Vec<f64>,
    /// Relative loads, converted with the topology's saturation rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_range: Option<LoadRange>,
    #[serde(default = "default_seeds_per_level")]
    pub seeds_per_level: usize,
    /// Seed `i` of every level is `base_seed + i`
    #[serde(default)]
    pub base_seed: u64,
    /// Worker count; available parallelism when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default)]
    pub fail_fast: bool,
    /// Wall-clock budget per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_budget_ms: Option<u64>,
}

impl SweepConfig {
    /// Resolves the configured levels to absolute arrival rates.
    pub fn levels(&self, base: &SimulationConfig) -> Result<Vec<f64>, ConfigError> {
        match (&self.load_range, self.load_levels.is_empty()) {
            (Some(_), false) => Err(ConfigError::invalid(
                "sweep",
                "set either load_levels or load_range, not both",
            )),
            (Some(range), true) => {
                range.validate()?;
                Ok(range.rates(base.saturation_rate()))
            }
            (None, false) => Ok(self.load_levels.clone()),
            (None, true) => Err(ConfigError::MissingParameter {
                field: "sweep".to_string(),
                parameter: "load_levels",
            }),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Harness
// ------------------------------------------------------------------------------------------------

type ProgressFn = Arc<dyn Fn(&SweepPoint, &RunOutcome) + Send + Sync>;

/// Builder for a sweep over load levels and seeds.
pub struct Sweep {
    base: SimulationConfig,
    load_levels: Vec<f64>,
    seeds_per_level: usize,
    base_seed: u64,
    workers: Option<usize>,
    fail_fast: bool,
    run_budget: Option<Duration>,
    cancel: CancelFlag,
    on_progress: Option<ProgressFn>,
}

impl fmt::Debug for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sweep")
            .field("load_levels", &self.load_levels)
            .field("seeds_per_level", &self.seeds_per_level)
            .field("base_seed", &self.base_seed)
            .field("workers", &self.workers)
            .field("fail_fast", &self.fail_fast)
            .field("run_budget", &self.run_budget)
            .finish_non_exhaustive()
    }
}

impl Sweep {
    pub fn new(base: SimulationConfig, load_levels: Vec<f64>, seeds_per_level: usize) -> Self {
        Self {
            base,
            load_levels,
            seeds_per_level,
            base_seed: 0,
            workers: None,
            fail_fast: false,
            run_budget: None,
            cancel: CancelFlag::new(),
            on_progress: None,
        }
    }

    pub fn from_config(base: SimulationConfig, config: &SweepConfig) -> Result<Self, ConfigError> {
        let levels = config.levels(&base)?;
        let mut sweep = Self::new(base, levels, config.seeds_per_level)
            .base_seed(config.base_seed)
            .fail_fast(config.fail_fast);
        sweep.workers = config.workers;
        sweep.run_budget = config.run_budget_ms.map(Duration::from_millis);
        Ok(sweep)
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn base_seed(mut self, seed: u64) -> Self {
        self.base_seed = seed;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn run_budget(mut self, budget: Duration) -> Self {
        self.run_budget = Some(budget);
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called by the aggregator as each run reports, in completion order.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SweepPoint, &RunOutcome) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Every point of the sweep, in `(level, seed)` order.
    pub fn points(&self) -> Vec<SweepPoint> {
        self.load_levels
            .iter()
            .enumerate()
            .flat_map(|(level_index, &load_level)| {
                (0..self.seeds_per_level as u64).map(move |i| SweepPoint {
                    level_index,
                    load_level,
                    seed: self.base_seed + i,
                })
            })
            .collect()
    }

    /// Rejects a sweep that could not run, before any run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_levels.is_empty() {
            return Err(ConfigError::MissingParameter {
                field: "sweep".to_string(),
                parameter: "load_levels",
            });
        }
        if let Some(i) = self
            .load_levels
            .iter()
            .position(|level| !(level.is_finite() && *level >= 0.0))
        {
            return Err(ConfigError::invalid(
                format!("sweep.load_levels[{i}]"),
                "must be a non-negative number",
            ));
        }
        if self.seeds_per_level == 0 {
            return Err(ConfigError::invalid("sweep.seeds_per_level", "must be positive"));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::invalid("sweep.workers", "must be positive"));
        }
        for &level in &self.load_levels {
            self.base.clone().with_load(level).validate()?;
        }
        // A dry build catches anything validation alone does not.
        Topology::build(&self.base.clone().with_load(self.load_levels[0]))?;
        Ok(())
    }

    pub async fn run(self) -> Result<SweepResult, SweepError> {
        self.validate()?;
        let points = self.points();
        let total = points.len();
        let workers = self
            .workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .clamp(1, total);
        info!(
            points = total,
            levels = self.load_levels.len(),
            seeds = self.seeds_per_level,
            workers,
            "starting sweep"
        );

        let pending = Arc::new(Mutex::new(points.into_iter().collect::<VecDeque<_>>()));
        let (sender, mut receiver) = mpsc::channel::<(SweepPoint, RunOutcome)>(total);
        let base = Arc::new(self.base);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let pending = Arc::clone(&pending);
            let sender = sender.clone();
            let base = Arc::clone(&base);
            let cancel = self.cancel.clone();
            let budget = self.run_budget;
            handles.push(tokio::spawn(async move {
                loop {
                    let Some(point) = pending.lock().await.pop_front() else {
                        break;
                    };
                    let outcome = if cancel.is_cancelled() {
                        Err(RunFailure::new(
                            point,
                            RunFailureKind::Cancelled,
                            "skipped after cancellation",
                        ))
                    } else {
                        debug!(worker, %point, "running point");
                        let config = base
                            .as_ref()
                            .clone()
                            .with_load(point.load_level)
                            .with_seed(point.seed);
                        let cancel = cancel.clone();
                        let task = move || execute(point, config, budget, cancel);
                        match tokio::task::spawn_blocking(task).await {
                            Ok(outcome) => outcome,
                            Err(err) => Err(RunFailure::new(
                                point,
                                RunFailureKind::Panicked,
                                err.to_string(),
                            )),
                        }
                    };
                    if sender.send((point, outcome)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(sender);

        let mut runs = BTreeMap::new();
        while let Some((point, outcome)) = receiver.recv().await {
            if let Err(failure) = &outcome {
                warn!(%point, kind = ?failure.kind, message = %failure.message, "run failed");
                if self.fail_fast && failure.kind != RunFailureKind::Cancelled {
                    self.cancel.cancel();
                }
            }
            if let Some(callback) = &self.on_progress {
                callback(&point, &outcome);
            }
            runs.insert(point, outcome);
        }
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "sweep worker task failed");
            }
        }

        if self.fail_fast {
            let first_failure = runs.iter().find_map(|(point, outcome)| match outcome {
                Err(failure) if failure.kind != RunFailureKind::Cancelled => {
                    Some((*point, failure.clone()))
                }
                _ => None,
            });
            if let Some((point, failure)) = first_failure {
                return Err(SweepError::Aborted { point, failure });
            }
        }

        let levels = aggregate(&self.load_levels, &runs);
        info!(
            runs = runs.len(),
            failed = runs.values().filter(|outcome| outcome.is_err()).count(),
            "sweep finished"
        );
        Ok(SweepResult { runs, levels })
    }

    /// Runs the sweep on a dedicated multi-threaded runtime.
    pub fn run_blocking(self) -> Result<SweepResult, SweepError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }
}

/// Sweeps `load_levels` with seeds `0..seeds_per_level` at every level.
pub async fn sweep(
    base: SimulationConfig,
    load_levels: Vec<f64>,
    seeds_per_level: usize,
) -> Result<SweepResult, SweepError> {
    Sweep::new(base, load_levels, seeds_per_level).run().await
}

/// Builds and runs one point in isolation.
fn execute(
    point: SweepPoint,
    config: SimulationConfig,
    budget: Option<Duration>,
    cancel: CancelFlag,
) -> RunOutcome {
    let mut topology = Topology::build(&config)
        .map_err(|err| RunFailure::new(point, RunFailureKind::Fatal, err.to_string()))?;
    topology.set_limits(budget, Some(cancel));
    topology
        .run(config.horizon)
        .map_err(|err| RunFailure::from_sim_error(point, err))
}
