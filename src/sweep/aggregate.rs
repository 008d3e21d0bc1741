//! Per-level aggregation across seeds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::topology::RunStatistics;

use super::{RunFailure, SweepPoint};

/// Summary of every run at one load level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelAggregate {
    pub level_index: usize,
    pub load_level: f64,
    /// Runs that produced statistics.
    pub runs: usize,
    pub failed: usize,
    pub unstable: usize,
    pub mean_latency: f64,
    pub mean_p50: f64,
    pub mean_p99: f64,
    /// Largest p99 seen across seeds.
    pub max_p99: f64,
    pub mean_throughput: f64,
    pub completed: u64,
    pub dropped: u64,
    /// Mean utilization per component.
    pub utilization: BTreeMap<String, f64>,
}

/// Folds finished runs into one aggregate per level.
///
/// Runs are visited in `(level, seed)` order, so the result does not depend on
/// the order in which they finished.
pub fn aggregate(
    load_levels: &[f64],
    runs: &BTreeMap<SweepPoint, Result<RunStatistics, RunFailure>>,
) -> Vec<LevelAggregate> {
    load_levels
        .iter()
        .enumerate()
        .map(|(level_index, &load_level)| {
            let mut level = LevelAggregate {
                level_index,
                load_level,
                runs: 0,
                failed: 0,
                unstable: 0,
                mean_latency: 0.0,
                mean_p50: 0.0,
                mean_p99: 0.0,
                max_p99: 0.0,
                mean_throughput: 0.0,
                completed: 0,
                dropped: 0,
                utilization: BTreeMap::new(),
            };
            let outcomes = runs
                .iter()
                .filter(|(point, _)| point.level_index == level_index)
                .map(|(_, outcome)| outcome);
            for outcome in outcomes {
                let stats = match outcome {
                    Ok(stats) => stats,
                    Err(_) => {
                        level.failed += 1;
                        continue;
                    }
                };
                level.runs += 1;
                level.unstable += usize::from(stats.unstable);
                level.mean_latency += stats.latency.mean;
                level.mean_p50 += stats.latency.p50;
                level.mean_p99 += stats.latency.p99;
                level.max_p99 = level.max_p99.max(stats.latency.p99);
                level.mean_throughput += stats.throughput;
                level.completed += stats.completed;
                level.dropped += stats.dropped;
                for (name, component) in &stats.components {
                    *level.utilization.entry(name.clone()).or_default() += component.utilization;
                }
            }
            if level.runs > 0 {
                let n = level.runs as f64;
                level.mean_latency /= n;
                level.mean_p50 /= n;
                level.mean_p99 /= n;
                level.mean_throughput /= n;
                for value in level.utilization.values_mut() {
                    *value /= n;
                }
            }
            level
        })
        .collect()
}
