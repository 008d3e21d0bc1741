use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::ComponentKind;
use crate::engine::SimTime;

/// Exact nearest-rank percentile of sorted samples: element `floor(n * p / 100)`,
/// clamped to the last sample. Returns 0 for no samples.
pub fn percentile(sorted: &[f64], perc: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() as f64 * perc / 100.0).floor() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
    /// Every recorded latency, sorted ascending.
    pub samples: Vec<f64>,
}

impl LatencySummary {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.sort_by(f64::total_cmp);
        Self {
            count: samples.len(),
            mean: mean(&samples),
            min: samples.first().copied().unwrap_or_default(),
            max: samples.last().copied().unwrap_or_default(),
            p50: percentile(&samples, 50.0),
            p90: percentile(&samples, 90.0),
            p95: percentile(&samples, 95.0),
            p99: percentile(&samples, 99.0),
            p999: percentile(&samples, 99.9),
            samples,
        }
    }

    pub fn percentile(&self, perc: f64) -> f64 {
        percentile(&self.samples, perc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatistics {
    pub kind: ComponentKind,
    /// Busy time over elapsed time (servers, links), mean occupancy over
    /// capacity (queues), 0 for load balancers.
    pub utilization: f64,
    pub arrivals: u64,
    pub dropped: u64,
    /// Largest number of requests held at once.
    pub peak_occupancy: usize,
}

/// Everything extracted from one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub seed: u64,
    /// Arrival rate the run was driven at.
    pub load_level: f64,
    pub elapsed: SimTime,
    pub generated: u64,
    pub completed: u64,
    pub dropped: u64,
    /// Requests still inside the topology when the run stopped.
    pub in_flight: u64,
    /// Completions per unit of virtual time.
    pub throughput: f64,
    /// Latencies of completions after warm-up.
    pub latency: LatencySummary,
    pub mean_queueing_time: f64,
    pub mean_service_time: f64,
    pub components: BTreeMap<String, ComponentStatistics>,
    /// Stopped early by the instability check.
    pub unstable: bool,
    pub events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 50.0), 6.0);
        assert_eq!(percentile(&sorted, 99.0), 10.0);
        assert_eq!(percentile(&sorted, 100.0), 10.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_summary_sorts_samples() {
        let summary = LatencySummary::from_samples(vec![3.0, 1.0, 2.0, 4.0]);
        assert_eq!(summary.samples, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, 2.5);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.p50, 3.0);
    }

    #[test]
    fn test_empty_summary_has_no_nan() {
        let summary = LatencySummary::from_samples(Vec::new());
        assert_eq!(summary, LatencySummary::default());
    }
}
