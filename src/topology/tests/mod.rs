mod config_errors;
mod resources;

use crate::components::{ArrivalProcess, ContentionModel, PolicyConfig, ServiceTime};
use crate::resource::{Discipline, OverflowPolicy};
use crate::topology::{ComponentConfig, Horizon, SimulationConfig, TopologyConfig, WorkloadConfig};

pub(crate) fn server(
    name: &str,
    threads: usize,
    service: ServiceTime,
    next: Option<&str>,
) -> ComponentConfig {
    ComponentConfig::Server {
        name: name.to_string(),
        threads,
        service,
        next: next.map(str::to_string),
    }
}

pub(crate) fn queue(
    name: &str,
    capacity: Option<usize>,
    overflow: OverflowPolicy,
    feeds: &str,
) -> ComponentConfig {
    ComponentConfig::Queue {
        name: name.to_string(),
        capacity,
        overflow,
        discipline: Discipline::Fifo,
        feeds: feeds.to_string(),
    }
}

pub(crate) fn balancer(name: &str, policy: PolicyConfig, targets: &[&str]) -> ComponentConfig {
    ComponentConfig::LoadBalancer {
        name: name.to_string(),
        policy,
        targets: targets.iter().map(|t| t.to_string()).collect(),
    }
}

pub(crate) fn link(
    name: &str,
    latency: f64,
    transmission_time: f64,
    bandwidth: Option<usize>,
    contention: ContentionModel,
) -> ComponentConfig {
    ComponentConfig::Link {
        name: name.to_string(),
        latency,
        transmission_time,
        bandwidth,
        contention,
        next: None,
    }
}

pub(crate) fn fixed(value: f64) -> ServiceTime {
    ServiceTime::Deterministic { value }
}

/// Arrivals at the given instants, entering `entry`.
pub(crate) fn scripted(
    components: Vec<ComponentConfig>,
    entry: &str,
    times: &[f64],
) -> SimulationConfig {
    SimulationConfig {
        topology: TopologyConfig { components },
        workload: WorkloadConfig {
            entry: entry.to_string(),
            arrivals: ArrivalProcess::Scripted {
                times: times.to_vec(),
            },
            rate: 1.0,
            max_requests: None,
            warmup_requests: 0,
            priority_weights: Vec::new(),
        },
        horizon: Horizon::Duration { time: 1_000.0 },
        seed: 0,
        instability_threshold: None,
    }
}

/// One single-threaded server with exponential service of mean 1, fed by
/// Poisson arrivals at `rate`.
pub(crate) fn single_server(rate: f64) -> SimulationConfig {
    SimulationConfig {
        topology: TopologyConfig {
            components: vec![server(
                "server",
                1,
                ServiceTime::Exponential { mean: 1.0 },
                None,
            )],
        },
        workload: WorkloadConfig {
            entry: "server".to_string(),
            arrivals: ArrivalProcess::Poisson,
            rate,
            max_requests: None,
            warmup_requests: 0,
            priority_weights: Vec::new(),
        },
        horizon: Horizon::Duration { time: 200.0 },
        seed: 1,
        instability_threshold: None,
    }
}
