//! Declarative description of one simulation run.
//!
//! Everything here is plain serde data so experiment files can be written in
//! TOML. [`SimulationConfig::validate`] catches every wiring and parameter
//! error before any simulated time elapses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::components::{ArrivalProcess, ContentionModel, PolicyConfig, ServiceTime};
use crate::engine::SimTime;
use crate::error::ConfigError;
use crate::resource::{Discipline, OverflowPolicy};

/// Smallest positive arrival rate. Slower rates push arrival times out of range.
const MIN_RATE: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// Configuration Structs
// ------------------------------------------------------------------------------------------------

/// Complete input of a single run: what to build, what to feed it, when to stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Components and their wiring
    pub topology: TopologyConfig,
    /// Arrival process feeding the entry component
    pub workload: WorkloadConfig,
    /// Stop condition
    pub horizon: Horizon,
    /// Seed of the run's random source
    #[serde(default)]
    pub seed: u64,
    /// Stop early once the last five latencies all exceed this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instability_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Components in build order. A component's position is its identifier.
    pub components: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentConfig {
    Server {
        name: String,
        /// Number of execution slots
        threads: usize,
        service: ServiceTime,
        /// Successor; requests complete here when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
    },
    Queue {
        name: String,
        /// Unbounded when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capacity: Option<usize>,
        #[serde(default)]
        overflow: OverflowPolicy,
        #[serde(default)]
        discipline: Discipline,
        /// Server whose workers drain this queue
        feeds: String,
    },
    LoadBalancer {
        name: String,
        policy: PolicyConfig,
        targets: Vec<String>,
    },
    Link {
        name: String,
        latency: SimTime,
        transmission_time: SimTime,
        /// Concurrent transmissions; unbounded when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bandwidth: Option<usize>,
        #[serde(default)]
        contention: ContentionModel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
    },
}

impl ComponentConfig {
    pub fn name(&self) -> &str {
        match self {
            ComponentConfig::Server { name, .. }
            | ComponentConfig::Queue { name, .. }
            | ComponentConfig::LoadBalancer { name, .. }
            | ComponentConfig::Link { name, .. } => name,
        }
    }

    /// Components a request may move to from this one.
    fn successors(&self) -> Vec<&str> {
        match self {
            ComponentConfig::Server { next, .. } | ComponentConfig::Link { next, .. } => {
                next.iter().map(String::as_str).collect()
            }
            ComponentConfig::Queue { feeds, .. } => vec![feeds.as_str()],
            ComponentConfig::LoadBalancer { targets, .. } => {
                targets.iter().map(String::as_str).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Component every generated request enters first
    pub entry: String,
    #[serde(default)]
    pub arrivals: ArrivalProcess,
    /// Mean arrivals per unit of virtual time; overridden by sweep load levels
    pub rate: f64,
    /// Stop generating after this many requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u64>,
    /// Completions excluded from latency statistics
    #[serde(default)]
    pub warmup_requests: u64,
    /// Relative weight of each priority class, class 0 first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priority_weights: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Horizon {
    /// Run for a fixed span of virtual time
    Duration { time: SimTime },
    /// Run until this many requests have completed
    Requests { count: u64 },
}

// ------------------------------------------------------------------------------------------------
// Validation
// ------------------------------------------------------------------------------------------------

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let index = self.component_index()?;
        let components = &self.topology.components;
        let mut fed_by: HashMap<&str, usize> = HashMap::new();

        for (i, component) in components.iter().enumerate() {
            let field = component_field(i);
            match component {
                ComponentConfig::Server {
                    threads, service, ..
                } => {
                    if *threads == 0 {
                        return Err(ConfigError::NonPositiveCapacity {
                            field: format!("{field}.threads"),
                        });
                    }
                    service.validate(&format!("{field}.service"))?;
                }
                ComponentConfig::Queue {
                    capacity, feeds, ..
                } => {
                    if *capacity == Some(0) {
                        return Err(ConfigError::NonPositiveCapacity {
                            field: format!("{field}.capacity"),
                        });
                    }
                    let target = lookup(&index, feeds, &format!("{field}.feeds"))?;
                    if !matches!(components[target], ComponentConfig::Server { .. }) {
                        return Err(ConfigError::invalid(
                            format!("{field}.feeds"),
                            format!("'{feeds}' is not a server"),
                        ));
                    }
                    if fed_by.insert(feeds.as_str(), i).is_some() {
                        return Err(ConfigError::invalid(
                            format!("{field}.feeds"),
                            format!("server '{feeds}' is already fed by another queue"),
                        ));
                    }
                }
                ComponentConfig::LoadBalancer {
                    policy, targets, ..
                } => {
                    if targets.is_empty() {
                        return Err(ConfigError::invalid(
                            format!("{field}.targets"),
                            "a load balancer needs at least one target",
                        ));
                    }
                    policy.build(&format!("{field}.policy"), targets.len())?;
                }
                ComponentConfig::Link {
                    latency,
                    transmission_time,
                    bandwidth,
                    contention,
                    ..
                } => {
                    if *bandwidth == Some(0) {
                        return Err(ConfigError::NonPositiveCapacity {
                            field: format!("{field}.bandwidth"),
                        });
                    }
                    for (value, name) in [
                        (latency, "latency"),
                        (transmission_time, "transmission_time"),
                    ] {
                        if !(value.is_finite() && *value >= 0.0) {
                            return Err(ConfigError::invalid(
                                format!("{field}.{name}"),
                                "must be a non-negative number",
                            ));
                        }
                    }
                    if let ContentionModel::Linear { per_flow } = contention {
                        if !(per_flow.is_finite() && *per_flow >= 0.0) {
                            return Err(ConfigError::invalid(
                                format!("{field}.contention.per_flow"),
                                "must be a non-negative number",
                            ));
                        }
                    }
                }
            }
        }

        // Every reference must resolve, and servers drained by a queue only
        // take work from that queue.
        for (i, component) in components.iter().enumerate() {
            let field = component_field(i);
            let reference_field = match component {
                ComponentConfig::LoadBalancer { .. } => format!("{field}.targets"),
                ComponentConfig::Queue { .. } => continue,
                _ => format!("{field}.next"),
            };
            for name in component.successors() {
                lookup(&index, name, &reference_field)?;
                if fed_by.contains_key(name) {
                    return Err(ConfigError::invalid(
                        reference_field,
                        format!("server '{name}' is fed by a queue; route to the queue instead"),
                    ));
                }
            }
        }

        self.validate_workload(&index, &fed_by)?;
        self.validate_horizon()?;
        self.check_cycles(&index)
    }

    fn validate_workload(
        &self,
        index: &HashMap<&str, usize>,
        fed_by: &HashMap<&str, usize>,
    ) -> Result<(), ConfigError> {
        let workload = &self.workload;
        lookup(index, &workload.entry, "workload.entry")?;
        if fed_by.contains_key(workload.entry.as_str()) {
            return Err(ConfigError::invalid(
                "workload.entry",
                format!("server '{}' is fed by a queue", workload.entry),
            ));
        }
        if !(workload.rate.is_finite() && workload.rate >= 0.0) {
            return Err(ConfigError::invalid(
                "workload.rate",
                "must be a non-negative number",
            ));
        }
        if workload.rate > 0.0 && workload.rate < MIN_RATE {
            return Err(ConfigError::invalid(
                "workload.rate",
                format!("positive rates must be at least {MIN_RATE}"),
            ));
        }
        if let ArrivalProcess::Scripted { times } = &workload.arrivals {
            if times.iter().any(|t| !(t.is_finite() && *t >= 0.0)) {
                return Err(ConfigError::invalid(
                    "workload.arrivals.times",
                    "arrival times must be non-negative numbers",
                ));
            }
        }
        if !workload.priority_weights.is_empty() {
            let valid = workload
                .priority_weights
                .iter()
                .all(|w| w.is_finite() && *w >= 0.0);
            if !valid || workload.priority_weights.iter().sum::<f64>() <= 0.0 {
                return Err(ConfigError::invalid(
                    "workload.priority_weights",
                    "weights must be non-negative with a positive sum",
                ));
            }
        }
        if let Some(threshold) = self.instability_threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(ConfigError::invalid(
                    "instability_threshold",
                    "must be a positive number",
                ));
            }
        }
        Ok(())
    }

    fn validate_horizon(&self) -> Result<(), ConfigError> {
        match self.horizon {
            Horizon::Duration { time } if !(time.is_finite() && time > 0.0) => Err(
                ConfigError::invalid("horizon.time", "must be a positive number"),
            ),
            Horizon::Requests { count: 0 } => Err(ConfigError::invalid(
                "horizon.count",
                "must be positive",
            )),
            _ => Ok(()),
        }
    }

    /// Rejects routing loops, which would let a request circulate forever.
    fn check_cycles(&self, index: &HashMap<&str, usize>) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Active,
            Finished,
        }

        let components = &self.topology.components;
        let mut marks = vec![Mark::Unvisited; components.len()];
        for root in 0..components.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::Active;
            while let Some((node, edge)) = stack.pop() {
                let successors = components[node].successors();
                match successors.get(edge) {
                    Some(name) => {
                        stack.push((node, edge + 1));
                        let Some(&next) = index.get(*name) else {
                            continue;
                        };
                        match marks[next] {
                            Mark::Active => {
                                return Err(ConfigError::invalid(
                                    component_field(node),
                                    format!(
                                        "routing cycle through '{}' and '{}'",
                                        components[node].name(),
                                        name
                                    ),
                                ));
                            }
                            Mark::Unvisited => {
                                marks[next] = Mark::Active;
                                stack.push((next, 0));
                            }
                            Mark::Finished => {}
                        }
                    }
                    None => marks[node] = Mark::Finished,
                }
            }
        }
        Ok(())
    }

    /// Maps component names to build-order positions, rejecting duplicates.
    pub(crate) fn component_index(&self) -> Result<HashMap<&str, usize>, ConfigError> {
        let components = &self.topology.components;
        if components.is_empty() {
            return Err(ConfigError::invalid(
                "topology.components",
                "at least one component is required",
            ));
        }
        let mut index = HashMap::new();
        for (i, component) in components.iter().enumerate() {
            if index.insert(component.name(), i).is_some() {
                return Err(ConfigError::DuplicateComponent {
                    field: format!("{}.name", component_field(i)),
                    name: component.name().to_string(),
                });
            }
        }
        Ok(index)
    }

    // --------------------------------------------------------------------------------------------
    // Helpers used by the sweep harness
    // --------------------------------------------------------------------------------------------

    /// Arrival rate at which the bottleneck reachable from the workload entry
    /// is fully busy.
    ///
    /// A server caps the path at `threads / mean` and at whatever follows it,
    /// a queue passes on its server's rate and a balancer adds up its targets.
    /// Links do not limit the rate. Returns 0 when nothing on the path does.
    pub fn saturation_rate(&self) -> f64 {
        let components = &self.topology.components;
        let index: HashMap<&str, usize> = components
            .iter()
            .enumerate()
            .map(|(i, component)| (component.name(), i))
            .collect();
        let mut visiting = vec![false; components.len()];
        let rate = self.path_capacity(&index, &mut visiting, &self.workload.entry);
        if rate.is_finite() {
            rate
        } else {
            0.0
        }
    }

    fn path_capacity(
        &self,
        index: &HashMap<&str, usize>,
        visiting: &mut [bool],
        name: &str,
    ) -> f64 {
        let Some(&i) = index.get(name) else {
            return f64::INFINITY;
        };
        if visiting[i] {
            return f64::INFINITY;
        }
        visiting[i] = true;
        let downstream =
            |visiting: &mut [bool], next: &Option<String>| match next.as_deref() {
                Some(next) => self.path_capacity(index, visiting, next),
                None => f64::INFINITY,
            };
        let rate = match &self.topology.components[i] {
            ComponentConfig::Server {
                threads,
                service,
                next,
                ..
            } => {
                let own = if service.mean() > 0.0 {
                    *threads as f64 / service.mean()
                } else {
                    f64::INFINITY
                };
                own.min(downstream(visiting, next))
            }
            ComponentConfig::Queue { feeds, .. } => self.path_capacity(index, visiting, feeds),
            ComponentConfig::LoadBalancer { targets, .. } => targets
                .iter()
                .map(|target| self.path_capacity(index, visiting, target))
                .sum(),
            ComponentConfig::Link { next, .. } => downstream(visiting, next),
        };
        visiting[i] = false;
        rate
    }

    pub fn with_load(mut self, rate: f64) -> Self {
        self.workload.rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

pub(crate) fn component_field(i: usize) -> String {
    format!("topology.components[{i}]")
}

fn lookup(index: &HashMap<&str, usize>, name: &str, field: &str) -> Result<usize, ConfigError> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownComponent {
            field: field.to_string(),
            name: name.to_string(),
        })
}
