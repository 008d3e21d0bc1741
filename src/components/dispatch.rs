//! Load-balancer dispatch policies.

use std::fmt::Debug;

use rand::seq::index;
use rand::RngCore;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::NodeId;

/// A downstream target as seen by a policy: its id and current in-flight count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: NodeId,
    pub load: usize,
}

/// Picks one of `candidates` for the next request.
///
/// Returns an index into `candidates`, or `None` if the request has to wait at
/// the balancer. Policies that need randomness must draw it from `rng`.
pub trait DispatchPolicy: Send + Debug {
    fn select(&mut self, candidates: &[Candidate], rng: &mut dyn RngCore) -> Option<usize>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RoundRobin,
    Random,
    ShortestQueue,
    PowerOfD,
    BoundedShortestQueue,
}

/// Configuration form of a policy. `d` and `bound` are only read by the
/// policies that need them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<usize>,
}

impl PolicyConfig {
    pub fn new(kind: PolicyKind) -> Self {
        Self {
            kind,
            d: None,
            bound: None,
        }
    }

    pub fn power_of_d(d: usize) -> Self {
        Self {
            d: Some(d),
            ..Self::new(PolicyKind::PowerOfD)
        }
    }

    pub fn bounded(bound: usize) -> Self {
        Self {
            bound: Some(bound),
            ..Self::new(PolicyKind::BoundedShortestQueue)
        }
    }

    pub fn build(
        &self,
        field: &str,
        targets: usize,
    ) -> Result<Box<dyn DispatchPolicy>, ConfigError> {
        Ok(match self.kind {
            PolicyKind::RoundRobin => Box::new(RoundRobin::default()),
            PolicyKind::Random => Box::new(RandomChoice),
            PolicyKind::ShortestQueue => Box::new(ShortestQueue),
            PolicyKind::PowerOfD => {
                let d = self.d.ok_or_else(|| ConfigError::MissingParameter {
                    field: field.to_string(),
                    parameter: "d",
                })?;
                if d == 0 || d > targets {
                    return Err(ConfigError::invalid(
                        format!("{field}.d"),
                        format!("d must lie in 1..={targets}, got {d}"),
                    ));
                }
                Box::new(PowerOfD { d })
            }
            PolicyKind::BoundedShortestQueue => {
                let bound = self.bound.ok_or_else(|| ConfigError::MissingParameter {
                    field: field.to_string(),
                    parameter: "bound",
                })?;
                if bound == 0 {
                    return Err(ConfigError::NonPositiveCapacity {
                        field: format!("{field}.bound"),
                    });
                }
                Box::new(BoundedShortestQueue { bound })
            }
        })
    }
}

/// Index of the least-loaded candidate, ties to the lowest id.
fn least_loaded(candidates: &[Candidate], among: impl Iterator<Item = usize>) -> Option<usize> {
    among.min_by_key(|&i| (candidates[i].load, candidates[i].id))
}

#[derive(Debug, Default)]
pub struct RoundRobin {
    next: usize,
}

impl DispatchPolicy for RoundRobin {
    fn select(&mut self, candidates: &[Candidate], _rng: &mut dyn RngCore) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let chosen = self.next % candidates.len();
        self.next = (chosen + 1) % candidates.len();
        Some(chosen)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[derive(Debug)]
pub struct RandomChoice;

impl DispatchPolicy for RandomChoice {
    fn select(&mut self, candidates: &[Candidate], rng: &mut dyn RngCore) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        Some(Uniform::new(0, candidates.len()).sample(rng))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[derive(Debug)]
pub struct ShortestQueue;

impl DispatchPolicy for ShortestQueue {
    fn select(&mut self, candidates: &[Candidate], _rng: &mut dyn RngCore) -> Option<usize> {
        least_loaded(candidates, 0..candidates.len())
    }

    fn name(&self) -> &'static str {
        "shortest_queue"
    }
}

/// Samples `d` distinct candidates and picks the least loaded of them.
#[derive(Debug)]
pub struct PowerOfD {
    d: usize,
}

impl DispatchPolicy for PowerOfD {
    fn select(&mut self, candidates: &[Candidate], rng: &mut dyn RngCore) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let amount = self.d.min(candidates.len());
        let sampled = index::sample(rng, candidates.len(), amount);
        least_loaded(candidates, sampled.into_iter())
    }

    fn name(&self) -> &'static str {
        "power_of_d"
    }
}

/// Join-bounded-shortest-queue: like shortest-queue, but refuses to dispatch
/// while every candidate already holds `bound` requests.
#[derive(Debug)]
pub struct BoundedShortestQueue {
    bound: usize,
}

impl DispatchPolicy for BoundedShortestQueue {
    fn select(&mut self, candidates: &[Candidate], _rng: &mut dyn RngCore) -> Option<usize> {
        least_loaded(candidates, 0..candidates.len()).filter(|&i| candidates[i].load < self.bound)
    }

    fn name(&self) -> &'static str {
        "bounded_shortest_queue"
    }
}
