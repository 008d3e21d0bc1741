use std::collections::VecDeque;

use tracing::trace;

use crate::error::SimError;

use super::{Candidate, Ctx, DispatchPolicy, Flow, NodeId, RequestId, RequestState, Step};

/// Dispatches each arriving request to one of its targets.
///
/// A policy may decline to dispatch (bounded shortest queue). Declined
/// requests wait at the balancer in arrival order and are released by
/// [`release_one`](Self::release_one) when a target frees up; later arrivals
/// line up behind them.
#[derive(Debug)]
pub struct LoadBalancer {
    pub name: String,
    pub targets: Vec<NodeId>,
    pub policy: Box<dyn DispatchPolicy>,
    pub held: VecDeque<RequestId>,
    pub peak_held: usize,
    /// Requests sent to each target, indexed like `targets`.
    pub assignments: Vec<u64>,
}

impl LoadBalancer {
    pub fn new(name: String, targets: Vec<NodeId>, policy: Box<dyn DispatchPolicy>) -> Self {
        let assignments = vec![0; targets.len()];
        Self {
            name,
            targets,
            policy,
            held: VecDeque::new(),
            peak_held: 0,
            assignments,
        }
    }

    /// `backlog` is indexed by node id. For a queue it also counts the
    /// requests its server is serving.
    pub fn arrive(
        &mut self,
        ctx: &mut Ctx<'_>,
        node: NodeId,
        request: RequestId,
        backlog: &[usize],
    ) -> Result<Flow, SimError> {
        if self.held.is_empty() {
            if let Some(target) = self.choose(ctx, backlog) {
                trace!(balancer = %self.name, %request, %target, "dispatched");
                return Ok(Flow::Forward(target));
            }
        }
        let pid = ctx.requests[request.0].pid;
        ctx.requests[request.0].state = RequestState::Queued;
        ctx.processes.suspend(pid, Step::Arrive { node }, None)?;
        self.held.push_back(request);
        self.peak_held = self.peak_held.max(self.held.len());
        trace!(balancer = %self.name, %request, held = self.held.len(), "holding request");
        Ok(Flow::Parked)
    }

    /// Dispatches the oldest held request if the policy now accepts it.
    pub fn release_one(
        &mut self,
        ctx: &mut Ctx<'_>,
        backlog: &[usize],
    ) -> Option<(RequestId, NodeId)> {
        let request = *self.held.front()?;
        let target = self.choose(ctx, backlog)?;
        self.held.pop_front();
        Some((request, target))
    }

    pub fn close(&mut self) {
        self.held.clear();
    }

    fn choose(&mut self, ctx: &mut Ctx<'_>, backlog: &[usize]) -> Option<NodeId> {
        let candidates: Vec<Candidate> = self
            .targets
            .iter()
            .map(|&id| Candidate {
                id,
                load: backlog.get(id.0).copied().unwrap_or_default(),
            })
            .collect();
        let index = self.policy.select(&candidates, &mut *ctx.rng)?;
        let target = candidates.get(index)?.id;
        self.assignments[index] += 1;
        Some(target)
    }
}
