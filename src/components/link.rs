use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::engine::SimTime;
use crate::error::SimError;
use crate::resource::{Acquire, CapacityResource, ResourceId};

use super::{Ctx, Flow, NodeId, RequestId, RequestState, Step};

/// How concurrent transmissions inflate each other's transmission time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentionModel {
    /// Transmissions do not interfere.
    #[default]
    None,
    /// Each additional concurrent flow adds `per_flow` of the base time.
    Linear { per_flow: f64 },
    /// Bandwidth is split evenly among the active flows.
    Shared,
}

impl ContentionModel {
    /// Multiplier applied to the transmission time with `active` flows on the link.
    pub fn factor(&self, active: usize) -> f64 {
        let active = active.max(1) as f64;
        match self {
            ContentionModel::None => 1.0,
            ContentionModel::Linear { per_flow } => 1.0 + per_flow * (active - 1.0),
            ContentionModel::Shared => active,
        }
    }
}

/// Fixed propagation latency plus a contended transmission.
#[derive(Debug)]
pub struct Link {
    pub name: String,
    pub latency: SimTime,
    pub transmission_time: SimTime,
    pub slots: CapacityResource,
    pub contention: ContentionModel,
    pub next: Option<NodeId>,
    pub transmitted: u64,
}

impl Link {
    pub fn new(
        name: String,
        resource: ResourceId,
        latency: SimTime,
        transmission_time: SimTime,
        bandwidth: Option<usize>,
        contention: ContentionModel,
        next: Option<NodeId>,
    ) -> Self {
        Self {
            name,
            latency,
            transmission_time,
            slots: CapacityResource::new(resource, bandwidth),
            contention,
            next,
            transmitted: 0,
        }
    }

    pub fn arrive(
        &mut self,
        ctx: &mut Ctx<'_>,
        node: NodeId,
        request: RequestId,
    ) -> Result<Flow, SimError> {
        let pid = ctx.requests[request.0].pid;
        match self.slots.acquire(pid, ctx.engine.now())? {
            Acquire::Granted => self.transmit(ctx, node, request),
            Acquire::Queued { .. } => {
                ctx.requests[request.0].state = RequestState::Queued;
                ctx.processes
                    .suspend(pid, Step::Granted { node }, Some(self.slots.id()))?;
                Ok(Flow::Parked)
            }
        }
    }

    pub fn transmit(
        &mut self,
        ctx: &mut Ctx<'_>,
        node: NodeId,
        request: RequestId,
    ) -> Result<Flow, SimError> {
        let pid = ctx.requests[request.0].pid;
        let delay = self.delay(self.slots.in_use());
        trace!(link = %self.name, %request, delay, "transmitting");
        ctx.processes.suspend(pid, Step::Done { node }, None)?;
        ctx.engine.schedule_after(delay, pid)?;
        Ok(Flow::Parked)
    }

    pub fn done(&mut self, ctx: &mut Ctx<'_>, request: RequestId) -> Result<Flow, SimError> {
        let pid = ctx.requests[request.0].pid;
        self.transmitted += 1;
        if let Some(next) = self.slots.release(pid, ctx.engine.now())? {
            ctx.engine.schedule_after(0.0, next)?;
        }
        Ok(Flow::Depart)
    }

    /// Delay seen by a transmission starting with `active` flows on the link.
    pub fn delay(&self, active: usize) -> SimTime {
        self.latency + self.transmission_time * self.contention.factor(active)
    }
}
