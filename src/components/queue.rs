use tracing::{debug, trace};

use crate::engine::ProcessId;
use crate::error::SimError;
use crate::resource::{BoundedQueue, Discipline, Get, Handoff, OverflowPolicy, Put, ResourceId};

use super::{Ctx, Flow, NodeId, RequestId, RequestState, Step};

/// Buffer in front of a server. The server's workers pull from it.
#[derive(Debug)]
pub struct QueueNode {
    pub name: String,
    pub buffer: BoundedQueue<RequestId>,
    pub feeds: NodeId,
}

impl QueueNode {
    pub fn new(
        name: String,
        resource: ResourceId,
        capacity: Option<usize>,
        discipline: Discipline,
        overflow: OverflowPolicy,
        feeds: NodeId,
    ) -> Self {
        Self {
            name,
            buffer: BoundedQueue::new(resource, capacity, discipline, overflow),
            feeds,
        }
    }

    /// Puts the request into the buffer and parks its process there.
    pub fn arrive(&mut self, ctx: &mut Ctx<'_>, request: RequestId) -> Result<Flow, SimError> {
        let now = ctx.engine.now();
        let (pid, priority) = {
            let r = &ctx.requests[request.0];
            (r.pid, r.priority)
        };
        match self.buffer.put(pid, priority, request, now)? {
            Put::Accepted { wake } => {
                if let Some(worker) = wake {
                    ctx.engine.schedule_after(0.0, worker)?;
                }
                self.park(ctx, pid, request, None)
            }
            Put::Blocked => {
                trace!(queue = %self.name, %request, "producer blocked on full queue");
                self.park(ctx, pid, request, Some(self.buffer.id()))
            }
            Put::Dropped(_) => {
                debug!(queue = %self.name, %request, "dropped on full queue");
                ctx.requests[request.0].drop_at();
                Ok(Flow::Dropped)
            }
        }
    }

    /// A worker asks for work. `None` means it is now parked on the buffer.
    pub fn pull(
        &mut self,
        ctx: &mut Ctx<'_>,
        queue: NodeId,
        worker: ProcessId,
    ) -> Result<Option<RequestId>, SimError> {
        let now = ctx.engine.now();
        match self.buffer.get(worker, now)? {
            Get::Item { item, handoff } => {
                self.hand_off(ctx, handoff)?;
                Ok(Some(item))
            }
            Get::Waiting => {
                ctx.processes.suspend(
                    worker,
                    Step::WorkerTake {
                        server: self.feeds,
                        queue,
                    },
                    Some(self.buffer.id()),
                )?;
                Ok(None)
            }
        }
    }

    /// A woken worker claims the request reserved for it.
    pub fn take(&mut self, ctx: &mut Ctx<'_>, worker: ProcessId) -> Result<RequestId, SimError> {
        let now = ctx.engine.now();
        match self.buffer.take(worker, now)? {
            Get::Item { item, handoff } => {
                self.hand_off(ctx, handoff)?;
                Ok(item)
            }
            Get::Waiting => Err(SimError::StaleProcess(worker)),
        }
    }

    fn park(
        &mut self,
        ctx: &mut Ctx<'_>,
        pid: ProcessId,
        request: RequestId,
        blocked_on: Option<ResourceId>,
    ) -> Result<Flow, SimError> {
        ctx.requests[request.0].state = RequestState::Queued;
        ctx.processes.suspend(
            pid,
            Step::AwaitService { server: self.feeds },
            blocked_on,
        )?;
        Ok(Flow::Parked)
    }

    fn hand_off(&mut self, ctx: &mut Ctx<'_>, handoff: Handoff) -> Result<(), SimError> {
        if let Some(producer) = handoff.unblocked {
            // The producer's request now sits in the buffer; it stays parked.
            ctx.processes.suspend(
                producer,
                Step::AwaitService { server: self.feeds },
                None,
            )?;
        }
        if let Some(worker) = handoff.wake {
            ctx.engine.schedule_after(0.0, worker)?;
        }
        Ok(())
    }
}
