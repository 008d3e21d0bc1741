use tracing::trace;

use crate::engine::ProcessId;
use crate::error::SimError;
use crate::resource::{Acquire, CapacityResource, ResourceId};

use super::{Ctx, Flow, NodeId, RequestId, RequestState, ServiceTimeModel, Step};

/// `threads` identical execution slots in front of a service-time model.
///
/// In push mode the request process itself acquires a slot. A server fed by a
/// queue instead runs one worker process per thread that pulls requests out
/// of the queue.
#[derive(Debug)]
pub struct Server {
    pub name: String,
    pub threads: usize,
    pub slots: CapacityResource,
    pub service: Box<dyn ServiceTimeModel>,
    pub next: Option<NodeId>,
    pub served: u64,
}

impl Server {
    pub fn new(
        name: String,
        resource: ResourceId,
        threads: usize,
        service: Box<dyn ServiceTimeModel>,
        next: Option<NodeId>,
    ) -> Self {
        Self {
            name,
            threads,
            slots: CapacityResource::new(resource, Some(threads)),
            service,
            next,
            served: 0,
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
            Acquire::Granted => self.start(ctx, node, request),
            Acquire::Queued { position } => {
                trace!(server = %self.name, %request, position, "waiting for a thread");
                ctx.requests[request.0].state = RequestState::Queued;
                ctx.processes
                    .suspend(pid, Step::Granted { node }, Some(self.slots.id()))?;
                Ok(Flow::Parked)
            }
        }
    }

    /// Resumes a request that was handed a slot on release.
    pub fn granted(
        &mut self,
        ctx: &mut Ctx<'_>,
        node: NodeId,
        request: RequestId,
    ) -> Result<Flow, SimError> {
        self.start(ctx, node, request)
    }

    pub fn done(&mut self, ctx: &mut Ctx<'_>, request: RequestId) -> Result<Flow, SimError> {
        let now = ctx.engine.now();
        let pid = ctx.requests[request.0].pid;
        ctx.requests[request.0].end_service(now);
        self.served += 1;
        if let Some(next) = self.slots.release(pid, now)? {
            ctx.engine.schedule_after(0.0, next)?;
        }
        Ok(Flow::Depart)
    }

    fn start(
        &mut self,
        ctx: &mut Ctx<'_>,
        node: NodeId,
        request: RequestId,
    ) -> Result<Flow, SimError> {
        let demand = self.service.sample(&mut *ctx.rng);
        let pid = ctx.requests[request.0].pid;
        ctx.requests[request.0].start_service(ctx.engine.now(), demand);
        trace!(server = %self.name, %request, demand, "service started");
        ctx.processes.suspend(pid, Step::Done { node }, None)?;
        ctx.engine.schedule_after(demand, pid)?;
        Ok(Flow::Parked)
    }

    /// Worker `worker` has pulled `request` out of the feeding queue.
    pub fn worker_begin(
        &mut self,
        ctx: &mut Ctx<'_>,
        server: NodeId,
        queue: NodeId,
        worker: ProcessId,
        request: RequestId,
    ) -> Result<(), SimError> {
        match self.slots.acquire(worker, ctx.engine.now())? {
            Acquire::Granted => self.worker_serve(ctx, server, queue, worker, request),
            Acquire::Queued { .. } => ctx.processes.suspend(
                worker,
                Step::WorkerGranted {
                    server,
                    queue,
                    request,
                },
                Some(self.slots.id()),
            ),
        }
    }

    pub fn worker_serve(
        &mut self,
        ctx: &mut Ctx<'_>,
        server: NodeId,
        queue: NodeId,
        worker: ProcessId,
        request: RequestId,
    ) -> Result<(), SimError> {
        let demand = self.service.sample(&mut *ctx.rng);
        let carrier = ctx.requests[request.0].pid;
        ctx.requests[request.0].start_service(ctx.engine.now(), demand);
        trace!(server = %self.name, %request, %worker, demand, "worker started service");
        ctx.processes
            .suspend(carrier, Step::Served { server }, None)?;
        ctx.processes.suspend(
            worker,
            Step::WorkerDone {
                server,
                queue,
                request,
            },
            None,
        )?;
        ctx.engine.schedule_after(demand, worker)?;
        Ok(())
    }

    /// Frees the worker's slot and wakes the request it served.
    pub fn worker_finish(
        &mut self,
        ctx: &mut Ctx<'_>,
        worker: ProcessId,
        request: RequestId,
    ) -> Result<(), SimError> {
        let now = ctx.engine.now();
        ctx.requests[request.0].end_service(now);
        self.served += 1;
        if let Some(next) = self.slots.release(worker, now)? {
            ctx.engine.schedule_after(0.0, next)?;
        }
        let carrier = ctx.requests[request.0].pid;
        ctx.engine.schedule_after(0.0, carrier)?;
        Ok(())
    }
}
