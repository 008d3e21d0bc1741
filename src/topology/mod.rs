//! Builds a component graph from a [`SimulationConfig`], drives it with one
//! [`Engine`], and extracts [`RunStatistics`] when the run ends.

pub mod config;
pub mod stats;

pub use config::{ComponentConfig, Horizon, SimulationConfig, TopologyConfig, WorkloadConfig};
pub use stats::{percentile, ComponentStatistics, LatencySummary, RunStatistics};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, WeightedIndex};
use tracing::{debug, info, trace, warn};

use crate::components::{
    ArrivalSource, Ctx, Flow, LoadBalancer, Link, Node, NodeId, QueueNode, Request, RequestId,
    Server, Step,
};
use crate::engine::{Dispatcher, Engine, Event, ProcessId, ProcessTable, RunSummary, SimTime, Until};
use crate::error::{ConfigError, SimError};
use crate::resource::ResourceId;
use crate::sweep::CancelFlag;

use config::component_field;

#[cfg(test)]
pub(crate) mod tests;

/// Wall-clock and cancellation checks run once per this many events.
const LIMIT_CHECK_INTERVAL: u64 = 256;
/// Number of consecutive slow completions that mark a run unstable.
const INSTABILITY_WINDOW: usize = 5;

#[derive(Debug, Default)]
struct RunLimits {
    deadline: Option<(Instant, Duration)>,
    cancel: Option<CancelFlag>,
}

#[derive(Debug)]
struct Source {
    entry: NodeId,
    arrivals: ArrivalSource,
}

/// Borrowed view handed to component steps.
struct Parts<'a> {
    nodes: &'a mut [Node],
    backlog: &'a [usize],
    ctx: Ctx<'a>,
}

/// Everything in a run except the engine: components, processes, requests,
/// the run's random source and the counters statistics are built from.
#[derive(Debug)]
pub struct World {
    nodes: Vec<Node>,
    in_flight: Vec<usize>,
    peak_in_flight: Vec<usize>,
    arrivals: Vec<u64>,
    dropped_at: Vec<u64>,
    /// Dispatch load seen by balancers. A queue also counts the requests its
    /// server is still serving.
    backlog: Vec<usize>,
    /// Feeding queue of each queue-fed server.
    fed_by: Vec<Option<NodeId>>,
    /// Balancers to notify when a node's backlog drops.
    watchers: Vec<Vec<NodeId>>,
    processes: ProcessTable<Step>,
    requests: Vec<Request>,
    carried: HashMap<ProcessId, RequestId>,
    rng: ChaCha8Rng,
    sources: Vec<Source>,
    priorities: Option<WeightedIndex<f64>>,
    warmup: u64,
    generated: u64,
    completed: u64,
    dropped: u64,
    latencies: Vec<f64>,
    queueing: Vec<f64>,
    service: Vec<f64>,
    recent: VecDeque<f64>,
    instability_threshold: Option<f64>,
    unstable: bool,
    limits: RunLimits,
}

impl Dispatcher<ProcessId> for World {
    fn dispatch(
        &mut self,
        engine: &mut Engine<ProcessId>,
        event: Event<ProcessId>,
    ) -> Result<(), SimError> {
        // Checked on the first event and every interval after it.
        if engine.dispatched() % LIMIT_CHECK_INTERVAL == 1 {
            self.check_limits()?;
        }
        let pid = event.payload;
        let step = self.processes.resume(pid)?;
        trace!(time = event.time, %pid, ?step, "resume");
        match step {
            Step::Generate { source } => self.generate(engine, pid, source),
            Step::Arrive { node } => {
                let request = self.carried_by(pid)?;
                self.arrive(engine, pid, request, node)
            }
            Step::Granted { node } => {
                let request = self.carried_by(pid)?;
                let flow = {
                    let mut parts = self.parts(engine);
                    match &mut parts.nodes[node.0] {
                        Node::Server(server) => server.granted(&mut parts.ctx, node, request)?,
                        Node::Link(link) => link.transmit(&mut parts.ctx, node, request)?,
                        _ => return Err(SimError::StaleProcess(pid)),
                    }
                };
                self.after(engine, pid, request, node, flow)
            }
            Step::Done { node } => {
                let request = self.carried_by(pid)?;
                let flow = {
                    let mut parts = self.parts(engine);
                    match &mut parts.nodes[node.0] {
                        Node::Server(server) => server.done(&mut parts.ctx, request)?,
                        Node::Link(link) => link.done(&mut parts.ctx, request)?,
                        _ => return Err(SimError::StaleProcess(pid)),
                    }
                };
                self.after(engine, pid, request, node, flow)
            }
            // The worker already left the server on its behalf.
            Step::Served { server } => {
                let request = self.carried_by(pid)?;
                self.proceed(engine, pid, request, server)
            }
            // Requests in a queue are resumed through `Served`, never directly.
            Step::AwaitService { .. } => Err(SimError::StaleProcess(pid)),
            Step::WorkerPoll { server, queue } => self.worker_poll(engine, pid, server, queue),
            Step::WorkerTake { server, queue } => {
                let request = {
                    let mut parts = self.parts(engine);
                    match &mut parts.nodes[queue.0] {
                        Node::Queue(q) => q.take(&mut parts.ctx, pid)?,
                        _ => return Err(SimError::StaleProcess(pid)),
                    }
                };
                self.worker_begin(engine, pid, server, queue, request)
            }
            Step::WorkerGranted {
                server,
                queue,
                request,
            } => {
                let mut parts = self.parts(engine);
                match &mut parts.nodes[server.0] {
                    Node::Server(s) => s.worker_serve(&mut parts.ctx, server, queue, pid, request),
                    _ => Err(SimError::StaleProcess(pid)),
                }
            }
            Step::WorkerDone {
                server,
                queue,
                request,
            } => {
                {
                    let mut parts = self.parts(engine);
                    match &mut parts.nodes[server.0] {
                        Node::Server(s) => s.worker_finish(&mut parts.ctx, pid, request)?,
                        _ => return Err(SimError::StaleProcess(pid)),
                    }
                }
                self.leave(engine, server)?;
                self.worker_poll(engine, pid, server, queue)
            }
        }
    }

    fn completed(&self) -> u64 {
        self.completed
    }

    fn halted(&self) -> bool {
        self.unstable
    }
}

impl World {
    fn parts<'a>(&'a mut self, engine: &'a mut Engine<ProcessId>) -> Parts<'a> {
        Parts {
            nodes: &mut self.nodes,
            backlog: &self.backlog,
            ctx: Ctx {
                engine,
                processes: &mut self.processes,
                requests: &mut self.requests,
                rng: &mut self.rng,
            },
        }
    }

    fn carried_by(&self, pid: ProcessId) -> Result<RequestId, SimError> {
        self.carried
            .get(&pid)
            .copied()
            .ok_or(SimError::StaleProcess(pid))
    }

    fn check_limits(&self) -> Result<(), SimError> {
        if let Some(cancel) = &self.limits.cancel {
            if cancel.is_cancelled() {
                return Err(SimError::Cancelled);
            }
        }
        if let Some((deadline, budget)) = self.limits.deadline {
            if Instant::now() >= deadline {
                return Err(SimError::WallClockExceeded(budget));
            }
        }
        Ok(())
    }

    /// Emits every arrival due now, then sleeps until the next one.
    fn generate(
        &mut self,
        engine: &mut Engine<ProcessId>,
        pid: ProcessId,
        source: usize,
    ) -> Result<(), SimError> {
        let now = engine.now();
        let entry = self.sources[source].entry;
        while self.sources[source]
            .arrivals
            .peek()
            .is_some_and(|time| time <= now)
        {
            self.sources[source].arrivals.advance(&mut self.rng);
            self.emit(engine, entry)?;
        }
        match self.sources[source].arrivals.peek() {
            Some(next) => {
                self.processes
                    .suspend(pid, Step::Generate { source }, None)?;
                engine.schedule_at(next, pid)?;
            }
            None => {
                debug!(source, generated = self.generated, "source exhausted");
                self.processes.finish(pid)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, engine: &mut Engine<ProcessId>, entry: NodeId) -> Result<(), SimError> {
        let priority = match &self.priorities {
            Some(weights) => weights.sample(&mut self.rng) as u32,
            None => 0,
        };
        let pid = self.processes.spawn(Step::Arrive { node: entry })?;
        self.processes.resume(pid)?;
        let id = RequestId(self.requests.len());
        self.requests
            .push(Request::new(id, pid, priority, engine.now()));
        self.carried.insert(pid, id);
        self.generated += 1;
        trace!(request = %id, %pid, priority, "generated");
        self.route(engine, pid, id, entry)
    }

    fn enter(&mut self, request: RequestId, node: NodeId) {
        let i = node.0;
        self.in_flight[i] += 1;
        self.peak_in_flight[i] = self.peak_in_flight[i].max(self.in_flight[i]);
        self.arrivals[i] += 1;
        self.backlog[i] += 1;
        if let Some(queue) = self.fed_by[i] {
            self.backlog[queue.0] += 1;
        }
        self.requests[request.0].path.push(node);
    }

    fn route(
        &mut self,
        engine: &mut Engine<ProcessId>,
        pid: ProcessId,
        request: RequestId,
        node: NodeId,
    ) -> Result<(), SimError> {
        self.enter(request, node);
        self.arrive(engine, pid, request, node)
    }

    fn arrive(
        &mut self,
        engine: &mut Engine<ProcessId>,
        pid: ProcessId,
        request: RequestId,
        node: NodeId,
    ) -> Result<(), SimError> {
        let flow = {
            let mut parts = self.parts(engine);
            match &mut parts.nodes[node.0] {
                Node::Server(server) => server.arrive(&mut parts.ctx, node, request)?,
                Node::Queue(queue) => queue.arrive(&mut parts.ctx, request)?,
                Node::LoadBalancer(lb) => lb.arrive(&mut parts.ctx, node, request, parts.backlog)?,
                Node::Link(link) => link.arrive(&mut parts.ctx, node, request)?,
            }
        };
        self.after(engine, pid, request, node, flow)
    }

    fn after(
        &mut self,
        engine: &mut Engine<ProcessId>,
        pid: ProcessId,
        request: RequestId,
        node: NodeId,
        flow: Flow,
    ) -> Result<(), SimError> {
        match flow {
            Flow::Parked => Ok(()),
            Flow::Depart => self.depart(engine, pid, request, node),
            Flow::Forward(target) => {
                self.leave(engine, node)?;
                self.route(engine, pid, request, target)
            }
            Flow::Dropped => {
                self.dropped += 1;
                self.dropped_at[node.0] += 1;
                self.carried.remove(&pid);
                self.processes.finish(pid)?;
                self.leave(engine, node)
            }
        }
    }

    fn depart(
        &mut self,
        engine: &mut Engine<ProcessId>,
        pid: ProcessId,
        request: RequestId,
        node: NodeId,
    ) -> Result<(), SimError> {
        self.leave(engine, node)?;
        self.proceed(engine, pid, request, node)
    }

    /// Moves a request that has left `node` on to its successor, or completes it.
    fn proceed(
        &mut self,
        engine: &mut Engine<ProcessId>,
        pid: ProcessId,
        request: RequestId,
        node: NodeId,
    ) -> Result<(), SimError> {
        match self.nodes[node.0].next() {
            Some(next) => self.route(engine, pid, request, next),
            None => self.complete(engine, pid, request),
        }
    }

    fn leave(&mut self, engine: &mut Engine<ProcessId>, node: NodeId) -> Result<(), SimError> {
        let i = node.0;
        self.in_flight[i] = self.in_flight[i].saturating_sub(1);
        self.backlog[i] = self.backlog[i].saturating_sub(1);
        let mut watchers = self.watchers[i].clone();
        if let Some(queue) = self.fed_by[i] {
            self.backlog[queue.0] = self.backlog[queue.0].saturating_sub(1);
            watchers.extend_from_slice(&self.watchers[queue.0]);
        }
        for balancer in watchers {
            self.drain(engine, balancer)?;
        }
        Ok(())
    }

    /// Dispatches requests held at `balancer` for as long as its policy accepts them.
    fn drain(&mut self, engine: &mut Engine<ProcessId>, balancer: NodeId) -> Result<(), SimError> {
        loop {
            let released = {
                let mut parts = self.parts(engine);
                match &mut parts.nodes[balancer.0] {
                    Node::LoadBalancer(lb) => lb.release_one(&mut parts.ctx, parts.backlog),
                    _ => None,
                }
            };
            let Some((request, target)) = released else {
                return Ok(());
            };
            let pid = self.requests[request.0].pid;
            trace!(%request, %target, "released held request");
            self.enter(request, target);
            self.processes
                .suspend(pid, Step::Arrive { node: target }, None)?;
            engine.schedule_after(0.0, pid)?;
            self.leave(engine, balancer)?;
        }
    }

    fn complete(
        &mut self,
        engine: &mut Engine<ProcessId>,
        pid: ProcessId,
        request: RequestId,
    ) -> Result<(), SimError> {
        let now = engine.now();
        let r = &mut self.requests[request.0];
        r.complete(now);
        let latency = now - r.arrival_time;
        if self.completed >= self.warmup {
            self.latencies.push(latency);
            self.queueing.push(r.queueing_time().unwrap_or_default());
            self.service.push(r.service_demand);
        }
        self.completed += 1;
        self.carried.remove(&pid);
        self.processes.finish(pid)?;
        trace!(%request, latency, "completed");

        if let Some(threshold) = self.instability_threshold {
            if self.recent.len() == INSTABILITY_WINDOW {
                self.recent.pop_front();
            }
            self.recent.push_back(latency);
            if self.recent.len() == INSTABILITY_WINDOW
                && self.recent.iter().all(|&l| l > threshold)
            {
                warn!(time = now, threshold, "latency above threshold, stopping unstable run");
                self.unstable = true;
            }
        }
        Ok(())
    }

    fn worker_poll(
        &mut self,
        engine: &mut Engine<ProcessId>,
        worker: ProcessId,
        server: NodeId,
        queue: NodeId,
    ) -> Result<(), SimError> {
        let pulled = {
            let mut parts = self.parts(engine);
            match &mut parts.nodes[queue.0] {
                Node::Queue(q) => q.pull(&mut parts.ctx, queue, worker)?,
                _ => return Err(SimError::StaleProcess(worker)),
            }
        };
        match pulled {
            Some(request) => self.worker_begin(engine, worker, server, queue, request),
            None => Ok(()),
        }
    }

    fn worker_begin(
        &mut self,
        engine: &mut Engine<ProcessId>,
        worker: ProcessId,
        server: NodeId,
        queue: NodeId,
        request: RequestId,
    ) -> Result<(), SimError> {
        // Entering the server first keeps the queue's backlog steady.
        self.enter(request, server);
        self.leave(engine, queue)?;
        let mut parts = self.parts(engine);
        match &mut parts.nodes[server.0] {
            Node::Server(s) => s.worker_begin(&mut parts.ctx, server, queue, worker, request),
            _ => Err(SimError::StaleProcess(worker)),
        }
    }
}

/// One wired, seeded simulation run.
#[derive(Debug)]
pub struct Topology {
    engine: Engine<ProcessId>,
    world: World,
    horizon: Horizon,
    seed: u64,
    load_level: f64,
}

impl Topology {
    pub fn build(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let index = config.component_index()?;
        let resolve = |name: &str, field: String| {
            index
                .get(name)
                .map(|&i| NodeId(i))
                .ok_or_else(|| ConfigError::UnknownComponent {
                    field,
                    name: name.to_string(),
                })
        };

        let components = &config.topology.components;
        let mut nodes = Vec::with_capacity(components.len());
        let mut watchers = vec![Vec::new(); components.len()];
        for (i, component) in components.iter().enumerate() {
            let field = component_field(i);
            let resource = ResourceId(i as u64);
            let node = match component {
                ComponentConfig::Server {
                    name,
                    threads,
                    service,
                    next,
                } => {
                    let next = next
                        .as_deref()
                        .map(|n| resolve(n, format!("{field}.next")))
                        .transpose()?;
                    Node::Server(Server::new(
                        name.clone(),
                        resource,
                        *threads,
                        service.build(),
                        next,
                    ))
                }
                ComponentConfig::Queue {
                    name,
                    capacity,
                    overflow,
                    discipline,
                    feeds,
                } => {
                    let feeds = resolve(feeds, format!("{field}.feeds"))?;
                    Node::Queue(QueueNode::new(
                        name.clone(),
                        resource,
                        *capacity,
                        *discipline,
                        *overflow,
                        feeds,
                    ))
                }
                ComponentConfig::LoadBalancer {
                    name,
                    policy,
                    targets,
                } => {
                    let targets = targets
                        .iter()
                        .map(|t| resolve(t, format!("{field}.targets")))
                        .collect::<Result<Vec<_>, _>>()?;
                    for target in &targets {
                        watchers[target.0].push(NodeId(i));
                    }
                    let policy = policy.build(&format!("{field}.policy"), targets.len())?;
                    Node::LoadBalancer(LoadBalancer::new(name.clone(), targets, policy))
                }
                ComponentConfig::Link {
                    name,
                    latency,
                    transmission_time,
                    bandwidth,
                    contention,
                    next,
                } => {
                    let next = next
                        .as_deref()
                        .map(|n| resolve(n, format!("{field}.next")))
                        .transpose()?;
                    Node::Link(Link::new(
                        name.clone(),
                        resource,
                        *latency,
                        *transmission_time,
                        *bandwidth,
                        *contention,
                        next,
                    ))
                }
            };
            nodes.push(node);
        }

        // Wire queue-fed servers to their queue.
        let feeds: Vec<(NodeId, NodeId)> = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| match node {
                Node::Queue(queue) => Some((NodeId(i), queue.feeds)),
                _ => None,
            })
            .collect();

        let workload = &config.workload;
        let priorities = if workload.priority_weights.is_empty() {
            None
        } else {
            Some(WeightedIndex::new(&workload.priority_weights).map_err(|err| {
                ConfigError::invalid("workload.priority_weights", err.to_string())
            })?)
        };
        let entry = resolve(&workload.entry, "workload.entry".to_string())?;

        let count = nodes.len();
        let mut fed_by = vec![None; count];
        for &(queue, server) in &feeds {
            fed_by[server.0] = Some(queue);
        }
        let mut world = World {
            nodes,
            in_flight: vec![0; count],
            peak_in_flight: vec![0; count],
            arrivals: vec![0; count],
            dropped_at: vec![0; count],
            backlog: vec![0; count],
            fed_by,
            watchers,
            processes: ProcessTable::new(),
            requests: Vec::new(),
            carried: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            sources: Vec::new(),
            priorities,
            warmup: workload.warmup_requests,
            generated: 0,
            completed: 0,
            dropped: 0,
            latencies: Vec::new(),
            queueing: Vec::new(),
            service: Vec::new(),
            recent: VecDeque::with_capacity(INSTABILITY_WINDOW),
            instability_threshold: config.instability_threshold,
            unstable: false,
            limits: RunLimits::default(),
        };
        let mut engine = Engine::new();
        let startup = |err: SimError| ConfigError::invalid("topology", err.to_string());

        // Workers are scheduled before the source so they are parked on their
        // queue by the time the first request arrives.
        for &(queue, server) in &feeds {
            let threads = match &world.nodes[server.0] {
                Node::Server(s) => s.threads,
                _ => 0,
            };
            for _ in 0..threads {
                let pid = world
                    .processes
                    .spawn(Step::WorkerPoll { server, queue })
                    .map_err(startup)?;
                engine.schedule_at(0.0, pid).map_err(startup)?;
            }
        }

        let arrivals = ArrivalSource::new(
            workload.arrivals.clone(),
            workload.rate,
            workload.max_requests,
        );
        if let Some(first) = arrivals.peek() {
            let pid = world
                .processes
                .spawn(Step::Generate { source: 0 })
                .map_err(startup)?;
            engine.schedule_at(first, pid).map_err(startup)?;
        }
        world.sources.push(Source { entry, arrivals });

        info!(
            components = count,
            seed = config.seed,
            rate = workload.rate,
            "topology built"
        );
        Ok(Self {
            engine,
            world,
            horizon: config.horizon,
            seed: config.seed,
            load_level: workload.rate,
        })
    }

    /// Aborts the run with `WallClockExceeded` once `budget` of real time has
    /// passed, or with `Cancelled` once `cancel` is set.
    pub fn set_limits(&mut self, budget: Option<Duration>, cancel: Option<CancelFlag>) {
        self.world.limits = RunLimits {
            deadline: budget.map(|budget| (Instant::now() + budget, budget)),
            cancel,
        };
    }

    pub fn run_until(&mut self, until: Until) -> Result<RunSummary, SimError> {
        self.engine.run(&mut self.world, until)
    }

    /// Runs to `horizon`, extracts statistics, then tears the run down.
    pub fn run(&mut self, horizon: Horizon) -> Result<RunStatistics, SimError> {
        let until = match horizon {
            Horizon::Duration { time } => Until::Time(time),
            Horizon::Requests { count } => Until::Requests(count),
        };
        let summary = self.run_until(until)?;
        info!(
            seed = self.seed,
            now = summary.now,
            events = summary.events,
            reason = ?summary.reason,
            completed = self.world.completed,
            "run finished"
        );
        let stats = self.statistics();
        self.teardown();
        Ok(stats)
    }

    /// Runs to the horizon given in the configuration.
    pub fn run_to_horizon(&mut self) -> Result<RunStatistics, SimError> {
        self.run(self.horizon)
    }

    /// Reads the statistics of the run so far. Calling it repeatedly, before
    /// or after teardown, returns the same record.
    pub fn statistics(&self) -> RunStatistics {
        let world = &self.world;
        let elapsed = self.engine.now();
        let mut components = BTreeMap::new();
        for (i, node) in world.nodes.iter().enumerate() {
            let utilization = match node {
                Node::Server(server) => server.slots.utilization(elapsed),
                Node::Link(link) => link.slots.utilization(elapsed),
                Node::Queue(queue) => queue.buffer.utilization(elapsed),
                Node::LoadBalancer(_) => 0.0,
            };
            components.insert(
                node.name().to_string(),
                ComponentStatistics {
                    kind: node.kind(),
                    utilization,
                    arrivals: world.arrivals[i],
                    dropped: world.dropped_at[i],
                    peak_occupancy: world.peak_in_flight[i],
                },
            );
        }
        RunStatistics {
            seed: self.seed,
            load_level: self.load_level,
            elapsed,
            generated: world.generated,
            completed: world.completed,
            dropped: world.dropped,
            in_flight: world.generated - world.completed - world.dropped,
            throughput: if elapsed > 0.0 {
                world.completed as f64 / elapsed
            } else {
                0.0
            },
            latency: LatencySummary::from_samples(world.latencies.clone()),
            mean_queueing_time: stats::mean(&world.queueing),
            mean_service_time: stats::mean(&world.service),
            components,
            unstable: world.unstable,
            events: self.engine.dispatched(),
        }
    }

    /// Cancels every remaining process and closes every resource.
    pub fn teardown(&mut self) {
        self.engine.teardown();
        self.world.processes.teardown();
        for node in &mut self.world.nodes {
            node.close();
        }
    }

    pub fn now(&self) -> SimTime {
        self.engine.now()
    }

    pub fn requests(&self) -> &[Request] {
        &self.world.requests
    }

    pub fn component_name(&self, id: NodeId) -> Option<&str> {
        self.world.nodes.get(id.0).map(Node::name)
    }

    pub fn component(&self, name: &str) -> Option<&Node> {
        self.world.nodes.iter().find(|node| node.name() == name)
    }

    pub fn live_processes(&self) -> usize {
        self.world.processes.live()
    }
}
