//! Component library: the entities a topology is wired from.
//!
//! Each component owns its resources and implements the steps a request
//! process takes while it is inside that component. Moving a request between
//! components is the topology's job; a component step only reports where the
//! request stands via [`Flow`].

pub mod arrivals;
pub mod dispatch;
pub mod link;
pub mod load_balancer;
pub mod queue;
pub mod request;
pub mod server;
pub mod service_time;

pub use arrivals::{ArrivalProcess, ArrivalSource};
pub use dispatch::{Candidate, DispatchPolicy, PolicyConfig, PolicyKind};
pub use link::{ContentionModel, Link};
pub use load_balancer::LoadBalancer;
pub use queue::QueueNode;
pub use request::{Request, RequestId, RequestState};
pub use server::Server;
pub use service_time::{ServiceTime, ServiceTimeModel};

use std::fmt;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, ProcessId, ProcessTable};

/// Index of a component in build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Resume points of every process in a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Source process: emit the arrivals due now.
    Generate { source: usize },
    /// Request process: enter `node`. Routing bookkeeping is already done.
    Arrive { node: NodeId },
    /// Request process: a slot at `node` was handed over.
    Granted { node: NodeId },
    /// Request process: service or transmission at `node` finished.
    Done { node: NodeId },
    /// Request process: sitting in the queue feeding `server`.
    AwaitService { server: NodeId },
    /// Request process: a worker of `server` finished serving it.
    Served { server: NodeId },
    /// Worker process: pull the next request.
    WorkerPoll { server: NodeId, queue: NodeId },
    /// Worker process: claim the request a producer reserved for it.
    WorkerTake { server: NodeId, queue: NodeId },
    /// Worker process: a slot was handed over while holding `request`.
    WorkerGranted {
        server: NodeId,
        queue: NodeId,
        request: RequestId,
    },
    /// Worker process: finished serving `request`.
    WorkerDone {
        server: NodeId,
        queue: NodeId,
        request: RequestId,
    },
}

/// Run state a component step may touch.
pub struct Ctx<'a> {
    pub engine: &'a mut Engine<ProcessId>,
    pub processes: &'a mut ProcessTable<Step>,
    pub requests: &'a mut Vec<Request>,
    pub rng: &'a mut ChaCha8Rng,
}

/// Where a request stands after a component step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Suspended inside the component.
    Parked,
    /// Finished with the component; continue to its successor.
    Depart,
    /// Hand the request to `target` (load balancers).
    Forward(NodeId),
    /// Refused by a full buffer.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Server,
    Queue,
    LoadBalancer,
    Link,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Server => "server",
            ComponentKind::Queue => "queue",
            ComponentKind::LoadBalancer => "load_balancer",
            ComponentKind::Link => "link",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum Node {
    Server(Server),
    Queue(QueueNode),
    LoadBalancer(LoadBalancer),
    Link(Link),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Server(server) => &server.name,
            Node::Queue(queue) => &queue.name,
            Node::LoadBalancer(lb) => &lb.name,
            Node::Link(link) => &link.name,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Node::Server(_) => ComponentKind::Server,
            Node::Queue(_) => ComponentKind::Queue,
            Node::LoadBalancer(_) => ComponentKind::LoadBalancer,
            Node::Link(_) => ComponentKind::Link,
        }
    }

    /// Successor a departing request continues to. `None` means the request completes.
    pub fn next(&self) -> Option<NodeId> {
        match self {
            Node::Server(server) => server.next,
            Node::Link(link) => link.next,
            Node::Queue(queue) => Some(queue.feeds),
            Node::LoadBalancer(_) => None,
        }
    }

    /// Releases every resource the component owns.
    pub fn close(&mut self) {
        match self {
            Node::Server(server) => server.slots.close(),
            Node::Queue(queue) => queue.buffer.close(),
            Node::LoadBalancer(lb) => lb.close(),
            Node::Link(link) => link.slots.close(),
        }
    }
}
