use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{ProcessId, SimTime};

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub usize);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Arrived,
    Queued,
    InService,
    Completed,
    Dropped,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Dropped)
    }
}

/// One unit of work flowing through the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    /// Process carrying the request.
    pub pid: ProcessId,
    pub priority: u32,
    pub state: RequestState,
    pub arrival_time: SimTime,
    /// Total service time sampled across every server visited.
    pub service_demand: SimTime,
    pub service_start: Option<SimTime>,
    pub service_end: Option<SimTime>,
    pub completion_time: Option<SimTime>,
    pub path: Vec<NodeId>,
}

impl Request {
    pub fn new(id: RequestId, pid: ProcessId, priority: u32, arrival_time: SimTime) -> Self {
        Self {
            id,
            pid,
            priority,
            state: RequestState::Arrived,
            arrival_time,
            service_demand: 0.0,
            service_start: None,
            service_end: None,
            completion_time: None,
            path: Vec::new(),
        }
    }

    pub fn start_service(&mut self, now: SimTime, demand: SimTime) {
        self.state = RequestState::InService;
        self.service_start.get_or_insert(now);
        self.service_demand += demand;
    }

    pub fn end_service(&mut self, now: SimTime) {
        self.service_end = Some(now);
    }

    pub fn complete(&mut self, now: SimTime) {
        self.state = RequestState::Completed;
        self.completion_time = Some(now);
    }

    pub fn drop_at(&mut self) {
        self.state = RequestState::Dropped;
    }

    /// End-to-end latency, once completed.
    pub fn latency(&self) -> Option<SimTime> {
        self.completion_time.map(|done| done - self.arrival_time)
    }

    /// Time spent waiting before the first server started on the request.
    pub fn queueing_time(&self) -> Option<SimTime> {
        self.service_start.map(|start| start - self.arrival_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_breakdown() {
        let mut request = Request::new(RequestId(0), ProcessId(4), 0, 1.0);
        assert_eq!(request.latency(), None);

        request.state = RequestState::Queued;
        request.start_service(3.0, 2.0);
        request.end_service(5.0);
        // A second server does not move the first service start.
        request.start_service(6.0, 1.0);
        request.end_service(7.0);
        request.complete(7.5);

        assert_eq!(request.state, RequestState::Completed);
        assert_eq!(request.queueing_time(), Some(2.0));
        assert_eq!(request.service_demand, 3.0);
        assert_eq!(request.latency(), Some(6.5));
        assert!(request.state.is_terminal());
    }
}
