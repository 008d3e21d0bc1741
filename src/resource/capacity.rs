use std::collections::{BTreeSet, VecDeque};

use crate::engine::{ProcessId, SimTime};
use crate::error::SimError;

use super::ResourceId;

/// Outcome of [`CapacityResource::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    /// The caller must suspend; it is `position`-th in line (0 = next).
    Queued { position: usize },
}

/// A set of identical slots (server threads, link bandwidth units).
///
/// Waiters are admitted strictly in arrival order. Busy time is integrated
/// over virtual time so utilization can be read back after the run.
#[derive(Debug)]
pub struct CapacityResource {
    id: ResourceId,
    capacity: Option<usize>,
    holders: BTreeSet<ProcessId>,
    wait_queue: VecDeque<ProcessId>,
    busy_area: f64,
    last_change: SimTime,
    peak: usize,
    acquisitions: u64,
    closed: bool,
}

impl CapacityResource {
    /// `None` capacity means unbounded.
    pub fn new(id: ResourceId, capacity: Option<usize>) -> Self {
        Self {
            id,
            capacity,
            holders: BTreeSet::new(),
            wait_queue: VecDeque::new(),
            busy_area: 0.0,
            last_change: 0.0,
            peak: 0,
            acquisitions: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn acquire(&mut self, pid: ProcessId, now: SimTime) -> Result<Acquire, SimError> {
        self.ensure_open()?;
        if self.is_full() || !self.wait_queue.is_empty() {
            self.wait_queue.push_back(pid);
            return Ok(Acquire::Queued {
                position: self.wait_queue.len() - 1,
            });
        }
        self.admit(pid, now);
        Ok(Acquire::Granted)
    }

    /// Releases `pid`'s slot. If someone was waiting, the head of the line now
    /// holds the slot and is returned so the caller can resume it.
    pub fn release(&mut self, pid: ProcessId, now: SimTime) -> Result<Option<ProcessId>, SimError> {
        self.ensure_open()?;
        self.integrate(now);
        if !self.holders.remove(&pid) {
            return Err(SimError::StaleProcess(pid));
        }
        match self.wait_queue.pop_front() {
            Some(next) => {
                self.admit(next, now);
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.holders.len() >= capacity)
    }

    pub fn in_use(&self) -> usize {
        self.holders.len()
    }

    pub fn waiting(&self) -> usize {
        self.wait_queue.len()
    }

    pub fn holds(&self, pid: ProcessId) -> bool {
        self.holders.contains(&pid)
    }

    /// Largest number of simultaneous holders seen so far.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    /// Busy slot-time divided by available slot-time over `[0, now]`.
    ///
    /// For an unbounded resource this is the mean number of holders.
    pub fn utilization(&self, now: SimTime) -> f64 {
        if now <= 0.0 {
            return 0.0;
        }
        let area = self.busy_area + self.holders.len() as f64 * (now - self.last_change).max(0.0);
        match self.capacity {
            Some(capacity) if capacity > 0 => area / (capacity as f64 * now),
            _ => area / now,
        }
    }

    /// Marks the resource as belonging to a finished run.
    pub fn close(&mut self) {
        self.closed = true;
        self.wait_queue.clear();
    }

    fn admit(&mut self, pid: ProcessId, now: SimTime) {
        self.integrate(now);
        self.holders.insert(pid);
        self.acquisitions += 1;
        self.peak = self.peak.max(self.holders.len());
    }

    fn integrate(&mut self, now: SimTime) {
        if now > self.last_change {
            self.busy_area += self.holders.len() as f64 * (now - self.last_change);
            self.last_change = now;
        }
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        if self.closed {
            Err(SimError::UseAfterTeardown("capacity resource"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u64) -> ProcessId {
        ProcessId(n)
    }

    #[test]
    fn test_waiters_admitted_in_arrival_order() {
        let mut slots = CapacityResource::new(ResourceId(0), Some(1));
        assert_eq!(slots.acquire(pid(1), 0.0).unwrap(), Acquire::Granted);
        assert_eq!(
            slots.acquire(pid(2), 0.0).unwrap(),
            Acquire::Queued { position: 0 }
        );
        assert_eq!(
            slots.acquire(pid(3), 0.0).unwrap(),
            Acquire::Queued { position: 1 }
        );

        assert_eq!(slots.release(pid(1), 1.0).unwrap(), Some(pid(2)));
        assert!(slots.holds(pid(2)));
        assert_eq!(slots.in_use(), 1);
        assert_eq!(slots.release(pid(2), 2.0).unwrap(), Some(pid(3)));
        assert_eq!(slots.release(pid(3), 3.0).unwrap(), None);
        assert_eq!(slots.peak(), 1);
        assert_eq!(slots.acquisitions(), 3);
    }

    #[test]
    fn test_utilization() {
        let mut slots = CapacityResource::new(ResourceId(0), Some(2));
        slots.acquire(pid(1), 0.0).unwrap();
        slots.acquire(pid(2), 2.0).unwrap();
        slots.release(pid(1), 4.0).unwrap();
        slots.release(pid(2), 4.0).unwrap();
        // 1 slot busy for [0,2), 2 slots for [2,4), idle for [4,8).
        assert!((slots.utilization(8.0) - 6.0 / 16.0).abs() < 1e-12);
        assert_eq!(slots.utilization(0.0), 0.0);
    }

    #[test]
    fn test_unbounded_never_queues() {
        let mut slots = CapacityResource::new(ResourceId(0), None);
        for n in 0..100 {
            assert_eq!(slots.acquire(pid(n), 0.0).unwrap(), Acquire::Granted);
        }
        assert_eq!(slots.peak(), 100);
        assert!((slots.utilization(1.0) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_releasing_a_non_holder_is_stale() {
        let mut slots = CapacityResource::new(ResourceId(0), Some(1));
        assert!(matches!(
            slots.release(pid(9), 0.0),
            Err(SimError::StaleProcess(_))
        ));
    }

    #[test]
    fn test_closed_resource() {
        let mut slots = CapacityResource::new(ResourceId(0), Some(1));
        slots.close();
        assert!(matches!(
            slots.acquire(pid(1), 0.0),
            Err(SimError::UseAfterTeardown(_))
        ));
    }
}
