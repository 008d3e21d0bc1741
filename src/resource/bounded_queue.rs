use std::collections::{BTreeMap, VecDeque};

use crate::engine::{ProcessId, SimTime};
use crate::error::SimError;

use super::{Discipline, OverflowPolicy, ResourceId};

/// Outcome of [`BoundedQueue::put`].
#[derive(Debug, PartialEq)]
pub enum Put<T> {
    /// The item is stored. `wake` is a suspended consumer it has been reserved for.
    Accepted { wake: Option<ProcessId> },
    /// The queue is full; the producer is parked together with its item.
    Blocked,
    /// The queue is full and drops overflow.
    Dropped(T),
}

/// Outcome of [`BoundedQueue::get`] and [`BoundedQueue::take`].
#[derive(Debug, PartialEq)]
pub enum Get<T> {
    Item { item: T, handoff: Handoff },
    /// Nothing available; the consumer is parked.
    Waiting,
}

/// Processes freed by an item leaving the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handoff {
    /// Head blocked producer whose item now sits in the queue.
    pub unblocked: Option<ProcessId>,
    /// Parked consumer the admitted item was reserved for.
    pub wake: Option<ProcessId>,
}

/// A bounded (or unbounded) buffer with producer backpressure.
///
/// Items handed to a parked consumer stay in the queue, reserved, until the
/// consumer runs again and calls [`take`](Self::take). The item count never
/// exceeds the capacity.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    id: ResourceId,
    capacity: Option<usize>,
    discipline: Discipline,
    overflow: OverflowPolicy,
    items: BTreeMap<(u32, u64), T>,
    next_sequence: u64,
    reserved: usize,
    consumers: VecDeque<ProcessId>,
    producers: VecDeque<(ProcessId, u32, T)>,
    accepted: u64,
    dropped: u64,
    peak: usize,
    occupancy_area: f64,
    last_change: SimTime,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    pub fn new(
        id: ResourceId,
        capacity: Option<usize>,
        discipline: Discipline,
        overflow: OverflowPolicy,
    ) -> Self {
        Self {
            id,
            capacity,
            discipline,
            overflow,
            items: BTreeMap::new(),
            next_sequence: 0,
            reserved: 0,
            consumers: VecDeque::new(),
            producers: VecDeque::new(),
            accepted: 0,
            dropped: 0,
            peak: 0,
            occupancy_area: 0.0,
            last_change: 0.0,
            closed: false,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn put(
        &mut self,
        producer: ProcessId,
        priority: u32,
        item: T,
        now: SimTime,
    ) -> Result<Put<T>, SimError> {
        self.ensure_open()?;
        if self.is_full() || !self.producers.is_empty() {
            return Ok(match self.overflow {
                OverflowPolicy::Drop => {
                    self.dropped += 1;
                    Put::Dropped(item)
                }
                OverflowPolicy::Block => {
                    self.producers.push_back((producer, priority, item));
                    Put::Blocked
                }
            });
        }
        let wake = self.store(priority, item, now);
        Ok(Put::Accepted { wake })
    }

    /// Hands out the head item if one is not already reserved, otherwise parks the consumer.
    pub fn get(&mut self, consumer: ProcessId, now: SimTime) -> Result<Get<T>, SimError> {
        self.ensure_open()?;
        if self.items.len() <= self.reserved {
            self.consumers.push_back(consumer);
            return Ok(Get::Waiting);
        }
        self.pop(now).ok_or(SimError::StaleProcess(consumer))
    }

    /// Claims the item reserved for a consumer that was woken by a put.
    pub fn take(&mut self, consumer: ProcessId, now: SimTime) -> Result<Get<T>, SimError> {
        self.ensure_open()?;
        if self.reserved == 0 {
            return Err(SimError::StaleProcess(consumer));
        }
        self.reserved -= 1;
        self.pop(now).ok_or(SimError::StaleProcess(consumer))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.items.len() >= capacity)
    }

    pub fn blocked_producers(&self) -> usize {
        self.producers.len()
    }

    pub fn waiting_consumers(&self) -> usize {
        self.consumers.len()
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Time-averaged occupancy over `[0, now]`, relative to capacity when bounded.
    pub fn utilization(&self, now: SimTime) -> f64 {
        if now <= 0.0 {
            return 0.0;
        }
        let area =
            self.occupancy_area + self.items.len() as f64 * (now - self.last_change).max(0.0);
        match self.capacity {
            Some(capacity) if capacity > 0 => area / (capacity as f64 * now),
            _ => area / now,
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.consumers.clear();
        self.producers.clear();
    }

    fn store(&mut self, priority: u32, item: T, now: SimTime) -> Option<ProcessId> {
        self.integrate(now);
        let class = match self.discipline {
            Discipline::Fifo => 0,
            Discipline::Priority => priority,
        };
        self.items.insert((class, self.next_sequence), item);
        self.next_sequence += 1;
        self.accepted += 1;
        self.peak = self.peak.max(self.items.len());
        let wake = self.consumers.pop_front();
        if wake.is_some() {
            self.reserved += 1;
        }
        wake
    }

    fn pop(&mut self, now: SimTime) -> Option<Get<T>> {
        self.integrate(now);
        let (_, item) = self.items.pop_first()?;
        let mut handoff = Handoff::default();
        if let Some((producer, priority, parked)) = self.producers.pop_front() {
            handoff.unblocked = Some(producer);
            handoff.wake = self.store(priority, parked, now);
        }
        Some(Get::Item { item, handoff })
    }

    fn integrate(&mut self, now: SimTime) {
        if now > self.last_change {
            self.occupancy_area += self.items.len() as f64 * (now - self.last_change);
            self.last_change = now;
        }
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        if self.closed {
            Err(SimError::UseAfterTeardown("bounded queue"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: Option<usize>, overflow: OverflowPolicy) -> BoundedQueue<&'static str> {
        BoundedQueue::new(ResourceId(0), capacity, Discipline::Fifo, overflow)
    }

    fn item(get: Get<&'static str>) -> (&'static str, Handoff) {
        match get {
            Get::Item { item, handoff } => (item, handoff),
            Get::Waiting => panic!("expected an item"),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut q = queue(None, OverflowPolicy::Block);
        for (n, name) in ["a", "b", "c"].into_iter().enumerate() {
            assert_eq!(
                q.put(ProcessId(n as u64), 0, name, 0.0).unwrap(),
                Put::Accepted { wake: None }
            );
        }
        let order: Vec<_> = (0..3)
            .map(|_| item(q.get(ProcessId(9), 1.0).unwrap()).0)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_priority_discipline() {
        let mut q = BoundedQueue::new(
            ResourceId(0),
            None,
            Discipline::Priority,
            OverflowPolicy::Block,
        );
        q.put(ProcessId(0), 2, "low-a", 0.0).unwrap();
        q.put(ProcessId(1), 0, "high", 0.0).unwrap();
        q.put(ProcessId(2), 2, "low-b", 0.0).unwrap();
        q.put(ProcessId(3), 1, "mid", 0.0).unwrap();
        let order: Vec<_> = (0..4)
            .map(|_| item(q.get(ProcessId(9), 0.0).unwrap()).0)
            .collect();
        assert_eq!(order, vec!["high", "mid", "low-a", "low-b"]);
    }

    /// Consumers parked first are served first, and a parked item is only
    /// visible to the consumer it was reserved for.
    #[test]
    fn test_parked_consumers_served_in_order() {
        let mut q = queue(Some(4), OverflowPolicy::Block);
        assert_eq!(q.get(ProcessId(10), 0.0).unwrap(), Get::Waiting);
        assert_eq!(q.get(ProcessId(11), 0.0).unwrap(), Get::Waiting);

        assert_eq!(
            q.put(ProcessId(1), 0, "first", 1.0).unwrap(),
            Put::Accepted {
                wake: Some(ProcessId(10))
            }
        );
        // A newcomer cannot steal the reserved item.
        assert_eq!(q.get(ProcessId(12), 1.0).unwrap(), Get::Waiting);
        assert_eq!(
            q.put(ProcessId(2), 0, "second", 1.0).unwrap(),
            Put::Accepted {
                wake: Some(ProcessId(11))
            }
        );

        assert_eq!(item(q.take(ProcessId(10), 1.0).unwrap()).0, "first");
        assert_eq!(item(q.take(ProcessId(11), 1.0).unwrap()).0, "second");
        assert!(q.take(ProcessId(12), 1.0).is_err());
        assert_eq!(q.waiting_consumers(), 1);
    }

    #[test]
    fn test_blocked_producers_admitted_in_order() {
        let mut q = queue(Some(1), OverflowPolicy::Block);
        q.put(ProcessId(1), 0, "a", 0.0).unwrap();
        assert_eq!(q.put(ProcessId(2), 0, "b", 0.0).unwrap(), Put::Blocked);
        assert_eq!(q.put(ProcessId(3), 0, "c", 0.0).unwrap(), Put::Blocked);
        assert_eq!(q.len(), 1);

        let (first, handoff) = item(q.get(ProcessId(9), 1.0).unwrap());
        assert_eq!(first, "a");
        assert_eq!(handoff.unblocked, Some(ProcessId(2)));
        assert_eq!(handoff.wake, None);
        assert_eq!(q.len(), 1);

        let (second, handoff) = item(q.get(ProcessId(9), 2.0).unwrap());
        assert_eq!(second, "b");
        assert_eq!(handoff.unblocked, Some(ProcessId(3)));
        assert_eq!(q.blocked_producers(), 0);
        assert_eq!(q.peak(), 1);
    }

    #[test]
    fn test_drop_on_full() {
        let mut q = queue(Some(1), OverflowPolicy::Drop);
        assert!(matches!(
            q.put(ProcessId(1), 0, "kept", 0.0).unwrap(),
            Put::Accepted { .. }
        ));
        assert_eq!(
            q.put(ProcessId(2), 0, "lost", 0.0).unwrap(),
            Put::Dropped("lost")
        );
        assert_eq!(q.accepted(), 1);
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn test_closed_queue() {
        let mut q = queue(Some(1), OverflowPolicy::Drop);
        q.close();
        assert!(matches!(
            q.get(ProcessId(1), 0.0),
            Err(SimError::UseAfterTeardown(_))
        ));
    }
}
