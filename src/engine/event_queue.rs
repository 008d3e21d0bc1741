//! Time-ordered queue of pending events.
//!
//! Events are returned in non-decreasing time; events sharing a timestamp come
//! out in the order they were pushed. That tie-break is what makes two runs
//! with identical inputs produce identical traces.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Virtual time, in the simulation's own units.
pub type SimTime = f64;

/// A pending event. Owned by the queue until popped.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<P> {
    pub time: SimTime,
    pub sequence: u64,
    pub payload: P,
}

/// Heap entry ordered as a min-heap on `(time, sequence)`.
#[derive(Debug)]
struct Queued<P>(Event<P>);

impl<P> PartialEq for Queued<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P> Eq for Queued<P> {}

impl<P> PartialOrd for Queued<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Queued<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse to pop the earliest event first.
        other
            .0
            .time
            .total_cmp(&self.0.time)
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}

/// Binary min-heap of events keyed on `(time, sequence)`.
#[derive(Debug)]
pub struct EventQueue<P> {
    heap: BinaryHeap<Queued<P>>,
    next_sequence: u64,
}

impl<P> EventQueue<P> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Pushes an event and returns the sequence number it was assigned.
    pub fn push(&mut self, time: SimTime, payload: P) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Queued(Event {
            time,
            sequence,
            payload,
        }));
        sequence
    }

    /// Removes and returns the earliest event, if any.
    pub fn pop_earliest(&mut self) -> Option<Event<P>> {
        self.heap.pop().map(|queued| queued.0)
    }

    /// Time of the earliest pending event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|queued| queued.0.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops every pending event. Sequence numbers keep counting up.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<P> Default for EventQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
