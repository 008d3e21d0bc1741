//! Contended primitives that processes suspend on.
//!
//! Neither primitive schedules anything itself. An operation that would block
//! reports so to the caller, and an operation that frees a waiter returns the
//! waiter's [`ProcessId`](crate::engine::ProcessId) so the caller can wake it
//! in the same time step.

pub mod bounded_queue;
pub mod capacity;

pub use bounded_queue::{BoundedQueue, Get, Handoff, Put};
pub use capacity::{Acquire, CapacityResource};

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Order in which a bounded queue hands out its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    #[default]
    Fifo,
    /// Lower priority class first, FIFO within a class.
    Priority,
}

/// What a full bounded queue does with a new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the producer until space frees up.
    #[default]
    Block,
    /// Refuse the item; the caller records it as dropped.
    Drop,
}
