//! Continuation table for cooperatively scheduled processes.
//!
//! A process is an explicit state machine: while suspended it stores a
//! resume point `R`, and the engine hands that resume point back when the
//! event that wakes the process is dispatched.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::resource::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Runnable,
    Waiting,
    Done,
}

#[derive(Debug)]
struct Slot<R> {
    state: ProcessState,
    resume: Option<R>,
    waiting_on: Option<ResourceId>,
}

#[derive(Debug)]
pub struct ProcessTable<R> {
    slots: HashMap<ProcessId, Slot<R>>,
    next_id: u64,
    torn_down: bool,
}

impl<R> ProcessTable<R> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 0,
            torn_down: false,
        }
    }

    /// Creates a process parked at `start`. The caller schedules the event that wakes it.
    pub fn spawn(&mut self, start: R) -> Result<ProcessId, SimError> {
        self.ensure_live()?;
        let id = ProcessId(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            id,
            Slot {
                state: ProcessState::Waiting,
                resume: Some(start),
                waiting_on: None,
            },
        );
        Ok(id)
    }

    /// Parks a live process at `resume`. Re-suspending a waiting process replaces
    /// its resume point.
    pub fn suspend(
        &mut self,
        id: ProcessId,
        resume: R,
        waiting_on: Option<ResourceId>,
    ) -> Result<(), SimError> {
        self.ensure_live()?;
        let slot = self.slots.get_mut(&id).ok_or(SimError::StaleProcess(id))?;
        slot.state = ProcessState::Waiting;
        slot.resume = Some(resume);
        slot.waiting_on = waiting_on;
        Ok(())
    }

    /// Takes the resume point of a waiting process and marks it runnable.
    pub fn resume(&mut self, id: ProcessId) -> Result<R, SimError> {
        self.ensure_live()?;
        let slot = self.slots.get_mut(&id).ok_or(SimError::StaleProcess(id))?;
        if slot.state != ProcessState::Waiting {
            return Err(SimError::StaleProcess(id));
        }
        let resume = slot.resume.take().ok_or(SimError::StaleProcess(id))?;
        slot.state = ProcessState::Runnable;
        slot.waiting_on = None;
        Ok(resume)
    }

    /// Destroys a process whose logic has completed.
    pub fn finish(&mut self, id: ProcessId) -> Result<(), SimError> {
        self.ensure_live()?;
        self.slots
            .remove(&id)
            .map(|_| ())
            .ok_or(SimError::StaleProcess(id))
    }

    pub fn state(&self, id: ProcessId) -> ProcessState {
        self.slots
            .get(&id)
            .map_or(ProcessState::Done, |slot| slot.state)
    }

    pub fn waiting_on(&self, id: ProcessId) -> Option<ResourceId> {
        self.slots.get(&id).and_then(|slot| slot.waiting_on)
    }

    /// Number of processes that have not completed.
    pub fn live(&self) -> usize {
        self.slots.len()
    }

    pub fn spawned(&self) -> u64 {
        self.next_id
    }

    /// Cancels every remaining process. Any later use is an error.
    pub fn teardown(&mut self) {
        self.slots.clear();
        self.torn_down = true;
    }

    fn ensure_live(&self) -> Result<(), SimError> {
        if self.torn_down {
            Err(SimError::UseAfterTeardown("process table"))
        } else {
            Ok(())
        }
    }
}

impl<R> Default for ProcessTable<R> {
    fn default() -> Self {
        Self::new()
    }
}
