//! Discrete-event simulation kernel.
//!
//! The [`Engine`] owns virtual time and the pending-event queue. It knows
//! nothing about what an event means: every popped event is handed to a
//! [`Dispatcher`], which resumes exactly one suspended process and may
//! schedule further events before returning.

pub mod event_queue;
pub mod process;

pub use event_queue::{Event, EventQueue, SimTime};
pub use process::{ProcessId, ProcessState, ProcessTable};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::SimError;

#[cfg(test)]
mod tests;

/// Receives every event the engine pops.
pub trait Dispatcher<P> {
    /// Resume the process the event belongs to.
    fn dispatch(&mut self, engine: &mut Engine<P>, event: Event<P>) -> Result<(), SimError>;

    /// Number of requests that have finished, used by [`Until::Requests`].
    fn completed(&self) -> u64;

    /// Set when the modeled system asks the run to stop early.
    fn halted(&self) -> bool {
        false
    }
}

/// Stop condition for [`Engine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Until {
    /// Run until no events are pending.
    Exhausted,
    /// Process every event at or before the given time, then park the clock there.
    Time(SimTime),
    /// Run until the dispatcher reports this many completed requests.
    Requests(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Exhausted,
    TimeReached,
    RequestsReached,
    Predicate,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub now: SimTime,
    pub events: u64,
    pub reason: StopReason,
}

#[derive(Debug)]
pub struct Engine<P> {
    now: SimTime,
    queue: EventQueue<P>,
    dispatched: u64,
    torn_down: bool,
}

impl<P> Engine<P> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            queue: EventQueue::new(),
            dispatched: 0,
            torn_down: false,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Total number of events dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedules `payload` at `now + delay`.
    pub fn schedule_after(&mut self, delay: SimTime, payload: P) -> Result<u64, SimError> {
        self.ensure_live()?;
        if !delay.is_finite() || delay < 0.0 {
            return Err(SimError::InvalidSchedule {
                now: self.now,
                requested: self.now + delay,
            });
        }
        Ok(self.queue.push(self.now + delay, payload))
    }

    /// Schedules `payload` at an absolute time, which must not lie in the past.
    pub fn schedule_at(&mut self, time: SimTime, payload: P) -> Result<u64, SimError> {
        self.ensure_live()?;
        if !time.is_finite() || time < self.now {
            return Err(SimError::InvalidSchedule {
                now: self.now,
                requested: time,
            });
        }
        Ok(self.queue.push(time, payload))
    }

    /// Pops the earliest event and advances the clock to it.
    pub fn next_event(&mut self) -> Result<Option<Event<P>>, SimError> {
        self.ensure_live()?;
        let Some(event) = self.queue.pop_earliest() else {
            return Ok(None);
        };
        debug_assert!(event.time >= self.now);
        self.now = event.time;
        self.dispatched += 1;
        Ok(Some(event))
    }

    pub fn run<D>(&mut self, dispatcher: &mut D, until: Until) -> Result<RunSummary, SimError>
    where
        D: Dispatcher<P>,
    {
        self.ensure_live()?;
        let start = self.dispatched;
        let reason = loop {
            if dispatcher.halted() {
                break StopReason::Halted;
            }
            match until {
                Until::Requests(target) if dispatcher.completed() >= target => {
                    break StopReason::RequestsReached;
                }
                Until::Time(limit) => match self.queue.peek_time() {
                    Some(next) if next > limit => {
                        self.now = self.now.max(limit);
                        break StopReason::TimeReached;
                    }
                    None => {
                        self.now = self.now.max(limit);
                        break StopReason::Exhausted;
                    }
                    Some(_) => {}
                },
                _ => {}
            }
            let Some(event) = self.next_event()? else {
                break StopReason::Exhausted;
            };
            trace!(time = event.time, sequence = event.sequence, "dispatch");
            dispatcher.dispatch(self, event)?;
        };
        Ok(RunSummary {
            now: self.now,
            events: self.dispatched - start,
            reason,
        })
    }

    /// Runs while `keep_going` holds. The predicate is checked before every event.
    pub fn run_while<D, F>(
        &mut self,
        dispatcher: &mut D,
        mut keep_going: F,
    ) -> Result<RunSummary, SimError>
    where
        D: Dispatcher<P>,
        F: FnMut(&D, SimTime) -> bool,
    {
        self.ensure_live()?;
        let start = self.dispatched;
        let reason = loop {
            if dispatcher.halted() {
                break StopReason::Halted;
            }
            if !keep_going(dispatcher, self.now) {
                break StopReason::Predicate;
            }
            let Some(event) = self.next_event()? else {
                break StopReason::Exhausted;
            };
            dispatcher.dispatch(self, event)?;
        };
        Ok(RunSummary {
            now: self.now,
            events: self.dispatched - start,
            reason,
        })
    }

    /// Discards pending events. The engine refuses all further use.
    pub fn teardown(&mut self) {
        self.queue.clear();
        self.torn_down = true;
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn ensure_live(&self) -> Result<(), SimError> {
        if self.torn_down {
            Err(SimError::UseAfterTeardown("engine"))
        } else {
            Ok(())
        }
    }
}

impl<P> Default for Engine<P> {
    fn default() -> Self {
        Self::new()
    }
}
