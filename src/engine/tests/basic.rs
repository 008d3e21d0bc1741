use crate::engine::{Dispatcher, Engine, Event, StopReason, Until};
use crate::error::SimError;

/// Records the order in which payloads are dispatched.
#[derive(Default)]
struct Recorder {
    seen: Vec<(f64, &'static str)>,
    completed: u64,
}

impl Dispatcher<&'static str> for Recorder {
    fn dispatch(
        &mut self,
        _engine: &mut Engine<&'static str>,
        event: Event<&'static str>,
    ) -> Result<(), SimError> {
        self.seen.push((event.time, event.payload));
        self.completed += 1;
        Ok(())
    }

    fn completed(&self) -> u64 {
        self.completed
    }
}

/// Schedules a follow-up event every time it is resumed, up to a limit.
struct Chain {
    remaining: u32,
    times: Vec<f64>,
}

impl Dispatcher<u32> for Chain {
    fn dispatch(&mut self, engine: &mut Engine<u32>, event: Event<u32>) -> Result<(), SimError> {
        self.times.push(engine.now());
        if self.remaining > 0 {
            self.remaining -= 1;
            engine.schedule_after(1.5, event.payload + 1)?;
        }
        Ok(())
    }

    fn completed(&self) -> u64 {
        self.times.len() as u64
    }
}

/// Test that equal timestamps are dispatched in submission order
#[test]
fn test_dispatch_order_with_ties() {
    let mut engine = Engine::new();
    engine.schedule_after(5.0, "5").unwrap();
    engine.schedule_after(3.0, "3a").unwrap();
    engine.schedule_after(3.0, "3b").unwrap();
    engine.schedule_after(1.0, "1").unwrap();

    let mut recorder = Recorder::default();
    let summary = engine.run(&mut recorder, Until::Exhausted).unwrap();

    let order: Vec<_> = recorder.seen.iter().map(|(_, p)| *p).collect();
    assert_eq!(order, vec!["1", "3a", "3b", "5"]);
    assert_eq!(summary.events, 4);
    assert_eq!(summary.reason, StopReason::Exhausted);
    assert_eq!(engine.now(), 5.0);
}

/// Test that scheduling into the past is rejected
#[test]
fn test_negative_delay_is_invalid() {
    let mut engine: Engine<()> = Engine::new();
    let err = engine.schedule_after(-0.5, ()).unwrap_err();
    assert!(matches!(err, SimError::InvalidSchedule { .. }));

    engine.schedule_after(2.0, ()).unwrap();
    engine.next_event().unwrap();
    let err = engine.schedule_at(1.0, ()).unwrap_err();
    match err {
        SimError::InvalidSchedule { now, requested } => {
            assert_eq!(now, 2.0);
            assert_eq!(requested, 1.0);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(engine.schedule_after(f64::NAN, ()).is_err());
    assert!(engine.schedule_after(0.0, ()).is_ok());
}

/// Test that a time limit processes events at the limit and parks the clock on it
#[test]
fn test_run_until_time() {
    let mut engine = Engine::new();
    engine.schedule_at(0.0, 0).unwrap();
    let mut chain = Chain {
        remaining: 10,
        times: Vec::new(),
    };

    let summary = engine.run(&mut chain, Until::Time(3.0)).unwrap();
    assert_eq!(chain.times, vec![0.0, 1.5, 3.0]);
    assert_eq!(summary.reason, StopReason::TimeReached);
    assert_eq!(engine.now(), 3.0);
    assert_eq!(engine.pending(), 1);

    // Resuming picks up where the previous call stopped.
    let summary = engine.run(&mut chain, Until::Requests(5)).unwrap();
    assert_eq!(summary.reason, StopReason::RequestsReached);
    assert_eq!(chain.times.len(), 5);
    assert_eq!(engine.dispatched(), 5);
}

/// Test the predicate form of run
#[test]
fn test_run_while_predicate() {
    let mut engine = Engine::new();
    engine.schedule_at(0.0, 0).unwrap();
    let mut chain = Chain {
        remaining: 100,
        times: Vec::new(),
    };

    let summary = engine
        .run_while(&mut chain, |chain, _now| chain.times.len() < 4)
        .unwrap();
    assert_eq!(summary.reason, StopReason::Predicate);
    assert_eq!(chain.times, vec![0.0, 1.5, 3.0, 4.5]);
}
