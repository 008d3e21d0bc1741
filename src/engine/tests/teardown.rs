use crate::engine::{Dispatcher, Engine, Event, Until};
use crate::error::SimError;

struct Noop;

impl Dispatcher<()> for Noop {
    fn dispatch(&mut self, _engine: &mut Engine<()>, _event: Event<()>) -> Result<(), SimError> {
        Ok(())
    }

    fn completed(&self) -> u64 {
        0
    }
}

struct Failing;

impl Dispatcher<()> for Failing {
    fn dispatch(&mut self, engine: &mut Engine<()>, _event: Event<()>) -> Result<(), SimError> {
        engine.schedule_after(-1.0, ())?;
        Ok(())
    }

    fn completed(&self) -> u64 {
        0
    }
}

/// Test that a torn-down engine refuses further use
#[test]
fn test_use_after_teardown() {
    let mut engine = Engine::new();
    engine.schedule_after(1.0, ()).unwrap();
    engine.teardown();

    assert!(engine.is_torn_down());
    assert_eq!(engine.pending(), 0);
    assert!(matches!(
        engine.schedule_after(1.0, ()),
        Err(SimError::UseAfterTeardown("engine"))
    ));
    assert!(matches!(
        engine.run(&mut Noop, Until::Exhausted),
        Err(SimError::UseAfterTeardown(_))
    ));
}

/// Test that a dispatch error aborts the run and is surfaced unchanged
#[test]
fn test_dispatch_error_aborts_run() {
    let mut engine = Engine::new();
    engine.schedule_after(1.0, ()).unwrap();
    engine.schedule_after(2.0, ()).unwrap();

    let err = engine.run(&mut Failing, Until::Exhausted).unwrap_err();
    assert!(matches!(err, SimError::InvalidSchedule { .. }));
    assert_eq!(engine.dispatched(), 1);
    assert_eq!(engine.pending(), 1);
}
