//! A failing exploration names its schedule through the end hook, and
//! replaying that schedule explicitly reproduces the identical failure.

use std::sync::{Arc, Mutex as StdMutex};

use permuter::{test_fn, tp_assert, Mutex, PermuterError, TestFn, ThreadPermuter};

/// Thread 1 asserts it runs after thread 0's increment, which some
/// schedules violate.
fn racy_threads(value: &Arc<Mutex<u32>>) -> Vec<TestFn> {
    let incr = Arc::clone(value);
    let check = Arc::clone(value);
    vec![
        test_fn(move |cp| {
            *incr.lock(cp) += 1;
            Ok(())
        }),
        test_fn(move |cp| {
            cp.yield_now();
            let seen = *check.lock(cp);
            tp_assert!(seen == 1, "observed {} before the increment", seen);
            Ok(())
        }),
    ]
}

#[test]
fn failing_schedule_is_replayable() {
    let value = Arc::new(Mutex::new(0u32));
    let schedules: Arc<StdMutex<Vec<String>>> = Arc::default();

    let value_in_begin = Arc::clone(&value);
    let sink = Arc::clone(&schedules);
    let mut permuter = ThreadPermuter::new(
        move || *value_in_begin.try_lock().unwrap() = 0,
        racy_threads(&value),
        move |schedule: &str| sink.lock().unwrap().push(schedule.to_string()),
    );

    let failure = match permuter.run("", false, false) {
        Err(PermuterError::Assertion(failure)) => failure,
        other => panic!("expected an assertion failure, got {:?}", other),
    };
    assert_eq!(failure.message(), "observed 0 before the increment");

    // The driver's diagnostic replay reports the failing schedule through
    // the end hook last.
    let failing = schedules.lock().unwrap().last().cloned().unwrap();
    assert!(!failing.is_empty());

    // An explicit replay on a fresh session reproduces the same failure.
    let value = Arc::new(Mutex::new(0u32));
    let value_in_begin = Arc::clone(&value);
    let mut replayer = ThreadPermuter::new(
        move || *value_in_begin.try_lock().unwrap() = 0,
        racy_threads(&value),
        |_| {},
    );
    match replayer.run(&failing, false, false) {
        Err(PermuterError::Assertion(replayed)) => {
            assert_eq!(replayed.message(), failure.message());
            assert_eq!(replayed.line(), failure.line());
        }
        other => panic!("replay did not reproduce the failure: {:?}", other),
    }
}
