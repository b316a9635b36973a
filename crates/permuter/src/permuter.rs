//! Exploration driver
//!
//! [`ThreadPermuter`] owns the test closures plus the per-permutation
//! `begin`/`end` hooks and drives play/next over a session until the
//! interleaving space is exhausted, a deadlock is found, or an assertion
//! fails. A failing schedule is replayed once on a fresh session with
//! diagnostics raised before the error is returned.

use std::sync::Arc;

use permuter_core::log;
use permuter_core::{perror, pinfo, pwarn};
use permuter_core::{LogLevel, PermuterError, PermuterResult, PerThread, ThreadIndex};

use crate::permutation::Permutation;
use crate::thread::{TestFn, TestThread};

/// Runs a set of test closures under every interleaving of their
/// checkpoints
///
/// `begin` runs before each permutation to reset shared test state; `end`
/// runs after each with the schedule string just executed.
pub struct ThreadPermuter {
    begin: Box<dyn FnMut()>,
    end: Box<dyn FnMut(&str)>,
    tests: Vec<TestFn>,
    limit: usize,
}

impl ThreadPermuter {
    pub fn new(
        begin: impl FnMut() + 'static,
        tests: Vec<TestFn>,
        end: impl FnMut(&str) + 'static,
    ) -> Self {
        ThreadPermuter {
            begin: Box::new(begin),
            end: Box::new(end),
            tests,
            limit: usize::MAX,
        }
    }

    /// Only reconsider scheduling decisions at positions below `limit`
    ///
    /// Decisions at or beyond the limit replay as first recorded, which
    /// prunes the exploration to the prefix of interest.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Explore interleavings, or replay an explicit schedule
    ///
    /// - `schedule` empty: enumerate the full (limit-pruned) space.
    /// - `schedule` given, `continue_exploring` false: verify and play that
    ///   one schedule.
    /// - `schedule` given, `continue_exploring` true: resume enumeration
    ///   from that schedule onwards.
    ///
    /// `verbose` enables per-thread shim diagnostics for the whole run
    /// (they are always enabled for the failure replay).
    ///
    /// Returns `Ok(())` when every explored permutation passed.
    pub fn run(
        &mut self,
        schedule: &str,
        continue_exploring: bool,
        verbose: bool,
    ) -> PermuterResult<()> {
        log::init();
        let mut permutation = self.start_session(verbose)?;

        if !schedule.is_empty() {
            if let Err(e) = permutation.program(schedule) {
                permutation.stop();
                return Err(e);
            }
            pinfo!("starting from schedule \"{}\"", schedule);
        }

        if !schedule.is_empty() && !continue_exploring {
            return self.run_single(permutation);
        }
        self.run_exploration(permutation)
    }

    fn run_single(&mut self, mut permutation: Permutation) -> PermuterResult<()> {
        (self.begin)();
        match permutation.play(true) {
            Ok(()) => {
                (self.end)(&permutation.schedule_string());
                permutation.stop();
                Ok(())
            }
            Err(e) => self.fail_session(permutation, e),
        }
    }

    fn run_exploration(&mut self, mut permutation: Permutation) -> PermuterResult<()> {
        let mut explored = 0u64;
        loop {
            (self.begin)();
            match permutation.play(true) {
                Ok(()) => {
                    explored += 1;
                    (self.end)(&permutation.schedule_string());
                    if !permutation.next(self.limit) {
                        break;
                    }
                }
                Err(PermuterError::Assertion(failure)) => {
                    let failing = permutation.schedule_string();
                    perror!(
                        "assertion failed after {} permutations: {} (schedule \"{}\")",
                        explored,
                        failure,
                        failing
                    );
                    permutation.stop();
                    self.replay_failure(&failing);
                    return Err(PermuterError::Assertion(failure));
                }
                Err(e) => return self.fail_session(permutation, e),
            }
        }
        permutation.stop();
        pinfo!("explored {} permutations, all passed", explored);
        Ok(())
    }

    /// Tear a session down appropriately for `e` and return it
    fn fail_session(&mut self, mut permutation: Permutation, e: PermuterError) -> PermuterResult<()> {
        match &e {
            PermuterError::Deadlock { schedule } => {
                perror!("deadlock after schedule \"{}\"", schedule);
                // The deadlocked closures can never drain; detach them.
                permutation.abandon();
            }
            _ => {
                perror!("{}", e);
                permutation.stop();
            }
        }
        Err(e)
    }

    /// Replay a failing schedule once on a fresh session with diagnostics
    ///
    /// Output-only; the original failure is what gets returned. A replay
    /// that does not reproduce the failure means the test closures are
    /// nondeterministic between checkpoints, which is worth a warning.
    fn replay_failure(&mut self, failing: &str) {
        let saved = log::log_level();
        log::set_log_level(LogLevel::Debug);

        let replayed = self.start_session(true).and_then(|mut replay| {
            replay.program(failing)?;
            (self.begin)();
            let result = replay.play(true);
            (self.end)(failing);
            match result {
                Err(PermuterError::Deadlock { .. }) => replay.abandon(),
                _ => replay.stop(),
            }
            result
        });
        match replayed {
            Err(PermuterError::Assertion(_)) => {}
            Err(e) => pwarn!("failure replay hit a different error: {}", e),
            Ok(()) => pwarn!("failure replay passed; test code is nondeterministic"),
        }

        log::set_log_level(saved);
    }

    fn start_session(&self, verbose: bool) -> PermuterResult<Permutation> {
        let mut threads = Vec::with_capacity(self.tests.len());
        for (i, test) in self.tests.iter().enumerate() {
            let thi = ThreadIndex::new(i as u32);
            let thread = TestThread::start(thi, thi.digit(), !verbose, Arc::clone(test))
                .map_err(|e| {
                    PermuterError::programming(format!("spawning thread {} failed: {}", thi, e))
                })?;
            threads.push(thread);
        }
        Ok(Permutation::new(PerThread::new(threads)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::test_fn;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_exploration_counts_permutations() {
        // Two single-yield threads: six interleavings.
        let count = Arc::new(AtomicU64::new(0));
        let count_in_end = Arc::clone(&count);
        let mut permuter = ThreadPermuter::new(
            || {},
            vec![
                test_fn(|cp| {
                    cp.yield_now();
                    Ok(())
                }),
                test_fn(|cp| {
                    cp.yield_now();
                    Ok(())
                }),
            ],
            move |_schedule| {
                count_in_end.fetch_add(1, Ordering::SeqCst);
            },
        );
        permuter.run("", false, false).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_begin_resets_between_permutations() {
        let value = Arc::new(AtomicU64::new(0));
        let value_in_begin = Arc::clone(&value);
        let value_in_test = Arc::clone(&value);

        let mut permuter = ThreadPermuter::new(
            move || value_in_begin.store(0, Ordering::SeqCst),
            vec![
                test_fn(move |cp| {
                    value_in_test.fetch_add(1, Ordering::SeqCst);
                    cp.yield_now();
                    crate::tp_assert!(value_in_test.load(Ordering::SeqCst) <= 2);
                    Ok(())
                }),
                test_fn(|cp| {
                    cp.yield_now();
                    Ok(())
                }),
            ],
            |_| {},
        );
        // Without the begin reset the counter would keep growing and the
        // assertion would fail on the third permutation.
        permuter.run("", false, false).unwrap();
        assert_eq!(value.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_run_reports_schedule() {
        let mut permuter = ThreadPermuter::new(
            || {},
            vec![
                test_fn(|cp| {
                    cp.yield_now();
                    Ok(())
                }),
                test_fn(|cp| {
                    cp.yield_now();
                    crate::tp_assert!(false, "always fails");
                    Ok(())
                }),
            ],
            |_| {},
        );
        let err = permuter.run("", false, false).unwrap_err();
        match err {
            PermuterError::Assertion(failure) => {
                assert_eq!(failure.message(), "always fails");
            }
            other => panic!("expected assertion, got {}", other),
        }
    }

    #[test]
    fn test_explicit_schedule_single_shot() {
        let schedules = Arc::new(std::sync::Mutex::new(Vec::new()));
        let schedules_in_end = Arc::clone(&schedules);
        let mut permuter = ThreadPermuter::new(
            || {},
            vec![
                test_fn(|cp| {
                    cp.yield_now();
                    Ok(())
                }),
                test_fn(|cp| {
                    cp.yield_now();
                    Ok(())
                }),
            ],
            move |schedule: &str| {
                schedules_in_end.lock().unwrap().push(schedule.to_string());
            },
        );
        permuter.run("10", false, false).unwrap();
        let recorded = schedules.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("10"));
    }
}
