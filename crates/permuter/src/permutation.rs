//! Interleaving enumeration engine
//!
//! A [`Permutation`] owns the session's test threads and a recorded
//! schedule: one [`StepRecord`] per step, each remembering which threads
//! were eligible at that position. `play` replays the record from a fresh
//! invocation of every closure, `complete` extends it with the
//! lowest-index eligible thread until everything finishes, and `next`
//! advances the record to the lexicographically next schedule. Driving
//! those three in a loop enumerates every interleaving exactly once, in
//! depth-first order.

use permuter_core::{pdebug, ptrace};
use permuter_core::{
    CheckpointState, Failure, PermuterError, PermuterResult, PerThread, ThreadIndex, ThreadSet,
};

use crate::thread::TestThread;

/// One recorded scheduling decision
///
/// `eligible` snapshots the choice set at this position; `next` consults it
/// to find untried alternatives without replaying anything.
#[derive(Debug, Clone, Copy)]
struct StepRecord {
    thi: ThreadIndex,
    eligible: ThreadSet,
}

/// The scheduler state plus the recorded schedule for one session
#[derive(Debug)]
pub struct Permutation {
    threads: PerThread<TestThread>,
    /// Threads whose closure has not finished in the current replay.
    running: ThreadSet,
    /// Threads that must not run until another thread makes progress.
    blocked: ThreadSet,
    /// Threads parked inside `ConditionVariable::wait`, pending a notify.
    waiting: ThreadSet,
    /// Threads released by a notify that have not yet reported `woken`.
    woken: ThreadSet,
    /// Candidates of a `notify_one` fired last step: the very next decision
    /// picks the race winner from this set and re-blocks the losers.
    race: ThreadSet,
    steps: Vec<StepRecord>,
}

impl Permutation {
    /// Take ownership of the session's threads, with an empty record
    pub fn new(threads: PerThread<TestThread>) -> Self {
        let n = threads.len();
        Permutation {
            threads,
            running: ThreadSet::full(n),
            blocked: ThreadSet::empty(),
            waiting: ThreadSet::empty(),
            woken: ThreadSet::empty(),
            race: ThreadSet::empty(),
            steps: Vec::new(),
        }
    }

    /// Number of threads in the session
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Number of recorded steps
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The set of threads the scheduler may pick right now
    ///
    /// Normally `running − blocked`; while a `notify_one` race is pending,
    /// only the woken candidates that have not re-blocked qualify, which
    /// forces the race to resolve on the very next step.
    pub fn eligible(&self) -> ThreadSet {
        if self.race.any() {
            self.race - self.blocked
        } else {
            self.running - self.blocked
        }
    }

    /// The schedule string for the recorded steps, one digit per step
    pub fn schedule_string(&self) -> String {
        self.steps.iter().map(|s| s.thi.digit()).collect()
    }

    /// Rewind the scheduler sets for a fresh replay
    ///
    /// Leaves the recorded steps in place; the threads rewind lazily, each
    /// one re-entering its closure on its next step.
    fn reset(&mut self) {
        self.running = ThreadSet::full(self.threads.len());
        self.blocked = ThreadSet::empty();
        self.waiting = ThreadSet::empty();
        self.woken = ThreadSet::empty();
        self.race = ThreadSet::empty();
    }

    /// Run thread `thi` to its next checkpoint and apply the report
    fn step(&mut self, thi: ThreadIndex) -> PermuterResult<CheckpointState> {
        if self.race.any() {
            // Commit the notify_one race: `thi` won the wakeup, the other
            // candidates lose their pending wake and return to blocked
            // (they never left `waiting`).
            debug_assert!(self.race.contains(thi));
            let losers = self.race - ThreadSet::single(thi);
            self.blocked |= losers;
            self.woken -= losers;
            self.waiting.remove(thi);
            self.race = ThreadSet::empty();
        }

        let state = self.threads[thi].step();
        ptrace!(
            "step {}: {} (running {}, blocked {}, waiting {}, woken {})",
            thi,
            state,
            self.running,
            self.blocked,
            self.waiting,
            self.woken
        );
        match state {
            CheckpointState::Yielding => self.progress_made(),
            CheckpointState::Blocking => {
                self.blocked.insert(thi);
            }
            CheckpointState::BlockingWithProgress => {
                // Everyone previously blocked on this thread's progress is
                // reconsidered; only condvar waiters stay out.
                self.blocked = (self.blocked & self.waiting) | ThreadSet::single(thi);
            }
            CheckpointState::Waiting => {
                // Entering a wait releases the guard's mutex, so threads
                // blocked on that mutex get reconsidered.
                self.blocked = (self.blocked & self.waiting) | ThreadSet::single(thi);
                self.waiting.insert(thi);
            }
            CheckpointState::Woken => {
                let cv = self.threads[thi].condvar().ok_or_else(|| {
                    PermuterError::programming(format!("thread {} woken without a condvar", thi))
                })?;
                if !cv.consume_wake() {
                    return Err(PermuterError::programming(format!(
                        "thread {} woke without an outstanding notify",
                        thi
                    )));
                }
                self.woken.remove(thi);
                self.progress_made();
            }
            CheckpointState::NotifyOne => {
                let cv = self.threads[thi].condvar().ok_or_else(|| {
                    PermuterError::programming(format!("thread {} notified without a condvar", thi))
                })?;
                // The condvar's own waiter set can still hold a thread that
                // already won an earlier race but has not reported `woken`
                // yet; only threads the scheduler knows as waiting race.
                let candidates = cv.waiters() & self.waiting;
                if candidates.none() {
                    self.progress_made();
                } else {
                    cv.add_wakes(1);
                    self.blocked -= candidates;
                    self.woken |= candidates;
                    self.race = candidates;
                }
            }
            CheckpointState::NotifyAll => {
                let cv = self.threads[thi].condvar().ok_or_else(|| {
                    PermuterError::programming(format!("thread {} notified without a condvar", thi))
                })?;
                let awoken = cv.waiters() & self.waiting;
                cv.add_wakes(awoken.count());
                self.blocked -= awoken;
                self.waiting -= awoken;
                self.woken |= awoken;
                self.progress_made();
            }
            CheckpointState::Finished => {
                self.running.remove(thi);
                self.progress_made();
            }
            CheckpointState::Failed => {
                let failure = self.threads[thi].take_failure().unwrap_or_else(|| {
                    Failure::new("failed checkpoint without a captured failure", file!(), line!())
                });
                return Err(PermuterError::Assertion(failure));
            }
        }
        Ok(state)
    }

    /// A thread demonstrably progressed; re-run every spinner
    ///
    /// Condvar waiters stay blocked until an explicit notify.
    fn progress_made(&mut self) {
        self.blocked &= self.waiting;
    }

    /// Replay the recorded steps from scratch
    ///
    /// Every recorded decision is re-verified against the freshly derived
    /// eligible set; a mismatch means the schedule is stale for the current
    /// test code and reports a programming error. With `run_complete`, the
    /// replay then extends the record to completion.
    pub fn play(&mut self, run_complete: bool) -> PermuterResult<()> {
        self.reset();
        for i in 0..self.steps.len() {
            let thi = self.steps[i].thi;
            let eligible = self.eligible();
            if !eligible.contains(thi) {
                return Err(PermuterError::programming(format!(
                    "schedule step {} picks thread {} but only {} are eligible",
                    i, thi, eligible
                )));
            }
            self.steps[i].eligible = eligible;
            self.step(thi)?;
        }
        if run_complete {
            self.complete()?;
        }
        Ok(())
    }

    /// Extend the record with first-eligible decisions until all threads
    /// finish
    ///
    /// Records a decision only while two or more threads are still running;
    /// the closing solo run has no alternatives and stays off the record.
    /// No eligible thread at any point is a deadlock, reported with the
    /// partial schedule.
    pub fn complete(&mut self) -> PermuterResult<()> {
        while self.running.count() > 1 {
            let eligible = self.eligible();
            let thi = match eligible.first() {
                Some(thi) => thi,
                None => return Err(self.deadlock()),
            };
            self.steps.push(StepRecord { thi, eligible });
            self.step(thi)?;
        }
        while let Some(thi) = self.running.first() {
            if !self.eligible().contains(thi) {
                return Err(self.deadlock());
            }
            self.step(thi)?;
        }
        Ok(())
    }

    fn deadlock(&self) -> PermuterError {
        let schedule = self.schedule_string();
        pdebug!(
            "deadlock after \"{}\": running {}, blocked {}, waiting {}",
            schedule,
            self.running,
            self.blocked,
            self.waiting
        );
        PermuterError::Deadlock { schedule }
    }

    /// Advance the record to the next schedule in lexicographic order
    ///
    /// Scans backwards from position `min(len, limit) - 1` for the first
    /// decision whose eligible snapshot holds an untried higher index;
    /// replaces it with the smallest such index and drops everything after
    /// it. Returns false when the (limited) space is exhausted. Positions
    /// at or beyond `limit` are never reconsidered.
    pub fn next(&mut self, limit: usize) -> bool {
        let mut i = self.steps.len().min(limit);
        while i > 0 {
            i -= 1;
            let rec = self.steps[i];
            if let Some(thi) = rec.eligible.next_above(rec.thi) {
                self.steps.truncate(i);
                self.steps.push(StepRecord {
                    thi,
                    eligible: rec.eligible,
                });
                return true;
            }
        }
        false
    }

    /// Load an explicit schedule string as the recorded prefix
    ///
    /// Eligible snapshots are left empty here; the verification replay in
    /// [`play`](Self::play) rebuilds them.
    pub fn program(&mut self, schedule: &str) -> PermuterResult<()> {
        let n = self.threads.len();
        let mut steps = Vec::with_capacity(schedule.len());
        for c in schedule.chars() {
            let thi = ThreadIndex::from_digit(c, n).ok_or_else(|| {
                PermuterError::programming(format!(
                    "invalid schedule character '{}' for {} threads",
                    c, n
                ))
            })?;
            steps.push(StepRecord {
                thi,
                eligible: ThreadSet::empty(),
            });
        }
        self.steps = steps;
        Ok(())
    }

    /// Enable or disable shim diagnostics on every thread
    pub fn set_diagnostics(&self, enabled: bool) {
        for thread in self.threads.iter() {
            thread.set_diagnostics(enabled);
        }
    }

    /// Stop and join every thread
    ///
    /// Signals all threads before joining any, so closures blocked on each
    /// other can drain concurrently with real blocking.
    pub fn stop(&mut self) {
        for thread in self.threads.iter() {
            thread.signal_stop();
        }
        for thread in self.threads.iter_mut() {
            thread.join();
        }
    }

    /// Drop the session without joining
    ///
    /// After a deadlock the deadlocked threads can never drain; their OS
    /// threads are detached and left parked.
    pub fn abandon(self) {
        pdebug!("abandoning {} threads", self.threads.len());
    }
}
