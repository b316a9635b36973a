//! Test thread wrapper and checkpoint handle
//!
//! A [`TestThread`] binds one OS thread to one test closure for the
//! lifetime of a permuter session. The closure is re-invoked from scratch
//! once per explored permutation and advances one checkpoint per explicit
//! `step()` request; between checkpoints it runs uninterrupted.
//!
//! The closure receives an explicit [`Checkpoint`] handle and threads it
//! through every checkpoint call, so there is no ambient per-OS-thread
//! global state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use permuter_core::{CheckpointState, Failure, TestResult, ThreadIndex};
use permuter_core::{pdebug, ptrace};

use crate::rendezvous::Rendezvous;
use crate::sync::CvShared;

/// A test closure, re-invoked once per explored permutation
///
/// Assertion failures travel as `Err(Failure)` with `?`-propagation up to
/// this boundary; they never unwind across the OS-thread boundary.
pub type TestFn = Arc<dyn Fn(&Checkpoint) -> TestResult + Send + Sync + 'static>;

/// Wrap a closure as a [`TestFn`]
pub fn test_fn<F>(f: F) -> TestFn
where
    F: Fn(&Checkpoint) -> TestResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// State shared between the driver side and the worker OS thread
///
/// Written only by whichever side currently owns the rendezvous slot.
#[derive(Debug)]
pub(crate) struct ThreadShared {
    thi: ThreadIndex,
    name: char,
    rendezvous: Rendezvous,
    cell: Mutex<ReportCell>,
    /// Set once at session end; afterwards every checkpoint is a no-op so
    /// the closure drains without parking.
    stopping: AtomicBool,
    /// Gates per-thread shim diagnostics.
    diagnostics: AtomicBool,
}

/// What the worker reported at its latest checkpoint
#[derive(Debug)]
struct ReportCell {
    state: CheckpointState,
    condvar: Option<Arc<CvShared>>,
    failure: Option<Failure>,
    /// Armed by `Checkpoint::progress`; consumed by the next `blocked()`.
    progress: bool,
}

impl ThreadShared {
    fn new(thi: ThreadIndex, name: char, diagnostics: bool) -> Self {
        ThreadShared {
            thi,
            name,
            rendezvous: Rendezvous::new(),
            cell: Mutex::new(ReportCell {
                state: CheckpointState::Yielding,
                condvar: None,
                failure: None,
                progress: false,
            }),
            stopping: AtomicBool::new(false),
            diagnostics: AtomicBool::new(diagnostics),
        }
    }

    fn lock_cell(&self) -> std::sync::MutexGuard<'_, ReportCell> {
        self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Checkpoint handle passed to a test closure
///
/// Obtained once at the worker's entry point and threaded through every
/// checkpoint call, including the `Mutex`/`ConditionVariable` shims.
pub struct Checkpoint {
    shared: Arc<ThreadShared>,
}

impl Checkpoint {
    /// The index of the owning thread
    #[inline]
    pub fn index(&self) -> ThreadIndex {
        self.shared.thi
    }

    /// The single-character name of the owning thread
    #[inline]
    pub fn name(&self) -> char {
        self.shared.name
    }

    /// Yield: let the scheduler pick any thread for the next step
    ///
    /// The TPY of the checkpoint vocabulary.
    pub fn yield_now(&self) {
        ptrace!("[{}] yield", self.shared.name);
        self.pause(CheckpointState::Yielding, None);
    }

    /// Report a failed acquisition: force another thread to run first
    ///
    /// The TPB of the checkpoint vocabulary. If [`progress`](Self::progress)
    /// was called since the last block, reports `BlockingWithProgress` so
    /// previously-blocked threads are reconsidered.
    pub fn blocked(&self) {
        let made_progress = {
            let mut cell = self.shared.lock_cell();
            std::mem::take(&mut cell.progress)
        };
        let state = if made_progress {
            CheckpointState::BlockingWithProgress
        } else {
            CheckpointState::Blocking
        };
        ptrace!("[{}] {}", self.shared.name, state);
        self.pause(state, None);
    }

    /// Record that this thread made forward progress
    ///
    /// The TPP of the checkpoint vocabulary: call just before a
    /// [`blocked`](Self::blocked) that follows real progress, so other
    /// previously-blocked threads become runnable again.
    pub fn progress(&self) {
        self.shared.lock_cell().progress = true;
    }

    /// True once the session is tearing down
    ///
    /// The sync shims use this to fall back to real blocking while the
    /// closures drain.
    pub(crate) fn stopping(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// True when this thread should emit shim diagnostics
    pub(crate) fn diagnostics(&self) -> bool {
        self.shared.diagnostics.load(Ordering::Relaxed)
    }

    /// Park at a checkpoint with the given report
    ///
    /// No-op during teardown. Called by the shims for the synchronization
    /// states and by the public methods above.
    pub(crate) fn pause(&self, state: CheckpointState, condvar: Option<Arc<CvShared>>) {
        if self.stopping() {
            return;
        }
        {
            let mut cell = self.shared.lock_cell();
            cell.state = state;
            cell.condvar = condvar;
        }
        self.shared.rendezvous.park();
    }
}

/// One persistent OS thread bound to one test closure
///
/// Lifecycle: created at session start, started once (cold rendezvous),
/// stepped repeatedly, stopped and joined at session end.
#[derive(Debug)]
pub struct TestThread {
    thi: ThreadIndex,
    name: char,
    shared: Arc<ThreadShared>,
    handle: Option<JoinHandle<()>>,
}

impl TestThread {
    /// Spawn the OS thread and block until it parks just before first
    /// invoking the closure (cold rendezvous)
    pub fn start(
        thi: ThreadIndex,
        name: char,
        suppress_diagnostics: bool,
        test: TestFn,
    ) -> std::io::Result<TestThread> {
        let shared = Arc::new(ThreadShared::new(thi, name, !suppress_diagnostics));
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("permuter-{}", name))
            .spawn(move || worker_main(worker_shared, test))?;
        shared.rendezvous.wait_parked();
        pdebug!("thread {} started and parked", name);
        Ok(TestThread {
            thi,
            name,
            shared,
            handle: Some(handle),
        })
    }

    /// The index of this thread
    #[inline]
    pub fn index(&self) -> ThreadIndex {
        self.thi
    }

    /// The single-character name of this thread
    #[inline]
    pub fn name(&self) -> char {
        self.name
    }

    /// Resume the parked thread and block until it reaches its next
    /// checkpoint or the closure returns
    ///
    /// Caller and thread are never both running.
    pub fn step(&self) -> CheckpointState {
        self.shared.rendezvous.resume_and_wait();
        let state = self.shared.lock_cell().state;
        ptrace!("thread {} reported {}", self.name, state);
        state
    }

    /// The condition variable referenced by the latest report, if any
    pub(crate) fn condvar(&self) -> Option<Arc<CvShared>> {
        self.shared.lock_cell().condvar.clone()
    }

    /// Take the captured assertion failure from a `Failed` report
    pub fn take_failure(&self) -> Option<Failure> {
        self.shared.lock_cell().failure.take()
    }

    /// Enable or disable this thread's shim diagnostics
    pub fn set_diagnostics(&self, enabled: bool) {
        self.shared.diagnostics.store(enabled, Ordering::Relaxed);
    }

    /// Mark the session as ending and resume the thread once
    ///
    /// After this, every checkpoint in the closure is a no-op, so the
    /// thread drains to the end of its run loop. Call on every thread
    /// before joining any of them, so closures blocked on each other can
    /// finish concurrently.
    pub fn signal_stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.rendezvous.resume();
    }

    /// Wait for the OS thread to exit
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Entry point of the worker OS thread
fn worker_main(shared: Arc<ThreadShared>, test: TestFn) {
    let cp = Checkpoint {
        shared: Arc::clone(&shared),
    };
    // Cold rendezvous: park before first invoking the closure.
    shared.rendezvous.park();
    while !shared.stopping.load(Ordering::Acquire) {
        let state = match test(&cp) {
            Ok(()) => CheckpointState::Finished,
            Err(failure) => {
                pdebug!("thread {} failed: {}", shared.name, failure);
                shared.lock_cell().failure = Some(failure);
                CheckpointState::Failed
            }
        };
        // A leftover progress mark must not leak into the next permutation.
        shared.lock_cell().progress = false;
        cp.pause(state, None);
    }
}

/// Assert a checkpoint-local invariant inside test code
///
/// On failure, early-returns an `Err(Failure)` carrying the message and
/// source location; the thread's run loop captures it and reports a
/// `failed` checkpoint. Usable from any function returning
/// [`TestResult`](permuter_core::TestResult).
///
/// ```ignore
/// fn body(cp: &Checkpoint, run: &TestRun) -> TestResult {
///     tp_assert!(run.readers() == 0);
///     tp_assert!(!run.writer(), "writer flag set with {} readers", run.readers());
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! tp_assert {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::Failure::new(
                concat!("assertion failed: ", stringify!($cond)),
                file!(),
                line!(),
            ));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::Failure::new(format!($($arg)+), file!(), line!()));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_step_finish_stop() {
        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(|cp| {
                cp.yield_now();
                cp.yield_now();
                Ok(())
            }),
        )
        .unwrap();

        assert_eq!(thread.step(), CheckpointState::Yielding);
        assert_eq!(thread.step(), CheckpointState::Yielding);
        assert_eq!(thread.step(), CheckpointState::Finished);
        thread.signal_stop();
        thread.join();
    }

    #[test]
    fn test_closure_reinvoked_per_permutation() {
        use std::sync::atomic::AtomicUsize;
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_in_test = Arc::clone(&runs);
        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(move |cp| {
                runs_in_test.fetch_add(1, Ordering::SeqCst);
                cp.yield_now();
                Ok(())
            }),
        )
        .unwrap();

        for expected in 1..=3 {
            assert_eq!(thread.step(), CheckpointState::Yielding);
            assert_eq!(thread.step(), CheckpointState::Finished);
            assert_eq!(runs.load(Ordering::SeqCst), expected);
        }
        thread.signal_stop();
        thread.join();
    }

    #[test]
    fn test_failure_captured_not_propagated() {
        fn body() -> TestResult {
            tp_assert!(1 == 2);
            Ok(())
        }

        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(|cp| {
                cp.yield_now();
                body()
            }),
        )
        .unwrap();

        assert_eq!(thread.step(), CheckpointState::Yielding);
        assert_eq!(thread.step(), CheckpointState::Failed);
        let failure = thread.take_failure().expect("failure captured");
        assert!(failure.message().contains("1 == 2"));
        thread.signal_stop();
        thread.join();
    }

    #[test]
    fn test_progress_arms_next_block() {
        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(|cp| {
                cp.blocked();
                cp.progress();
                cp.blocked();
                Ok(())
            }),
        )
        .unwrap();

        assert_eq!(thread.step(), CheckpointState::Blocking);
        assert_eq!(thread.step(), CheckpointState::BlockingWithProgress);
        assert_eq!(thread.step(), CheckpointState::Finished);
        thread.signal_stop();
        thread.join();
    }

    #[test]
    fn test_stop_mid_closure_drains() {
        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(|cp| {
                for _ in 0..1000 {
                    cp.yield_now();
                }
                Ok(())
            }),
        )
        .unwrap();

        // Park the thread mid-closure, then stop: the remaining yields
        // become no-ops and the thread drains.
        assert_eq!(thread.step(), CheckpointState::Yielding);
        thread.signal_stop();
        thread.join();
    }
}
