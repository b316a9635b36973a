//! Checkpoint state reported by a stepped thread

use core::fmt;

/// What a test thread reported at its latest checkpoint
///
/// Exactly one value is produced per call to `step()`. The scheduler folds
/// these into its running / blocked / waiting / woken sets; the thread
/// itself never mutates scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    /// Non-synchronizing step; any thread may run next
    Yielding,

    /// Failed to acquire a contended resource; ineligible until progress
    /// is observed elsewhere
    Blocking,

    /// Like [`Blocking`](Self::Blocking), but issued right after this thread
    /// signaled forward progress, so previously-blocked threads must be
    /// reconsidered
    BlockingWithProgress,

    /// Released a lock and now waits on a condition variable; ineligible
    /// until targeted by a notify
    Waiting,

    /// Resumed after a notify targeted this thread
    Woken,

    /// Just called `notify_one` on a condition variable with waiters
    NotifyOne,

    /// Just called `notify_all` on a condition variable with waiters
    NotifyAll,

    /// An invariant check in the test code failed; the failure is captured
    /// on the thread and re-raised by the scheduler
    Failed,

    /// The test closure returned; the thread retires for this permutation
    Finished,
}

impl CheckpointState {
    /// True when the thread will not reach another checkpoint this
    /// permutation
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, CheckpointState::Failed | CheckpointState::Finished)
    }
}

impl fmt::Display for CheckpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckpointState::Yielding => "yielding",
            CheckpointState::Blocking => "blocking",
            CheckpointState::BlockingWithProgress => "blocking_with_progress",
            CheckpointState::Waiting => "waiting",
            CheckpointState::Woken => "woken",
            CheckpointState::NotifyOne => "notify_one",
            CheckpointState::NotifyAll => "notify_all",
            CheckpointState::Failed => "failed",
            CheckpointState::Finished => "finished",
        };
        write!(f, "{}", s)
    }
}
