//! Checkpoint-aware synchronization shims
//!
//! Drop-in stand-ins for `std::sync::Mutex` and `Condvar` that report the
//! blocking/waiting/notify checkpoints the scheduler needs. Test code uses
//! these instead of the std types; outside a permuter session (once the
//! session is stopping) they degrade to the real primitives.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, TryLockError};

use permuter_core::{pdebug, CheckpointState, ThreadIndex, ThreadSet};

use crate::thread::Checkpoint;

/// A mutex whose contention is a scheduling decision
///
/// `lock` never blocks the OS thread during exploration: a failed
/// acquisition reports a `blocking` checkpoint and retries when the
/// scheduler runs this thread again. A successful acquisition is not a
/// checkpoint; the step continues.
#[derive(Debug, Default)]
pub struct Mutex<T> {
    inner: std::sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Mutex {
            inner: std::sync::Mutex::new(value),
        }
    }

    /// Acquire the lock, reporting `blocking` checkpoints while contended
    pub fn lock<'a>(&'a self, cp: &Checkpoint) -> MutexGuard<'a, T> {
        loop {
            if cp.stopping() {
                // Teardown: the scheduler is gone, block for real.
                let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                return MutexGuard { inner, mutex: self };
            }
            match self.inner.try_lock() {
                Ok(inner) => return MutexGuard { inner, mutex: self },
                Err(TryLockError::Poisoned(e)) => {
                    return MutexGuard {
                        inner: e.into_inner(),
                        mutex: self,
                    }
                }
                Err(TryLockError::WouldBlock) => {
                    if cp.diagnostics() {
                        pdebug!("[{}] mutex contended", cp.name());
                    }
                    cp.blocked();
                }
            }
        }
    }

    /// Single acquisition attempt, no checkpoint either way
    pub fn try_lock<'a>(&'a self) -> Option<MutexGuard<'a, T>> {
        match self.inner.try_lock() {
            Ok(inner) => Some(MutexGuard { inner, mutex: self }),
            Err(TryLockError::Poisoned(e)) => Some(MutexGuard {
                inner: e.into_inner(),
                mutex: self,
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// Guard returned by [`Mutex::lock`]
///
/// Keeps a handle on its parent so [`ConditionVariable::wait`] can release
/// and reacquire the same mutex.
#[derive(Debug)]
pub struct MutexGuard<'a, T> {
    inner: std::sync::MutexGuard<'a, T>,
    mutex: &'a Mutex<T>,
}

impl<'a, T> Deref for MutexGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<'a, T> DerefMut for MutexGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/// Condition-variable bookkeeping shared with the scheduler
///
/// The scheduler reads the waiter set at a `notify_one`/`notify_all` step
/// to decide which threads become runnable, and each woken thread settles
/// one outstanding wake when it reports `woken`.
#[derive(Debug, Default)]
pub(crate) struct CvShared {
    inner: std::sync::Mutex<CvInner>,
}

#[derive(Debug, Default)]
struct CvInner {
    waiters: ThreadSet,
    wake_outstanding: usize,
}

impl CvShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, CvInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The set of threads currently inside `wait` on this condvar
    pub(crate) fn waiters(&self) -> ThreadSet {
        self.lock().waiters
    }

    fn add_waiter(&self, thi: ThreadIndex) {
        self.lock().waiters.insert(thi);
    }

    fn remove_waiter(&self, thi: ThreadIndex) {
        self.lock().waiters.remove(thi);
    }

    /// Count wakes for the threads a notify step actually releases
    ///
    /// The scheduler calls this, not the shims: the raw waiter set can
    /// still hold a previous race winner that has not reported `woken`
    /// yet, and counting a wake for it would leak one.
    pub(crate) fn add_wakes(&self, n: usize) {
        self.lock().wake_outstanding += n;
    }

    /// Settle one wake; false means a `woken` report without a matching
    /// notify, which is an engine invariant violation
    pub(crate) fn consume_wake(&self) -> bool {
        let mut inner = self.lock();
        if inner.wake_outstanding == 0 {
            return false;
        }
        inner.wake_outstanding -= 1;
        true
    }
}

/// A condition variable whose wakeups are scheduling decisions
///
/// `notify_one` deliberately wakes *any* waiter depending on the explored
/// permutation, so tests cover every outcome of the wakeup race. There are
/// no spurious wakeups; predicate loops still work unchanged.
#[derive(Debug, Default)]
pub struct ConditionVariable {
    shared: Arc<CvShared>,
}

impl ConditionVariable {
    pub fn new() -> Self {
        ConditionVariable {
            shared: Arc::new(CvShared::default()),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<CvShared> {
        &self.shared
    }

    /// Release the guard's mutex and wait for a notification
    ///
    /// Reports a `waiting` checkpoint, later a `woken` checkpoint once this
    /// thread is chosen to proceed (reacquiring the mutex may report
    /// `blocking` checkpoints in between).
    pub fn wait<'a, T>(&self, cp: &Checkpoint, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        if cp.stopping() {
            // Teardown: behave like a spurious wakeup, the caller's
            // predicate loop re-checks and drains.
            return guard;
        }
        if cp.diagnostics() {
            pdebug!("[{}] waiting on condvar", cp.name());
        }
        self.shared.add_waiter(cp.index());
        let mutex = guard.mutex;
        drop(guard);
        cp.pause(CheckpointState::Waiting, Some(Arc::clone(&self.shared)));
        let guard = mutex.lock(cp);
        cp.pause(CheckpointState::Woken, Some(Arc::clone(&self.shared)));
        self.shared.remove_waiter(cp.index());
        guard
    }

    /// Predicate form of [`wait`](Self::wait)
    pub fn wait_while<'a, T, F>(
        &self,
        cp: &Checkpoint,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut guard) {
            if cp.stopping() {
                // Teardown: the predicate will never be satisfied by the
                // scheduler anymore; bail out with the lock held.
                return guard;
            }
            guard = self.wait(cp, guard);
        }
        guard
    }

    /// Wake one waiter, chosen by the explored permutation
    ///
    /// No checkpoint when nobody is waiting.
    pub fn notify_one(&self, cp: &Checkpoint) {
        if cp.stopping() || self.shared.waiters().none() {
            return;
        }
        if cp.diagnostics() {
            pdebug!("[{}] notify_one, waiters {}", cp.name(), self.shared.waiters());
        }
        cp.pause(CheckpointState::NotifyOne, Some(Arc::clone(&self.shared)));
    }

    /// Wake every waiter
    ///
    /// No checkpoint when nobody is waiting.
    pub fn notify_all(&self, cp: &Checkpoint) {
        if cp.stopping() {
            return;
        }
        let waiters = self.shared.waiters();
        if waiters.none() {
            return;
        }
        if cp.diagnostics() {
            pdebug!("[{}] notify_all, waiters {}", cp.name(), waiters);
        }
        cp.pause(CheckpointState::NotifyAll, Some(Arc::clone(&self.shared)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{test_fn, TestThread};

    #[test]
    fn test_uncontended_lock_is_not_a_checkpoint() {
        let value = Arc::new(Mutex::new(0u32));
        let value_in_test = Arc::clone(&value);
        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(move |cp| {
                *value_in_test.lock(cp) += 1;
                cp.yield_now();
                Ok(())
            }),
        )
        .unwrap();

        // First step runs through the uncontended lock to the yield.
        assert_eq!(thread.step(), CheckpointState::Yielding);
        assert_eq!(*value.try_lock().unwrap(), 1);
        assert_eq!(thread.step(), CheckpointState::Finished);
        thread.signal_stop();
        thread.join();
    }

    #[test]
    fn test_contended_lock_reports_blocking() {
        let value = Arc::new(Mutex::new(0u32));
        let held = value.try_lock().unwrap();
        let value_in_test = Arc::clone(&value);
        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(move |cp| {
                *value_in_test.lock(cp) += 1;
                Ok(())
            }),
        )
        .unwrap();

        assert_eq!(thread.step(), CheckpointState::Blocking);
        assert_eq!(thread.step(), CheckpointState::Blocking);
        drop(held);
        assert_eq!(thread.step(), CheckpointState::Finished);
        assert_eq!(*value.try_lock().unwrap(), 1);
        thread.signal_stop();
        thread.join();
    }

    #[test]
    fn test_wait_reports_waiting_then_woken() {
        struct Shared {
            mutex: Mutex<bool>,
            cond: ConditionVariable,
        }
        let shared = Arc::new(Shared {
            mutex: Mutex::new(false),
            cond: ConditionVariable::new(),
        });

        let waiter_shared = Arc::clone(&shared);
        let mut waiter = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(move |cp| {
                let guard = waiter_shared.mutex.lock(cp);
                let guard = waiter_shared
                    .cond
                    .wait_while(cp, guard, |ready| !*ready);
                drop(guard);
                Ok(())
            }),
        )
        .unwrap();

        let notifier_shared = Arc::clone(&shared);
        let mut notifier = TestThread::start(
            ThreadIndex::new(1),
            '1',
            true,
            test_fn(move |cp| {
                *notifier_shared.mutex.lock(cp) = true;
                notifier_shared.cond.notify_one(cp);
                Ok(())
            }),
        )
        .unwrap();

        assert_eq!(waiter.step(), CheckpointState::Waiting);
        assert_eq!(shared.cond.shared().waiters(), ThreadSet::single(ThreadIndex::new(0)));

        assert_eq!(notifier.step(), CheckpointState::NotifyOne);
        // The scheduler counts the wake when it processes the notify.
        shared.cond.shared().add_wakes(1);
        assert_eq!(notifier.step(), CheckpointState::Finished);

        assert_eq!(waiter.step(), CheckpointState::Woken);
        // And settles it when the waiter reports woken.
        assert!(shared.cond.shared().consume_wake());
        assert!(!shared.cond.shared().consume_wake());
        assert_eq!(waiter.step(), CheckpointState::Finished);
        assert!(shared.cond.shared().waiters().none());

        waiter.signal_stop();
        notifier.signal_stop();
        waiter.join();
        notifier.join();
    }

    #[test]
    fn test_notify_without_waiters_is_a_no_op() {
        let cond = Arc::new(ConditionVariable::new());
        let cond_in_test = Arc::clone(&cond);
        let mut thread = TestThread::start(
            ThreadIndex::new(0),
            '0',
            true,
            test_fn(move |cp| {
                cond_in_test.notify_one(cp);
                cond_in_test.notify_all(cp);
                cp.yield_now();
                Ok(())
            }),
        )
        .unwrap();

        // Both notifies fall through without a checkpoint.
        assert_eq!(thread.step(), CheckpointState::Yielding);
        assert_eq!(thread.step(), CheckpointState::Finished);
        thread.signal_stop();
        thread.join();
    }
}
