//! Driver/worker rendezvous
//!
//! A single-slot pause/resume handshake between the driver and one test
//! thread, built on a mutex/condvar pair. Strict alternation is the
//! correctness-critical property: at any instant either the driver or the
//! worker owns the slot, never both. This is deliberately not a thread
//! pool; one-at-a-time alternation is the whole point.

use std::sync::{Condvar, Mutex};

/// Whose turn it is to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Driver,
    Worker,
}

#[derive(Debug)]
struct Slot {
    turn: Side,
    /// True while the worker is parked inside `park()`. Lets `wait_parked`
    /// implement the cold rendezvous after spawn.
    worker_parked: bool,
}

/// One rendezvous slot shared by the driver and a single worker
#[derive(Debug)]
pub struct Rendezvous {
    slot: Mutex<Slot>,
    cond: Condvar,
}

impl Rendezvous {
    /// Create a slot with the driver side running
    pub fn new() -> Self {
        Rendezvous {
            slot: Mutex::new(Slot {
                turn: Side::Driver,
                worker_parked: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Worker side: hand the slot to the driver and block until resumed
    ///
    /// Called from the cold park right after spawn and from every
    /// checkpoint pause.
    pub fn park(&self) {
        let mut slot = self.lock();
        slot.worker_parked = true;
        slot.turn = Side::Driver;
        self.cond.notify_all();
        while slot.turn != Side::Worker {
            slot = self.wait(slot);
        }
        slot.worker_parked = false;
    }

    /// Driver side: block until the worker reaches its cold park
    pub fn wait_parked(&self) {
        let mut slot = self.lock();
        while !slot.worker_parked {
            slot = self.wait(slot);
        }
    }

    /// Driver side: hand the slot to the worker, block until handed back
    ///
    /// Returns once the worker has parked at its next checkpoint. The
    /// driver never runs while the worker does.
    pub fn resume_and_wait(&self) {
        let mut slot = self.lock();
        debug_assert!(slot.worker_parked, "resuming a worker that is not parked");
        slot.turn = Side::Worker;
        self.cond.notify_all();
        while slot.turn != Side::Driver || !slot.worker_parked {
            slot = self.wait(slot);
        }
    }

    /// Driver side: hand the slot to the worker without waiting
    ///
    /// Used during teardown, where the worker is expected to run off the
    /// end of its loop rather than park again.
    pub fn resume(&self) {
        let mut slot = self.lock();
        slot.turn = Side::Worker;
        self.cond.notify_all();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        // The engine never panics while holding this lock; recover from
        // poisoning rather than propagate it.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(
        &self,
        guard: std::sync::MutexGuard<'a, Slot>,
    ) -> std::sync::MutexGuard<'a, Slot> {
        self.cond.wait(guard).unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}
