//! A reader/writer spin lock built from the blocked/progress checkpoint
//! vocabulary, exercised across every interleaving: the writer is always
//! exclusive, and no schedule deadlocks.

use std::sync::Arc;

use permuter::thread::Checkpoint;
use permuter::{test_fn, tp_assert, Mutex, TestFn, ThreadPermuter};

#[derive(Default)]
struct RwState {
    readers: u32,
    writer: bool,
}

/// Spin-style reader/writer lock
///
/// A failed acquisition reports a `blocked` checkpoint; releases arm the
/// next block with a progress mark so other spinners get reconsidered.
#[derive(Default)]
struct RwSpin {
    state: Mutex<RwState>,
}

impl RwSpin {
    fn read_lock(&self, cp: &Checkpoint) {
        loop {
            {
                let mut state = self.state.lock(cp);
                if !state.writer {
                    state.readers += 1;
                    return;
                }
            }
            cp.blocked();
        }
    }

    fn read_unlock(&self, cp: &Checkpoint) {
        self.state.lock(cp).readers -= 1;
        cp.progress();
    }

    fn write_lock(&self, cp: &Checkpoint) {
        loop {
            {
                let mut state = self.state.lock(cp);
                if !state.writer && state.readers == 0 {
                    state.writer = true;
                    return;
                }
            }
            cp.blocked();
        }
    }

    fn write_unlock(&self, cp: &Checkpoint) {
        self.state.lock(cp).writer = false;
        cp.progress();
    }

    fn snapshot(&self, cp: &Checkpoint) -> (u32, bool) {
        let state = self.state.lock(cp);
        (state.readers, state.writer)
    }
}

fn reader(lock: Arc<RwSpin>) -> TestFn {
    test_fn(move |cp| {
        lock.read_lock(cp);
        cp.yield_now();
        let (readers, writer) = lock.snapshot(cp);
        tp_assert!(!writer, "writer active with {} readers inside", readers);
        tp_assert!(readers >= 1);
        lock.read_unlock(cp);
        Ok(())
    })
}

fn writer(lock: Arc<RwSpin>) -> TestFn {
    test_fn(move |cp| {
        lock.write_lock(cp);
        cp.yield_now();
        let (readers, writer) = lock.snapshot(cp);
        tp_assert!(writer && readers == 0, "writer not exclusive: {} readers", readers);
        lock.write_unlock(cp);
        Ok(())
    })
}

#[test]
fn writer_is_exclusive_in_every_interleaving() {
    let lock = Arc::new(RwSpin::default());
    let mut permuter = ThreadPermuter::new(
        || {},
        vec![
            reader(Arc::clone(&lock)),
            reader(Arc::clone(&lock)),
            writer(Arc::clone(&lock)),
        ],
        |_| {},
    );
    // Err here would be either a violated invariant or a deadlocked
    // schedule; both count as failures of the lock.
    permuter.run("", false, false).unwrap();
}
