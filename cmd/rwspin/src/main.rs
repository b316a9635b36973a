//! Reader/writer spin-lock verification example
//!
//! Builds a reader/writer spin lock from the blocked/progress checkpoint
//! vocabulary and verifies writer exclusivity across every interleaving of
//! two readers and one writer. Plant a bug in `write_lock` (drop the
//! `readers == 0` check) to watch the permuter find the schedule that
//! breaks it.
//!
//! # Usage
//!
//! ```text
//! rwspin                explore every interleaving
//! rwspin 010212         replay one schedule
//! rwspin -v             per-thread diagnostics
//! ```
//!
//! # Environment Variables
//!
//! - `TP_FLUSH_EPRINT=1` - Flush debug output immediately
//! - `TP_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use std::sync::Arc;

use permuter::thread::Checkpoint;
use permuter::{test_fn, tp_assert, Mutex, TestFn, ThreadPermuter};

#[derive(Default)]
struct RwState {
    readers: u32,
    writer: bool,
}

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
}

fn reader(lock: Arc<RwSpin>) -> TestFn {
    test_fn(move |cp| {
        lock.read_lock(cp);
        cp.yield_now();
        {
            let state = lock.state.lock(cp);
            tp_assert!(!state.writer, "writer active under a read lock");
        }
        lock.read_unlock(cp);
        Ok(())
    })
}

fn writer(lock: Arc<RwSpin>) -> TestFn {
    test_fn(move |cp| {
        lock.write_lock(cp);
        cp.yield_now();
        {
            let state = lock.state.lock(cp);
            tp_assert!(
                state.writer && state.readers == 0,
                "writer sharing with {} readers",
                state.readers
            );
        }
        lock.write_unlock(cp);
        Ok(())
    })
}

fn main() {
    let mut schedule = String::new();
    let mut continue_exploring = false;
    let mut verbose = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-c" | "--continue" => continue_exploring = true,
            "-v" | "--verbose" => verbose = true,
            other => schedule = other.to_string(),
        }
    }

    permuter::init_logging();

    let lock = Arc::new(RwSpin::default());
    let mut count = 0u64;
    let mut permuter = ThreadPermuter::new(
        || {},
        vec![
            reader(Arc::clone(&lock)),
            reader(Arc::clone(&lock)),
            writer(lock),
        ],
        move |schedule: &str| {
            count += 1;
            if count % 100 == 0 {
                println!("{} schedules, latest {}", count, schedule);
            }
        },
    );

    match permuter.run(&schedule, continue_exploring, verbose) {
        Ok(()) => println!("writer exclusivity holds across every interleaving"),
        Err(e) => {
            eprintln!("rwspin: {}", e);
            std::process::exit(1);
        }
    }
}
