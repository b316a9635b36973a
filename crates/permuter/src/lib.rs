//! # permuter - Deterministic Thread Interleaving Tester
//!
//! Exhaustively tests a small piece of multi-threaded code by running its
//! threads under *every* interleaving of their checkpoints, one at a time,
//! deterministically.
//!
//! ## Features
//!
//! - **Real OS threads**: test code runs unmodified on `std::thread`, only
//!   ever one at a time via a strict pause/resume handshake
//! - **Exhaustive**: depth-first enumeration of every schedule, each visited
//!   exactly once, in lexicographic order
//! - **Reproducible**: every run is identified by a schedule string
//!   (`"0102..."`, one digit per scheduling decision) that can be replayed
//! - **Sync shims**: drop-in `Mutex` and `ConditionVariable` that turn
//!   contention and wakeup races into explored scheduling decisions
//! - **Deadlock detection**: a schedule where no thread can run is reported
//!   with its partial schedule string instead of hanging
//! - **Counterexamples**: `tp_assert!` failures name the schedule, message
//!   and source location, and are replayed once with diagnostics raised
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use permuter::{test_fn, Mutex, ThreadPermuter};
//!
//! fn main() {
//!     let value = Arc::new(Mutex::new(0));
//!     let (a, b) = (Arc::clone(&value), Arc::clone(&value));
//!
//!     let mut permuter = ThreadPermuter::new(
//!         || {},
//!         vec![
//!             test_fn(move |cp| {
//!                 *a.lock(cp) += 7;
//!                 Ok(())
//!             }),
//!             test_fn(move |cp| {
//!                 *b.lock(cp) *= 3;
//!                 Ok(())
//!             }),
//!         ],
//!         |schedule| println!("passed schedule {}", schedule),
//!     );
//!     permuter.run("", false, false).unwrap();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Test Code                              │
//! │      closures, Mutex/ConditionVariable, tp_assert!          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ checkpoints
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ThreadPermuter                          │
//! │            play / next loop, failure replay                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ step(thi)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Permutation                            │
//! │   running/blocked/waiting/woken sets, recorded schedule     │
//! └─────────────────────────────────────────────────────────────┘
//!          │ resume_and_wait  │                  │
//!          ▼                  ▼                  ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │TestThread │      │TestThread │      │TestThread │
//!    │ (parked)  │      │ (parked)  │      │ (parked)  │
//!    └───────────┘      └───────────┘      └───────────┘
//! ```

pub mod permutation;
pub mod permuter;
pub mod sync;
pub mod thread;

mod rendezvous;

// Re-export core types
pub use permuter_core::{
    CheckpointState, Failure, LogLevel, PermuterError, PermuterResult, PerThread, TestResult,
    ThreadIndex, ThreadSet,
};

// Re-export the diagnostic print macros
pub use permuter_core::{pdebug, perror, pinfo, ptrace, pwarn};
pub use permuter_core::log::{init as init_logging, set_flush_enabled, set_log_level};

// Re-export env utilities
pub use permuter_core::{env_get, env_get_bool, env_get_opt};

pub use permutation::Permutation;
pub use permuter::ThreadPermuter;
pub use sync::{ConditionVariable, Mutex, MutexGuard};
pub use thread::{test_fn, Checkpoint, TestFn, TestThread};
