//! # permuter-core
//!
//! Core types for the thread permuter, a deterministic
//! concurrency-testing engine.
//!
//! This crate is self-contained and spawns no threads; the single-stepping
//! scheduler itself lives in the `permuter` crate.
//!
//! ## Modules
//!
//! - `index` - Thread index type
//! - `set` - Immutable-value bit-set over thread indexes
//! - `per_thread` - Index-safe per-thread storage
//! - `state` - Checkpoint state enum
//! - `error` - Error taxonomy and captured assertion failures
//! - `log` - Diagnostic print macros
//! - `env` - Environment variable utilities

pub mod env;
pub mod error;
pub mod index;
pub mod log;
pub mod per_thread;
pub mod set;
pub mod state;

// Re-exports for convenience
pub use error::{Failure, PermuterError, PermuterResult, TestResult};
pub use index::ThreadIndex;
pub use log::{set_flush_enabled, set_log_level, LogLevel};
pub use per_thread::PerThread;
pub use set::ThreadSet;
pub use state::CheckpointState;
pub use env::{env_get, env_get_bool, env_get_opt};
