//! Interleaving exploration example
//!
//! Three threads mutate one shared value under a mutex (`+= 7`, `*= 3`,
//! `%= 5`); the permuter runs them under every interleaving and prints the
//! final value per schedule.
//!
//! # Usage
//!
//! ```text
//! permute               explore every interleaving
//! permute 0102          replay one schedule
//! permute -c 0102       resume exploring from a schedule
//! permute -v            per-thread diagnostics
//! ```
//!
//! # Environment Variables
//!
//! - `TP_FLUSH_EPRINT=1` - Flush debug output immediately
//! - `TP_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use std::sync::Arc;

use permuter::{pinfo, test_fn, Mutex, ThreadPermuter};

// TP_LOG_LEVEL=debug cargo run -p permuter-permute
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

    let value = Arc::new(Mutex::new(1i64));

    let adder = {
        let value = Arc::clone(&value);
        test_fn(move |cp| {
            let mut guard = value.lock(cp);
            cp.yield_now();
            *guard += 7;
            Ok(())
        })
    };
    let multiplier = {
        let value = Arc::clone(&value);
        test_fn(move |cp| {
            let mut guard = value.lock(cp);
            cp.yield_now();
            *guard *= 3;
            Ok(())
        })
    };
    let reducer = {
        let value = Arc::clone(&value);
        test_fn(move |cp| {
            let mut guard = value.lock(cp);
            cp.yield_now();
            *guard %= 5;
            Ok(())
        })
    };

    let value_in_begin = Arc::clone(&value);
    let value_in_end = Arc::clone(&value);
    let mut permuter = ThreadPermuter::new(
        move || *value_in_begin.try_lock().unwrap() = 1,
        vec![adder, multiplier, reducer],
        move |schedule: &str| {
            println!("schedule {:<12} -> {}", schedule, *value_in_end.try_lock().unwrap());
        },
    );

    match permuter.run(&schedule, continue_exploring, verbose) {
        Ok(()) => pinfo!("exploration complete"),
        Err(e) => {
            eprintln!("permute: {}", e);
            std::process::exit(1);
        }
    }
}
