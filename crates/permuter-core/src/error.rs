//! Error types for the thread permuter

use core::fmt;

/// Result type for permuter operations
pub type PermuterResult<T> = Result<T, PermuterError>;

/// Result type returned by test closures
///
/// An `Err` carries a [`Failure`] raised by `tp_assert!` (or `Checkpoint::fail`)
/// and propagates with `?` up to the closure boundary, where the thread's
/// run loop captures it. It never crosses the OS-thread boundary by unwinding.
pub type TestResult = Result<(), Failure>;

/// Errors that can occur while exploring permutations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermuterError {
    /// An engine invariant was violated, typically by replaying a stale
    /// explicit schedule string. Fatal, not recoverable.
    Programming(String),

    /// Every running thread was blocked during `complete()`. Fatal for the
    /// current run; carries the partial schedule that led there.
    Deadlock { schedule: String },

    /// A checkpoint-local invariant check in the tested code failed.
    /// Recoverable at the driver level: the identical permutation is
    /// replayed once with diagnostics enabled, then the run stops.
    Assertion(Failure),
}

impl PermuterError {
    /// Shorthand for a [`PermuterError::Programming`] value
    pub fn programming(msg: impl Into<String>) -> Self {
        PermuterError::Programming(msg.into())
    }
}

impl fmt::Display for PermuterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermuterError::Programming(msg) => write!(f, "programming error: {}", msg),
            PermuterError::Deadlock { schedule } => {
                write!(f, "deadlock detected after schedule \"{}\"", schedule)
            }
            PermuterError::Assertion(failure) => write!(f, "assertion failed: {}", failure),
        }
    }
}

impl std::error::Error for PermuterError {}

impl From<Failure> for PermuterError {
    fn from(failure: Failure) -> Self {
        PermuterError::Assertion(failure)
    }
}

/// A captured checkpoint assertion failure
///
/// Carries the message plus the source location of the failed check, so a
/// reported counterexample identifies both the schedule and the assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    message: String,
    file: &'static str,
    line: u32,
}

impl Failure {
    /// Capture a failure with its source location
    ///
    /// Usually constructed through the `tp_assert!` macro rather than
    /// directly.
    pub fn new(message: impl Into<String>, file: &'static str, line: u32) -> Self {
        Failure {
            message: message.into(),
            file,
            line,
        }
    }

    /// The failure message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source file of the failed check
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Source line of the failed check
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" at {}:{}", self.message, self.file, self.line)
    }
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PermuterError::Deadlock {
            schedule: "0120".to_string(),
        };
        assert_eq!(format!("{}", e), "deadlock detected after schedule \"0120\"");

        let e = PermuterError::programming("stepped blocked thread 2");
        assert_eq!(format!("{}", e), "programming error: stepped blocked thread 2");
    }

    #[test]
    fn test_failure_display_and_conversion() {
        let failure = Failure::new("x == 1", "tests/demo.rs", 42);
        assert_eq!(format!("{}", failure), "\"x == 1\" at tests/demo.rs:42");

        let e: PermuterError = failure.clone().into();
        assert!(matches!(e, PermuterError::Assertion(f) if f == failure));
    }
}
