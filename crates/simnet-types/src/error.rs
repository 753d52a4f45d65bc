//! Unified error interface for simnet.
//!
//! Every simnet error type implements [`ErrorCode`] so callers can handle
//! failures by code instead of matching on foreign enums, and so logs
//! carry a stable, greppable identifier.
//!
//! # Code Format
//!
//! - UPPER_SNAKE_CASE, prefixed per crate: `BUS_`, `SCRIPT_`, `NET_`
//! - Stable once defined (changing a code is a breaking change)
//!
//! # Example
//!
//! ```
//! use simnet_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum QueueError {
//!     Full,
//!     Closed,
//! }
//!
//! impl ErrorCode for QueueError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Full => "QUEUE_FULL",
//!             Self::Closed => "QUEUE_CLOSED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Full)
//!     }
//! }
//!
//! assert_eq!(QueueError::Full.code(), "QUEUE_FULL");
//! assert!(QueueError::Full.is_recoverable());
//! ```

/// Machine-readable error code plus recoverability flag.
pub trait ErrorCode {
    /// Returns the stable, UPPER_SNAKE_CASE code for this error.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    ///
    /// Contract mismatches and malformed input are not recoverable;
    /// full queues and closed-but-restartable channels are.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that every error in `variants` has a well-formed code with the
/// given prefix. Intended for exhaustive per-crate error tests.
///
/// # Panics
///
/// Panics when a code is empty, lacks the prefix, or is not
/// UPPER_SNAKE_CASE.
pub fn assert_error_codes<E: ErrorCode + std::fmt::Debug>(variants: &[E], prefix: &str) {
    for err in variants {
        let code = err.code();
        assert!(!code.is_empty(), "empty code for {err:?}");
        assert!(
            code.starts_with(prefix),
            "code {code} for {err:?} lacks prefix {prefix}"
        );
        assert!(
            code.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()),
            "code {code} for {err:?} is not UPPER_SNAKE_CASE"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum Sample {
        A,
        B,
    }

    impl ErrorCode for Sample {
        fn code(&self) -> &'static str {
            match self {
                Self::A => "TEST_A",
                Self::B => "TEST_B",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::A)
        }
    }

    #[test]
    fn codes_accepted() {
        assert_error_codes(&[Sample::A, Sample::B], "TEST_");
    }

    #[test]
    #[should_panic(expected = "lacks prefix")]
    fn wrong_prefix_rejected() {
        assert_error_codes(&[Sample::A], "OTHER_");
    }
}
