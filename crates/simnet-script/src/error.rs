//! Script adapter errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`ScriptError::Compile`] | `SCRIPT_COMPILE` | No |
//! | [`ScriptError::MissingEntryPoint`] | `SCRIPT_MISSING_ENTRY_POINT` | No |
//! | [`ScriptError::NotCompiled`] | `SCRIPT_NOT_COMPILED` | No |
//! | [`ScriptError::Runtime`] | `SCRIPT_RUNTIME` | No |
//! | [`ScriptError::Cancelled`] | `SCRIPT_CANCELLED` | Yes |
//!
//! None of these ever faults the process: the node captures them into the
//! execution log and reports a `Null` result.

use simnet_types::ErrorCode;
use thiserror::Error;

/// Script adapter error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The source failed to compile.
    #[error("compile error: {0}")]
    Compile(String),

    /// The source compiled but defines no `run` function.
    #[error("entry point not found: {0}")]
    MissingEntryPoint(String),

    /// `call` was invoked before a successful `compile`.
    #[error("no compiled program")]
    NotCompiled,

    /// The program faulted at runtime.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The run was cancelled cooperatively.
    #[error("execution cancelled")]
    Cancelled,
}

impl ErrorCode for ScriptError {
    fn code(&self) -> &'static str {
        match self {
            Self::Compile(_) => "SCRIPT_COMPILE",
            Self::MissingEntryPoint(_) => "SCRIPT_MISSING_ENTRY_POINT",
            Self::NotCompiled => "SCRIPT_NOT_COMPILED",
            Self::Runtime(_) => "SCRIPT_RUNTIME",
            Self::Cancelled => "SCRIPT_CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        // Cancellation is the one expected outcome: the same program can
        // simply be started again.
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simnet_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[
                ScriptError::Compile("x".into()),
                ScriptError::MissingEntryPoint("run".into()),
                ScriptError::NotCompiled,
                ScriptError::Runtime("x".into()),
                ScriptError::Cancelled,
            ],
            "SCRIPT_",
        );
    }

    #[test]
    fn only_cancellation_is_recoverable() {
        assert!(ScriptError::Cancelled.is_recoverable());
        assert!(!ScriptError::Compile("x".into()).is_recoverable());
        assert!(!ScriptError::Runtime("x".into()).is_recoverable());
    }
}
