//! Bus errors.
//!
//! Bus operations report failure as a returned boolean plus a logged
//! diagnostic; these types are what the diagnostics are built from.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`BusError::ContractMismatch`] | `BUS_CONTRACT_MISMATCH` | No |
//! | [`BusError::UnknownBinding`] | `BUS_UNKNOWN_BINDING` | No |
//! | [`BusError::Closed`] | `BUS_CLOSED` | No |

use simnet_types::ErrorCode;
use thiserror::Error;

use crate::{BindingId, PayloadKind, Topic};

/// Event bus error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// A bind or publish conflicted with the topic's established payload
    /// shape. Fixed by the caller; retry will not help.
    #[error("topic {topic}: payload shape {got} conflicts with contract {expected}")]
    ContractMismatch {
        /// The topic whose contract was violated.
        topic: Topic,
        /// The shape fixed by the topic's first bind or publish.
        expected: PayloadKind,
        /// The conflicting shape.
        got: PayloadKind,
    },

    /// Unbind named a binding that is not registered on the topic.
    #[error("topic {topic}: no binding {binding:?}")]
    UnknownBinding {
        /// The topic the unbind targeted.
        topic: Topic,
        /// The unknown binding id.
        binding: BindingId,
    },

    /// The bus task is gone; no operation can succeed anymore.
    #[error("event bus is closed")]
    Closed,
}

impl ErrorCode for BusError {
    fn code(&self) -> &'static str {
        match self {
            Self::ContractMismatch { .. } => "BUS_CONTRACT_MISMATCH",
            Self::UnknownBinding { .. } => "BUS_UNKNOWN_BINDING",
            Self::Closed => "BUS_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
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
                BusError::ContractMismatch {
                    topic: Topic::CodeChange,
                    expected: PayloadKind::Code,
                    got: PayloadKind::Empty,
                },
                BusError::UnknownBinding {
                    topic: Topic::CodeChange,
                    binding: BindingId::from_raw(1),
                },
                BusError::Closed,
            ],
            "BUS_",
        );
    }

    #[test]
    fn mismatch_message_names_shapes() {
        let err = BusError::ContractMismatch {
            topic: Topic::StartNodes,
            expected: PayloadKind::Empty,
            got: PayloadKind::Code,
        };
        let msg = err.to_string();
        assert!(msg.contains("start-nodes"));
        assert!(msg.contains("Empty"));
        assert!(msg.contains("Code"));
    }
}
