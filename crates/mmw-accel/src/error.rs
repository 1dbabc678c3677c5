//! Accelerator and transfer error types

use thiserror::Error;

use crate::types::{BankId, CompletionToken};

/// Result type for accelerator and transfer operations
pub type AccelResult<T> = Result<T, AccelError>;

/// Errors that can occur while dispatching or awaiting hardware operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccelError {
    /// A second operation was submitted while one is still outstanding
    #[error("{engine} busy: operation {outstanding} still outstanding")]
    Busy {
        engine: &'static str,
        outstanding: CompletionToken,
    },

    /// `wait` was called with no operation outstanding
    #[error("{0}: no operation outstanding")]
    NothingOutstanding(&'static str),

    /// The completion that arrived does not belong to the awaited operation
    #[error("completion token mismatch: expected {expected}, got {actual}")]
    TokenMismatch {
        expected: CompletionToken,
        actual: CompletionToken,
    },

    /// Memory region falls outside its bank
    #[error("region {offset}+{len} exceeds {bank:?} capacity {capacity}")]
    RegionOutOfBounds {
        bank: BankId,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Buffer size does not match the descriptor
    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Stage parameters are not supported by this engine
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The engine reported an error completion
    #[error("hardware fault in {engine}: {reason}")]
    Fault {
        engine: &'static str,
        reason: String,
    },

    /// No completion arrived before the deadline
    #[error("{engine} completion timeout after {timeout_ms}ms")]
    Timeout {
        engine: &'static str,
        timeout_ms: u64,
    },

    /// The completion channel was closed
    #[error("completion channel disconnected")]
    Disconnected,

    /// Local memory lock was poisoned by a panicking holder
    #[error("accelerator local memory unavailable")]
    MemoryPoisoned,
}

impl AccelError {
    /// Check if the frame can be retried after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AccelError::Timeout { .. } | AccelError::Fault { .. } | AccelError::Busy { .. }
        )
    }

    /// Check if this error came from the hardware rather than from the caller
    pub fn is_hardware_fault(&self) -> bool {
        matches!(
            self,
            AccelError::Fault { .. }
                | AccelError::Timeout { .. }
                | AccelError::Disconnected
                | AccelError::MemoryPoisoned
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let fault = AccelError::Fault {
            engine: "accelerator",
            reason: "parity".to_string(),
        };
        assert!(fault.is_hardware_fault());
        assert!(fault.is_recoverable());

        let busy = AccelError::Busy {
            engine: "transfer",
            outstanding: CompletionToken(3),
        };
        assert!(!busy.is_hardware_fault());
        assert!(busy.is_recoverable());

        assert!(!AccelError::NothingOutstanding("accelerator").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = AccelError::Timeout {
            engine: "transfer",
            timeout_ms: 20,
        };
        assert_eq!(err.to_string(), "transfer completion timeout after 20ms");
    }
}
