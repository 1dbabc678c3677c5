//! Error types for the detection pipeline

use mmw_accel::AccelError;
use thiserror::Error;

use crate::pipeline::buffer::{BufferId, BufferState};

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type for configuration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("config not found: {0}")]
    NotFound(String),
    /// Failed to read configuration file
    #[error("failed to read config: {0}")]
    ReadError(String),
    /// Failed to parse configuration
    #[error("failed to parse config: {0}")]
    ParseError(String),
    /// Invalid configuration value
    #[error("invalid config: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::ValidationError(msg.into())
    }
}

/// Scheduler ownership and exclusivity violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A second operation was dispatched to an exclusive engine
    #[error("{engine} already dispatched for {outstanding:?}")]
    DoubleDispatch {
        engine: &'static str,
        outstanding: BufferId,
    },

    /// Buffer is not in a state that allows the requested step
    #[error("{buffer:?}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        buffer: BufferId,
        from: BufferState,
        to: BufferState,
    },

    /// Input arrived but both buffers are busy
    #[error("no idle buffer for input capture")]
    NoIdleBuffer,

    /// Input frame does not match the configured geometry
    #[error("input frame has {actual} samples, expected {expected}")]
    InputShape { expected: usize, actual: usize },
}

/// Top-level pipeline error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid configuration, rejected before anything changed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Ownership or exclusivity violation, refused with state unchanged
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Reconfiguration requested while a buffer is mid-flight
    #[error("reconfiguration in progress: {busy} buffer(s) in flight")]
    InProgress { busy: usize },

    /// Pipeline is stopped
    #[error("pipeline stopped")]
    Stopped,

    /// Error completion or completion timeout from an engine
    #[error("hardware fault on {buffer:?}: {source}")]
    HardwareFault {
        buffer: BufferId,
        #[source]
        source: AccelError,
    },

    /// Engine rejected a request for a non-hardware reason
    #[error("accelerator error: {0}")]
    Accelerator(AccelError),

    /// Runner channel closed
    #[error("pipeline runner disconnected")]
    Disconnected,
}

impl PipelineError {
    /// Check whether this error is a refusal that left the pipeline untouched
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_) | PipelineError::Resource(_) | PipelineError::InProgress { .. }
        )
    }
}
