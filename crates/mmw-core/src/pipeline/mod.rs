//! # Double-Buffered Detection Pipeline
//!
//! Two buffers alternate between capture and processing so that the range
//! FFT of frame *n + 1* overlaps the detection chain of frame *n*:
//!
//! ```text
//!             frame n            frame n+1          frame n+2
//! capture  |== ping ==|       |== pong ==|       |== ping ==|
//! accel          |-- ping --|       |-- pong --|
//! transfer            |- ping -|         |- pong -|
//! chain                    |=== ping ===|     |=== pong ===|
//! ```
//!
//! - [`buffer`]: buffer identities and the per-buffer state machine
//! - [`chain`]: heatmap, CFAR, AoA, Doppler and point-cloud stages on one cube
//! - [`scheduler`]: engine exclusivity, overrun and fault handling
//! - [`runner`]: the scheduler on its own thread, driven by events

pub mod buffer;
pub mod chain;
pub mod runner;
pub mod scheduler;

pub use buffer::{BufferArena, BufferId, BufferState, PipelineBuffer};
pub use chain::DetectionChain;
pub use runner::{PipelineEvent, PipelineRunner, RunnerOutput, EVENT_QUEUE_DEPTH};
pub use scheduler::{FrameOutput, PipelineScheduler, ResourcePolicy};
