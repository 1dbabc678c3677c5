//! # Observability
//!
//! Structured logging for the pipeline. Cumulative counters live in
//! [`crate::stats`] and are shared with observers through an `Arc`.
//!
//! ```rust,no_run
//! use mmw_core::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::collector());
//! tracing::info!("pipeline up");
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
