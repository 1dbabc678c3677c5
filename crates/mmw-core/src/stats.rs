//! # Frame Statistics and Pipeline Counters
//!
//! [`FrameStats`] travels with each frame's output. [`PipelineCounters`] are
//! cumulative, lock-free, and may be shared with observers on other threads.
//!
//! ## Example
//!
//! ```rust
//! use mmw_core::stats::PipelineCounters;
//!
//! let counters = PipelineCounters::new();
//! counters.record_frame(1_200, 14);
//! counters.record_frame(1_800, 9);
//! counters.record_overrun();
//!
//! let snap = counters.snapshot();
//! assert_eq!(snap.frames, 2);
//! assert_eq!(snap.avg_cycles, 1_500);
//! assert_eq!(snap.overruns, 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Why a frame produced no points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum FrameError {
    /// Accelerator reported an error completion
    AcceleratorFault = 1,
    /// No accelerator completion before the deadline
    AcceleratorTimeout = 2,
    /// Transfer reported an error completion
    TransferFault = 3,
    /// No transfer completion before the deadline
    TransferTimeout = 4,
    /// Next frame started before this one was consumed
    Overrun = 5,
    /// Transferred data did not match the configured geometry
    Corrupt = 6,
}

impl FrameError {
    /// Numeric code reported to consumers.
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrameError::AcceleratorFault => "accelerator fault",
            FrameError::AcceleratorTimeout => "accelerator timeout",
            FrameError::TransferFault => "transfer fault",
            FrameError::TransferTimeout => "transfer timeout",
            FrameError::Overrun => "deadline overrun",
            FrameError::Corrupt => "corrupt frame",
        };
        write!(f, "{} (code {})", s, self.code())
    }
}

/// Per-frame statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame_number: u64,
    /// Cycles from dispatch to consumption
    pub processing_cycles: u64,
    /// Cumulative overruns at the time this frame completed
    pub overrun_count: u64,
    /// Set when the frame is invalid
    pub error_code: Option<FrameError>,
    /// CFAR detections before angle estimation
    pub detections: usize,
    pub points_out_of_fov: usize,
    pub points_truncated: usize,
}

impl FrameStats {
    pub fn new(frame_number: u64) -> Self {
        Self {
            frame_number,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error_code.is_none()
    }
}

/// Lock-free cumulative counters.
#[derive(Debug)]
pub struct PipelineCounters {
    frames: AtomicU64,
    overruns: AtomicU64,
    hardware_faults: AtomicU64,
    refused_dispatches: AtomicU64,
    dropped_inputs: AtomicU64,
    points_emitted: AtomicU64,
    points_truncated: AtomicU64,
    total_cycles: AtomicU64,
    max_cycles: AtomicU64,
    min_cycles: AtomicU64,
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            hardware_faults: AtomicU64::new(0),
            refused_dispatches: AtomicU64::new(0),
            dropped_inputs: AtomicU64::new(0),
            points_emitted: AtomicU64::new(0),
            points_truncated: AtomicU64::new(0),
            total_cycles: AtomicU64::new(0),
            max_cycles: AtomicU64::new(0),
            min_cycles: AtomicU64::new(u64::MAX),
        }
    }

    /// Record a consumed frame.
    #[inline]
    pub fn record_frame(&self, cycles: u64, points: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.points_emitted.fetch_add(points as u64, Ordering::Relaxed);
        self.total_cycles.fetch_add(cycles, Ordering::Relaxed);
        self.max_cycles.fetch_max(cycles, Ordering::Relaxed);
        self.min_cycles.fetch_min(cycles, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hardware_fault(&self) {
        self.hardware_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_refused(&self) {
        self.refused_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    /// A captured frame arrived with both buffers in flight.
    #[inline]
    pub fn record_dropped_input(&self) {
        self.dropped_inputs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_truncated(&self, points: usize) {
        self.points_truncated.fetch_add(points as u64, Ordering::Relaxed);
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn hardware_faults(&self) -> u64 {
        self.hardware_faults.load(Ordering::Relaxed)
    }

    pub fn dropped_inputs(&self) -> u64 {
        self.dropped_inputs.load(Ordering::Relaxed)
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.frames,
            &self.overruns,
            &self.hardware_faults,
            &self.refused_dispatches,
            &self.dropped_inputs,
            &self.points_emitted,
            &self.points_truncated,
            &self.total_cycles,
            &self.max_cycles,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.min_cycles.store(u64::MAX, Ordering::Relaxed);
    }

    /// Get a consistent-enough snapshot for reporting.
    pub fn snapshot(&self) -> CountersSnapshot {
        let frames = self.frames.load(Ordering::Relaxed);
        let total = self.total_cycles.load(Ordering::Relaxed);
        let min = self.min_cycles.load(Ordering::Relaxed);
        CountersSnapshot {
            frames,
            overruns: self.overruns.load(Ordering::Relaxed),
            hardware_faults: self.hardware_faults.load(Ordering::Relaxed),
            refused_dispatches: self.refused_dispatches.load(Ordering::Relaxed),
            dropped_inputs: self.dropped_inputs.load(Ordering::Relaxed),
            points_emitted: self.points_emitted.load(Ordering::Relaxed),
            points_truncated: self.points_truncated.load(Ordering::Relaxed),
            min_cycles: if min == u64::MAX { 0 } else { min },
            max_cycles: self.max_cycles.load(Ordering::Relaxed),
            avg_cycles: if frames > 0 { total / frames } else { 0 },
        }
    }
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub frames: u64,
    pub overruns: u64,
    pub hardware_faults: u64,
    pub refused_dispatches: u64,
    pub dropped_inputs: u64,
    pub points_emitted: u64,
    pub points_truncated: u64,
    pub min_cycles: u64,
    pub max_cycles: u64,
    pub avg_cycles: u64,
}

impl fmt::Display for CountersSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames={} overruns={} faults={} refused={} dropped={} points={} truncated={} cycles(min/avg/max)={}/{}/{}",
            self.frames,
            self.overruns,
            self.hardware_faults,
            self.refused_dispatches,
            self.dropped_inputs,
            self.points_emitted,
            self.points_truncated,
            self.min_cycles,
            self.avg_cycles,
            self.max_cycles
        )
    }
}
