//! Cycle clocks for processing-time accounting
//!
//! Frame statistics are reported in core cycles. [`SystemCycleClock`] scales
//! the monotonic clock to a nominal core frequency; [`MockCycleClock`] is
//! advanced by hand in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Nominal DSP core frequency used when none is configured.
pub const DEFAULT_CORE_HZ: u64 = 600_000_000;

/// Source of cycle counts.
pub trait CycleClock: Send + Sync {
    /// Cycles since an arbitrary epoch
    fn now_cycles(&self) -> u64;

    /// Nominal cycles per second
    fn frequency_hz(&self) -> u64;

    /// Convert a cycle count to microseconds.
    fn cycles_to_us(&self, cycles: u64) -> u64 {
        let hz = self.frequency_hz().max(1);
        ((cycles as u128 * 1_000_000) / hz as u128) as u64
    }
}

/// Monotonic clock scaled to a nominal frequency.
#[derive(Debug)]
pub struct SystemCycleClock {
    epoch: Instant,
    frequency_hz: u64,
}

impl SystemCycleClock {
    pub fn new(frequency_hz: u64) -> Self {
        Self {
            epoch: Instant::now(),
            frequency_hz: frequency_hz.max(1),
        }
    }
}

impl Default for SystemCycleClock {
    fn default() -> Self {
        Self::new(DEFAULT_CORE_HZ)
    }
}

impl CycleClock for SystemCycleClock {
    fn now_cycles(&self) -> u64 {
        let ns = self.epoch.elapsed().as_nanos();
        (ns * self.frequency_hz as u128 / 1_000_000_000) as u64
    }

    fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug)]
pub struct MockCycleClock {
    cycles: AtomicU64,
    frequency_hz: u64,
}

impl MockCycleClock {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            frequency_hz: DEFAULT_CORE_HZ,
        }
    }

    /// Advance by `cycles`.
    pub fn advance(&self, cycles: u64) {
        self.cycles.fetch_add(cycles, Ordering::SeqCst);
    }

    pub fn set(&self, cycles: u64) {
        self.cycles.store(cycles, Ordering::SeqCst);
    }
}

impl Default for MockCycleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleClock for MockCycleClock {
    fn now_cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}
