//! MMW Accelerator Abstraction Layer
//!
//! This crate describes the two hardware engines the radar pipeline drives:
//!
//! - **Accelerator**: FFT engine reading ADC banks and writing output banks
//! - **Transfer**: DMA engine moving output banks into host memory
//!
//! Both are exclusive-dispatch: one operation outstanding at a time, with its
//! completion delivered on a channel so the caller can block with a timeout.
//!
//! # Feature Flags
//!
//! - `sim` (default): Software simulation backend with fault injection
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use mmw_accel::{Transfer, BankId, LocalMemory, MemRegion, SimulatedTransfer, TransferDescriptor, TransferLayout, IQSample};
//!
//! let memory = LocalMemory::shared();
//! let mut dma = SimulatedTransfer::new(memory);
//! let transfer = TransferDescriptor::new(
//!     MemRegion::whole(BankId::OutPing, 8),
//!     TransferLayout::Transpose { rows: 2, cols: 4 },
//!     vec![IQSample::new(0.0, 0.0); 8],
//! );
//! let token = dma.submit(transfer).unwrap();
//! let host = dma.wait(token, Duration::from_millis(10)).unwrap();
//! assert_eq!(host.len(), 8);
//! ```

pub mod error;
pub mod memory;
pub mod signal;
pub mod traits;
pub mod types;

#[cfg(feature = "sim")]
pub mod sim;

// Re-export main types
pub use error::{AccelError, AccelResult};
pub use memory::{LocalMemory, SharedMemory, BANK_ALIGNMENT, BANK_CAPACITY, NUM_BANKS};
pub use signal::{completion_channel, CompletionQueue, CompletionSignal};
pub use traits::{Accelerator, Transfer};
pub use types::{
    AccelCapabilities, AccelInfo, BankId, Completion, CompletionStatus, CompletionToken, IQSample,
    MemRegion, StageDescriptor, StageKind, TransferDescriptor, TransferLayout, WindowKind,
};

#[cfg(feature = "sim")]
pub use sim::{SimulatedAccelerator, SimulatedTransfer};

/// Create the default engine pair over a fresh local memory.
///
/// Only the simulation backend exists today, so this always succeeds.
#[cfg(feature = "sim")]
pub fn create_default() -> (SharedMemory, Box<dyn Accelerator>, Box<dyn Transfer>) {
    let memory = LocalMemory::shared();
    let accel = SimulatedAccelerator::new(memory.clone());
    let dma = SimulatedTransfer::new(memory.clone());
    (memory, Box::new(accel), Box::new(dma))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "sim")]
    #[test]
    fn test_create_default() {
        let (_memory, accel, dma) = create_default();
        assert!(!accel.info().hardware);
        assert!(!accel.is_busy());
        assert!(!dma.is_busy());
        assert!(accel.capabilities().max_fft_size >= 256);
    }
}
