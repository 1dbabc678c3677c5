//! Accelerator and transfer capability traits

use std::time::Duration;

use crate::error::AccelResult;
use crate::types::{
    AccelCapabilities, AccelInfo, CompletionToken, IQSample, StageDescriptor, TransferDescriptor,
};

/// Hardware accelerator capability (FFT engine).
///
/// Exclusive-dispatch: at most one stage may be outstanding. Submitting while
/// busy returns [`AccelError::Busy`](crate::AccelError::Busy) and leaves the
/// outstanding stage untouched.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use mmw_accel::{Accelerator, BankId, LocalMemory, SimulatedAccelerator, StageDescriptor, WindowKind};
///
/// let memory = LocalMemory::shared();
/// let mut accel = SimulatedAccelerator::new(memory);
/// let stage = StageDescriptor::range_fft(BankId::AdcPing, BankId::OutPing, 32, 32, 4, WindowKind::Hann);
/// let token = accel.submit(stage).unwrap();
/// accel.wait(token, Duration::from_millis(10)).unwrap();
/// ```
pub trait Accelerator: Send {
    // =========================================================================
    // Device Information
    // =========================================================================

    /// Get information about the backend
    fn info(&self) -> AccelInfo;

    /// Get backend capabilities
    fn capabilities(&self) -> AccelCapabilities;

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Start a stage; returns the token its completion will carry
    fn submit(&mut self, stage: StageDescriptor) -> AccelResult<CompletionToken>;

    /// Block until the stage identified by `token` completes
    fn wait(&mut self, token: CompletionToken, timeout: Duration) -> AccelResult<()>;

    /// True while a stage is outstanding
    fn is_busy(&self) -> bool;

    /// Soft reset: forget any outstanding stage and queued completions
    fn reset(&mut self) -> AccelResult<()>;
}

/// Data-movement capability (DMA engine).
///
/// Same exclusive-dispatch contract as [`Accelerator`]. The destination buffer
/// travels inside the descriptor and is returned by `wait`.
pub trait Transfer: Send {
    /// Start a transfer
    fn submit(&mut self, transfer: TransferDescriptor) -> AccelResult<CompletionToken>;

    /// Block until the transfer completes; returns the filled destination
    fn wait(&mut self, token: CompletionToken, timeout: Duration) -> AccelResult<Vec<IQSample>>;

    /// True while a transfer is outstanding
    fn is_busy(&self) -> bool;

    /// Soft reset: forget any outstanding transfer and queued completions
    fn reset(&mut self) -> AccelResult<()>;
}

impl<A: Accelerator + ?Sized> Accelerator for Box<A> {
    fn info(&self) -> AccelInfo {
        (**self).info()
    }

    fn capabilities(&self) -> AccelCapabilities {
        (**self).capabilities()
    }

    fn submit(&mut self, stage: StageDescriptor) -> AccelResult<CompletionToken> {
        (**self).submit(stage)
    }

    fn wait(&mut self, token: CompletionToken, timeout: Duration) -> AccelResult<()> {
        (**self).wait(token, timeout)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn reset(&mut self) -> AccelResult<()> {
        (**self).reset()
    }
}

impl<T: Transfer + ?Sized> Transfer for Box<T> {
    fn submit(&mut self, transfer: TransferDescriptor) -> AccelResult<CompletionToken> {
        (**self).submit(transfer)
    }

    fn wait(&mut self, token: CompletionToken, timeout: Duration) -> AccelResult<Vec<IQSample>> {
        (**self).wait(token, timeout)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn reset(&mut self) -> AccelResult<()> {
        (**self).reset()
    }
}
