//! Accelerator-local memory banks
//!
//! The banks are shared between the capture path (writes ADC samples), the
//! accelerator (reads ADC banks, writes output banks) and the transfer engine
//! (reads output banks). Ownership of each bank follows the pipeline state
//! machine; the mutex only models the shared bus.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{AccelError, AccelResult};
use crate::types::{BankId, IQSample, MemRegion};

/// Number of local memory banks.
pub const NUM_BANKS: usize = 4;

/// Capacity of one bank, in complex samples.
pub const BANK_CAPACITY: usize = 1 << 15;

/// Bank offsets must be multiples of this many samples.
pub const BANK_ALIGNMENT: usize = 16;

const _: () = assert!(BANK_CAPACITY.is_power_of_two());
const _: () = assert!(BANK_CAPACITY % BANK_ALIGNMENT == 0);
const _: () = assert!(NUM_BANKS == BankId::ALL.len());

/// Round `value` up to the bank alignment.
#[inline]
pub const fn align_up(value: usize) -> usize {
    (value + BANK_ALIGNMENT - 1) & !(BANK_ALIGNMENT - 1)
}

/// Fixed set of sample banks.
#[derive(Debug)]
pub struct LocalMemory {
    banks: Vec<Vec<IQSample>>,
}

impl LocalMemory {
    /// Allocate all banks up front, zeroed.
    pub fn new() -> Self {
        Self {
            banks: (0..NUM_BANKS)
                .map(|_| vec![IQSample::new(0.0, 0.0); BANK_CAPACITY])
                .collect(),
        }
    }

    /// Wrap in a shareable handle.
    pub fn shared() -> SharedMemory {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Check that a region lies inside its bank and starts aligned.
    pub fn check(region: &MemRegion) -> AccelResult<()> {
        if region.end() > BANK_CAPACITY || region.offset % BANK_ALIGNMENT != 0 {
            return Err(AccelError::RegionOutOfBounds {
                bank: region.bank,
                offset: region.offset,
                len: region.len,
                capacity: BANK_CAPACITY,
            });
        }
        Ok(())
    }

    /// Borrow a region.
    pub fn region(&self, region: &MemRegion) -> AccelResult<&[IQSample]> {
        Self::check(region)?;
        Ok(&self.banks[region.bank.index()][region.offset..region.end()])
    }

    /// Mutably borrow a region.
    pub fn region_mut(&mut self, region: &MemRegion) -> AccelResult<&mut [IQSample]> {
        Self::check(region)?;
        Ok(&mut self.banks[region.bank.index()][region.offset..region.end()])
    }

    /// Copy `data` into a region of the same length.
    pub fn write(&mut self, region: &MemRegion, data: &[IQSample]) -> AccelResult<()> {
        if data.len() != region.len {
            return Err(AccelError::BufferSizeMismatch {
                expected: region.len,
                actual: data.len(),
            });
        }
        self.region_mut(region)?.copy_from_slice(data);
        Ok(())
    }

    /// Zero a whole bank.
    pub fn clear(&mut self, bank: BankId) {
        self.banks[bank.index()].fill(IQSample::new(0.0, 0.0));
    }
}

impl Default for LocalMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the local memory.
pub type SharedMemory = Arc<Mutex<LocalMemory>>;

/// Lock the shared memory, mapping poisoning to an accelerator error.
pub fn lock(memory: &SharedMemory) -> AccelResult<MutexGuard<'_, LocalMemory>> {
    memory.lock().map_err(|_| AccelError::MemoryPoisoned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), BANK_ALIGNMENT);
        assert_eq!(align_up(BANK_ALIGNMENT), BANK_ALIGNMENT);
        assert_eq!(align_up(BANK_ALIGNMENT + 1), 2 * BANK_ALIGNMENT);
    }

    #[test]
    fn test_write_and_read_back() {
        let mut mem = LocalMemory::new();
        let region = MemRegion::new(BankId::AdcPong, 32, 3);
        let data = [
            IQSample::new(1.0, 0.0),
            IQSample::new(0.0, 2.0),
            IQSample::new(-3.0, 1.0),
        ];
        mem.write(&region, &data).unwrap();
        assert_eq!(mem.region(&region).unwrap(), &data);
        mem.clear(BankId::AdcPong);
        assert!(mem.region(&region).unwrap().iter().all(|s| s.norm() == 0.0));
    }

    #[test]
    fn test_region_bounds_and_alignment() {
        let mem = LocalMemory::new();
        let past_end = MemRegion::new(BankId::OutPing, BANK_CAPACITY - 16, 32);
        assert!(matches!(
            mem.region(&past_end),
            Err(AccelError::RegionOutOfBounds { .. })
        ));
        let unaligned = MemRegion::new(BankId::OutPing, 3, 4);
        assert!(mem.region(&unaligned).is_err());
    }

    #[test]
    fn test_write_length_mismatch() {
        let mut mem = LocalMemory::new();
        let region = MemRegion::whole(BankId::AdcPing, 4);
        let err = mem.write(&region, &[IQSample::new(0.0, 0.0); 2]).unwrap_err();
        assert_eq!(
            err,
            AccelError::BufferSizeMismatch {
                expected: 4,
                actual: 2
            }
        );
    }
}
