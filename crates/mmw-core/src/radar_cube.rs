//! Raw ADC frames and the range-processed radar cube

use crate::types::{IQSample, ShapeError};

/// One frame of raw ADC samples.
///
/// Layout is `[chirp][antenna][sample]`, matching the order the capture path
/// writes into the accelerator's ADC bank.
#[derive(Debug, Clone, PartialEq)]
pub struct AdcFrame {
    num_chirps: usize,
    num_antennas: usize,
    samples_per_chirp: usize,
    samples: Vec<IQSample>,
}

impl AdcFrame {
    pub fn new(
        num_chirps: usize,
        num_antennas: usize,
        samples_per_chirp: usize,
        samples: Vec<IQSample>,
    ) -> Result<Self, ShapeError> {
        if num_chirps == 0 || num_antennas == 0 || samples_per_chirp == 0 {
            return Err(ShapeError::Empty);
        }
        let expected = num_chirps * num_antennas * samples_per_chirp;
        if samples.len() != expected {
            return Err(ShapeError::DataLength {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            num_chirps,
            num_antennas,
            samples_per_chirp,
            samples,
        })
    }

    /// Build a frame by evaluating `f(chirp, antenna, sample)`.
    pub fn from_fn(
        num_chirps: usize,
        num_antennas: usize,
        samples_per_chirp: usize,
        mut f: impl FnMut(usize, usize, usize) -> IQSample,
    ) -> Result<Self, ShapeError> {
        let mut samples = Vec::with_capacity(num_chirps * num_antennas * samples_per_chirp);
        for c in 0..num_chirps {
            for a in 0..num_antennas {
                for s in 0..samples_per_chirp {
                    samples.push(f(c, a, s));
                }
            }
        }
        Self::new(num_chirps, num_antennas, samples_per_chirp, samples)
    }

    pub fn num_chirps(&self) -> usize {
        self.num_chirps
    }

    pub fn num_antennas(&self) -> usize {
        self.num_antennas
    }

    pub fn samples_per_chirp(&self) -> usize {
        self.samples_per_chirp
    }

    pub fn samples(&self) -> &[IQSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Range-processed cube, layout `[range][chirp][antenna]`.
///
/// This is the transpose of the accelerator output, so the snapshots of one
/// range bin are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarCube {
    num_range_bins: usize,
    num_chirps: usize,
    num_antennas: usize,
    data: Vec<IQSample>,
}

impl RadarCube {
    pub fn new(
        num_range_bins: usize,
        num_chirps: usize,
        num_antennas: usize,
        data: Vec<IQSample>,
    ) -> Result<Self, ShapeError> {
        if num_range_bins == 0 || num_chirps == 0 || num_antennas == 0 {
            return Err(ShapeError::Empty);
        }
        let expected = num_range_bins * num_chirps * num_antennas;
        if data.len() != expected {
            return Err(ShapeError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            num_range_bins,
            num_chirps,
            num_antennas,
            data,
        })
    }

    pub fn range_bins(&self) -> usize {
        self.num_range_bins
    }

    pub fn chirps(&self) -> usize {
        self.num_chirps
    }

    pub fn antennas(&self) -> usize {
        self.num_antennas
    }

    /// Virtual-array snapshot for one range bin and chirp.
    pub fn snapshot(&self, range: usize, chirp: usize) -> &[IQSample] {
        let start = (range * self.num_chirps + chirp) * self.num_antennas;
        &self.data[start..start + self.num_antennas]
    }

    /// All chirp snapshots of one range bin.
    pub fn snapshots(&self, range: usize) -> Vec<Vec<IQSample>> {
        (0..self.num_chirps)
            .map(|c| self.snapshot(range, c).to_vec())
            .collect()
    }

    pub fn data(&self) -> &[IQSample] {
        &self.data
    }

    /// Hand the storage back for reuse as a transfer destination.
    pub fn into_data(self) -> Vec<IQSample> {
        self.data
    }

    /// Static clutter removal: subtract the mean across chirps from every
    /// (range, antenna) channel.
    pub fn remove_static_clutter(&mut self) {
        let (nc, na) = (self.num_chirps, self.num_antennas);
        let scale = 1.0 / nc as f64;
        for block in self.data.chunks_exact_mut(nc * na) {
            for a in 0..na {
                let mean = (0..nc).map(|c| block[c * na + a]).sum::<IQSample>() * scale;
                for c in 0..nc {
                    block[c * na + a] -= mean;
                }
            }
        }
    }
}
