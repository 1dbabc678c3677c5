//! Doppler estimation for angle-resolved targets
//!
//! The chirp snapshots of a range bin are combined with MVDR weights steered
//! at the target direction, giving one slow-time sample per chirp. A Doppler
//! FFT over those samples yields the target's signed Doppler bin.

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::ConfigError;
use crate::mvdr_beamformer::{apply_weights, mvdr_weights, CMatrix};

/// Map an FFT bin to a signed Doppler index: bins at or above `n/2` wrap negative.
pub fn signed_doppler_index(bin: usize, n: usize) -> i32 {
    let k = bin as i64;
    if k >= (n as i64) / 2 {
        (k - n as i64) as i32
    } else {
        k as i32
    }
}

/// Slow-time Doppler estimator.
#[derive(Clone)]
pub struct DopplerEstimator {
    num_chirps: usize,
    fft: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for DopplerEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DopplerEstimator")
            .field("num_chirps", &self.num_chirps)
            .finish()
    }
}

impl DopplerEstimator {
    /// `num_chirps` must be a power of two; it is also the FFT length.
    pub fn new(num_chirps: usize) -> Result<Self, ConfigError> {
        if num_chirps < 2 || !num_chirps.is_power_of_two() {
            return Err(ConfigError::invalid(format!(
                "num_chirps must be a power of two >= 2, got {}",
                num_chirps
            )));
        }
        let mut planner = FftPlanner::<f64>::new();
        Ok(Self {
            num_chirps,
            fft: planner.plan_fft_forward(num_chirps),
        })
    }

    pub fn num_chirps(&self) -> usize {
        self.num_chirps
    }

    /// Doppler spectrum magnitude of an already beamformed slow-time series.
    pub fn spectrum(&self, slow_time: &[Complex64]) -> Vec<f64> {
        let mut buffer: Vec<Complex64> = slow_time
            .iter()
            .copied()
            .chain(std::iter::repeat(Complex64::new(0.0, 0.0)))
            .take(self.num_chirps)
            .collect();
        self.fft.process(&mut buffer);
        buffer.iter().map(|x| x.norm_sqr()).collect()
    }

    /// Signed Doppler index of the strongest bin of a slow-time series.
    pub fn dominant_index(&self, slow_time: &[Complex64]) -> i32 {
        let spectrum = self.spectrum(slow_time);
        let bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(i, _)| i);
        signed_doppler_index(bin, self.num_chirps)
    }

    /// Beamform the chirp snapshots towards `steering` and pick the dominant Doppler bin.
    ///
    /// `None` when the MVDR weights are undefined.
    pub fn estimate(
        &self,
        snapshots: &[Vec<Complex64>],
        inverse: &CMatrix,
        steering: &[Complex64],
    ) -> Option<i32> {
        let weights = mvdr_weights(inverse, steering)?;
        let slow_time: Vec<Complex64> = snapshots
            .iter()
            .map(|x| apply_weights(&weights, x))
            .collect();
        Some(self.dominant_index(&slow_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::AntennaGeometry;
    use crate::mvdr_beamformer::loaded_inverse;
    use std::f64::consts::PI;

    #[test]
    fn test_signed_index() {
        assert_eq!(signed_doppler_index(0, 16), 0);
        assert_eq!(signed_doppler_index(7, 16), 7);
        assert_eq!(signed_doppler_index(8, 16), -8);
        assert_eq!(signed_doppler_index(15, 16), -1);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(DopplerEstimator::new(12).is_err());
        assert!(DopplerEstimator::new(1).is_err());
        assert!(DopplerEstimator::new(32).is_ok());
    }

    #[test]
    fn test_dominant_index() {
        let est = DopplerEstimator::new(16).unwrap();
        for bin in [-5i32, 0, 3, 7] {
            let series: Vec<Complex64> = (0..16)
                .map(|c| Complex64::from_polar(1.0, 2.0 * PI * bin as f64 * c as f64 / 16.0))
                .collect();
            assert_eq!(est.dominant_index(&series), bin);
        }
    }

    #[test]
    fn test_beamformed_doppler_separates_targets() {
        // Two targets in the same range bin: -20° moving at +3 bins, +25° at -4 bins
        let geometry = AntennaGeometry::ula(8, 0.5);
        let a1 = geometry.steering_vector(-20.0, 0.0);
        let a2 = geometry.steering_vector(25.0, 0.0);
        let n = 32;
        let snapshots: Vec<Vec<Complex64>> = (0..n)
            .map(|c| {
                let s1 = Complex64::from_polar(10.0, 2.0 * PI * 3.0 * c as f64 / n as f64);
                let s2 = Complex64::from_polar(10.0, 2.0 * PI * -4.0 * c as f64 / n as f64);
                (0..8)
                    .map(|k| a1[k] * s1 + a2[k] * s2 + Complex64::new(0.01 * k as f64, 0.0))
                    .collect()
            })
            .collect();
        let inverse = loaded_inverse(&snapshots, 0.05).unwrap();
        let est = DopplerEstimator::new(n).unwrap();
        assert_eq!(est.estimate(&snapshots, &inverse, &a1), Some(3));
        assert_eq!(est.estimate(&snapshots, &inverse, &a2), Some(-4));
    }
}
