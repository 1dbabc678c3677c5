//! Range × azimuth Capon heatmap
//!
//! For every range bin of a [`RadarCube`], the chirps are used as snapshots
//! of the virtual array and the Capon spectrum is evaluated along azimuth at
//! boresight elevation. Powers are quantised to log2 magnitude in a fixed Q
//! format, giving the [`DetectionMatrix`] that CFAR consumes.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::antenna::{AntennaGeometry, ChannelCompensation};
use crate::aoa::angle_grid;
use crate::error::ConfigError;
use crate::mvdr_beamformer::{capon_spectrum, loaded_inverse};
use crate::radar_cube::RadarCube;
use crate::types::{DetectionMatrix, ShapeError};

/// Heatmap grid and quantisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Half-width of the azimuth axis, degrees
    pub azimuth_span_deg: f64,
    pub azimuth_step_deg: f64,
    /// Fractional bits of the log2 magnitude
    pub q_format: u8,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            azimuth_span_deg: 60.0,
            azimuth_step_deg: 2.0,
            q_format: 8,
        }
    }
}

impl HeatmapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.azimuth_step_deg > 0.0) || !(0.0..=90.0).contains(&self.azimuth_span_deg) {
            return Err(ConfigError::invalid(
                "heatmap azimuth step must be positive and span within 0..=90",
            ));
        }
        if self.q_format > 15 {
            return Err(ConfigError::invalid("heatmap q_format must be <= 15"));
        }
        Ok(())
    }

    pub fn num_angle_bins(&self) -> usize {
        angle_grid(self.azimuth_span_deg, self.azimuth_step_deg).len()
    }
}

/// Quantise a linear power to log2 magnitude: `round(0.5·log2(P)·2^Q)`.
///
/// Powers below 1 clamp to 0.
pub fn quantize_power(power: f64, q_format: u8) -> u16 {
    if !(power > 1.0) {
        return 0;
    }
    let raw = (0.5 * power.log2() * (1u32 << q_format) as f64).round();
    raw.min(u16::MAX as f64) as u16
}

/// Builds detection matrices from radar cubes.
#[derive(Debug, Clone)]
pub struct HeatmapBuilder {
    config: HeatmapConfig,
    alpha: f64,
    compensation: ChannelCompensation,
    azimuth: Vec<f64>,
    steering: Vec<Vec<Complex64>>,
}

impl HeatmapBuilder {
    pub fn new(
        config: HeatmapConfig,
        geometry: &AntennaGeometry,
        mvdr_alpha: f64,
        compensation: ChannelCompensation,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        geometry.validate()?;
        let azimuth = angle_grid(config.azimuth_span_deg, config.azimuth_step_deg);
        let steering = azimuth
            .iter()
            .map(|&az| geometry.steering_vector(az, 0.0))
            .collect();
        Ok(Self {
            config,
            alpha: mvdr_alpha,
            compensation,
            azimuth,
            steering,
        })
    }

    pub fn azimuth_axis(&self) -> &[f64] {
        &self.azimuth
    }

    /// Heatmap for every range bin of `cube`.
    ///
    /// Range bins with degenerate covariance are left at zero.
    pub fn build(&self, cube: &RadarCube) -> Result<DetectionMatrix, ShapeError> {
        let num_angle = self.azimuth.len();
        let mut data = vec![0u16; cube.range_bins() * num_angle];
        for (range, row) in data.chunks_exact_mut(num_angle).enumerate() {
            let mut snapshots = cube.snapshots(range);
            for s in &mut snapshots {
                self.compensation.apply(s);
            }
            let Some(inverse) = loaded_inverse(&snapshots, self.alpha) else {
                trace!(range, "degenerate range bin");
                continue;
            };
            for (cell, p) in row.iter_mut().zip(capon_spectrum(&inverse, &self.steering)) {
                *cell = quantize_power(p, self.config.q_format);
            }
        }
        DetectionMatrix::from_data(cube.range_bins(), num_angle, 1, self.config.q_format, data)?
            .with_azimuth_axis(self.azimuth.clone())?
            .with_elevation_axis(vec![0.0])
    }
}
