//! Virtual antenna array geometry and channel compensation

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Virtual-array element positions in wavelengths.
///
/// Each entry is `[x, z]`: horizontal offset and vertical offset. Elements
/// are listed in the order the accelerator emits virtual channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaGeometry {
    pub positions: Vec<[f64; 2]>,
}

impl Default for AntennaGeometry {
    /// 3 TX × 4 RX layout: eight azimuth elements plus four raised by λ/2.
    fn default() -> Self {
        let mut positions: Vec<[f64; 2]> = (0..8).map(|k| [0.5 * k as f64, 0.0]).collect();
        positions.extend((0..4).map(|k| [1.0 + 0.5 * k as f64, 0.5]));
        Self { positions }
    }
}

impl AntennaGeometry {
    /// Uniform linear array along x.
    pub fn ula(num_elements: usize, spacing_wavelengths: f64) -> Self {
        Self {
            positions: (0..num_elements)
                .map(|k| [spacing_wavelengths * k as f64, 0.0])
                .collect(),
        }
    }

    pub fn num_antennas(&self) -> usize {
        self.positions.len()
    }

    /// True if any element is vertically offset.
    pub fn has_elevation(&self) -> bool {
        let z0 = self.positions.first().map_or(0.0, |p| p[1]);
        self.positions.iter().any(|p| (p[1] - z0).abs() > 1e-9)
    }

    /// Steering vector for a direction:
    /// `exp(j 2π (x sin(az) cos(el) + z sin(el)))`.
    pub fn steering_vector(&self, azimuth_deg: f64, elevation_deg: f64) -> Vec<Complex64> {
        let (sin_az, sin_el, cos_el) = (
            azimuth_deg.to_radians().sin(),
            elevation_deg.to_radians().sin(),
            elevation_deg.to_radians().cos(),
        );
        self.positions
            .iter()
            .map(|&[x, z]| Complex64::from_polar(1.0, 2.0 * PI * (x * sin_az * cos_el + z * sin_el)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.positions.len() < 2 {
            return Err(ConfigError::invalid("antenna geometry needs at least 2 elements"));
        }
        if self.positions.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("antenna positions must be finite"));
        }
        Ok(())
    }
}

/// Per-channel phase and gain calibration.
///
/// Empty lists mean "no correction".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Phase correction per virtual channel, degrees
    pub phase_deg: Vec<f64>,
    /// Linear gain correction per virtual channel
    pub gain: Vec<f64>,
}

/// Complex correction applied to each snapshot before covariance estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCompensation {
    coefficients: Option<Vec<Complex64>>,
}

impl ChannelCompensation {
    pub fn identity() -> Self {
        Self { coefficients: None }
    }

    pub fn from_config(config: &CalibrationConfig, num_antennas: usize) -> Result<Self, ConfigError> {
        if config.phase_deg.is_empty() && config.gain.is_empty() {
            return Ok(Self::identity());
        }
        for (name, len) in [("phase_deg", config.phase_deg.len()), ("gain", config.gain.len())] {
            if len != 0 && len != num_antennas {
                return Err(ConfigError::invalid(format!(
                    "calibration {} has {} entries for {} antennas",
                    name, len, num_antennas
                )));
            }
        }
        let coefficients = (0..num_antennas)
            .map(|i| {
                let gain = config.gain.get(i).copied().unwrap_or(1.0);
                let phase = config.phase_deg.get(i).copied().unwrap_or(0.0);
                Complex64::from_polar(gain, phase.to_radians())
            })
            .collect();
        Ok(Self {
            coefficients: Some(coefficients),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.coefficients.is_none()
    }

    /// Correct one snapshot in place.
    pub fn apply(&self, snapshot: &mut [Complex64]) {
        if let Some(coefficients) = &self.coefficients {
            for (x, c) in snapshot.iter_mut().zip(coefficients) {
                *x *= c;
            }
        }
    }
}
