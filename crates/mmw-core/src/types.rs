//! Core types for the detection pipeline
//!
//! Plain numeric containers passed between stages. Each is frame-scoped and
//! moved from stage to stage; nothing here is shared-mutable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mmw_accel::IQSample;

/// Nominal dB per unit of log2 magnitude (20·log10(2), as the hardware rounds it).
pub const DB_PER_LOG2: f64 = 6.0;

/// Convert a raw log2-magnitude difference in Q`q_format` to dB.
#[inline]
pub fn raw_to_db(raw: u32, q_format: u8) -> f64 {
    raw as f64 * DB_PER_LOG2 / (1u32 << q_format) as f64
}

/// Convert a dB threshold to raw log2-magnitude units in Q`q_format`.
#[inline]
pub fn threshold_from_db(db: f64, q_format: u8) -> u16 {
    let raw = (db.max(0.0) * (1u32 << q_format) as f64 / DB_PER_LOG2).round();
    raw.min(u16::MAX as f64) as u16
}

/// Errors building frame containers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("data has {actual} samples, shape requires {expected}")]
    DataLength { expected: usize, actual: usize },

    #[error("{axis} axis has {actual} entries, expected {expected}")]
    Axis {
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Q format {0} out of range (max 15)")]
    QFormat(u8),

    #[error("empty dimension")]
    Empty,
}

/// Range × angle (× elevation plane) matrix of log2 magnitudes.
///
/// Layout is `[elevation][range][angle]`, row-major. Each angle column and
/// elevation plane carries the direction it was formed for, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionMatrix {
    num_range_bins: usize,
    num_angle_bins: usize,
    num_elevation: usize,
    q_format: u8,
    data: Vec<u16>,
    azimuth_deg: Vec<f64>,
    elevation_deg: Vec<f64>,
}

impl DetectionMatrix {
    /// Zero-filled matrix with default axes.
    ///
    /// The default azimuth axis is a 1° grid centred on boresight; the default
    /// elevation axis is likewise 1° per plane centred on 0.
    pub fn new(
        num_range_bins: usize,
        num_angle_bins: usize,
        num_elevation: usize,
        q_format: u8,
    ) -> Result<Self, ShapeError> {
        let len = num_range_bins * num_angle_bins * num_elevation;
        Self::from_data(
            num_range_bins,
            num_angle_bins,
            num_elevation,
            q_format,
            vec![0; len],
        )
    }

    /// Wrap existing data.
    pub fn from_data(
        num_range_bins: usize,
        num_angle_bins: usize,
        num_elevation: usize,
        q_format: u8,
        data: Vec<u16>,
    ) -> Result<Self, ShapeError> {
        if num_range_bins == 0 || num_angle_bins == 0 || num_elevation == 0 {
            return Err(ShapeError::Empty);
        }
        if q_format > 15 {
            return Err(ShapeError::QFormat(q_format));
        }
        let expected = num_range_bins * num_angle_bins * num_elevation;
        if data.len() != expected {
            return Err(ShapeError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            num_range_bins,
            num_angle_bins,
            num_elevation,
            q_format,
            data,
            azimuth_deg: centred_axis(num_angle_bins),
            elevation_deg: centred_axis(num_elevation),
        })
    }

    /// Replace the azimuth axis.
    pub fn with_azimuth_axis(mut self, azimuth_deg: Vec<f64>) -> Result<Self, ShapeError> {
        if azimuth_deg.len() != self.num_angle_bins {
            return Err(ShapeError::Axis {
                axis: "azimuth",
                expected: self.num_angle_bins,
                actual: azimuth_deg.len(),
            });
        }
        self.azimuth_deg = azimuth_deg;
        Ok(self)
    }

    /// Replace the elevation axis.
    pub fn with_elevation_axis(mut self, elevation_deg: Vec<f64>) -> Result<Self, ShapeError> {
        if elevation_deg.len() != self.num_elevation {
            return Err(ShapeError::Axis {
                axis: "elevation",
                expected: self.num_elevation,
                actual: elevation_deg.len(),
            });
        }
        self.elevation_deg = elevation_deg;
        Ok(self)
    }

    pub fn range_bins(&self) -> usize {
        self.num_range_bins
    }

    pub fn angle_bins(&self) -> usize {
        self.num_angle_bins
    }

    pub fn elevation_planes(&self) -> usize {
        self.num_elevation
    }

    pub fn q_format(&self) -> u8 {
        self.q_format
    }

    #[inline]
    pub fn index(&self, elevation: usize, range: usize, angle: usize) -> usize {
        (elevation * self.num_range_bins + range) * self.num_angle_bins + angle
    }

    #[inline]
    pub fn get(&self, elevation: usize, range: usize, angle: usize) -> u16 {
        self.data[self.index(elevation, range, angle)]
    }

    #[inline]
    pub fn set(&mut self, elevation: usize, range: usize, angle: usize, value: u16) {
        let idx = self.index(elevation, range, angle);
        self.data[idx] = value;
    }

    /// One range row (all angles) of one plane.
    pub fn row(&self, elevation: usize, range: usize) -> &[u16] {
        let start = self.index(elevation, range, 0);
        &self.data[start..start + self.num_angle_bins]
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn azimuth_deg(&self, angle: usize) -> f64 {
        self.azimuth_deg[angle]
    }

    pub fn elevation_deg(&self, plane: usize) -> f64 {
        self.elevation_deg[plane]
    }

    pub fn azimuth_axis(&self) -> &[f64] {
        &self.azimuth_deg
    }

    /// Convert a raw difference in this matrix's Q format to dB.
    pub fn to_db(&self, raw: u32) -> f64 {
        raw_to_db(raw, self.q_format)
    }
}

fn centred_axis(n: usize) -> Vec<f64> {
    let centre = (n as f64 - 1.0) / 2.0;
    (0..n).map(|i| i as f64 - centre).collect()
}

/// A cell that passed CFAR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfarDetection {
    pub range_index: usize,
    pub angle_index: usize,
    pub elevation_index: usize,
    /// Cell value, raw log2 units
    pub signal: u16,
    /// Noise estimate, raw log2 units
    pub noise_avg: u16,
    pub snr_db: f64,
}

/// One Capon spectrum peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleEstimate {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    /// Capon power (linear), summed over the expanded peak
    pub power: f64,
    /// `1 - floor/peak`, in [0, 1)
    pub confidence: f64,
}

/// Cartesian point in metres, radial velocity in m/s.
///
/// `y` is boresight, `x` to the right, `z` up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloudPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub velocity: f64,
}

/// Per-point side information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SideInfo {
    /// SNR in 0.1 dB units
    pub snr: i16,
    /// Noise estimate, raw log2 units
    pub noise: u16,
}

/// Frame output: points and their side info, index-aligned.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<PointCloudPoint>,
    pub side_info: Vec<SideInfo>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            side_info: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: PointCloudPoint, side_info: SideInfo) {
        self.points.push(point);
        self.side_info.push(side_info);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PointCloudPoint, &SideInfo)> {
        self.points.iter().zip(&self.side_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_conversions() {
        assert_eq!(threshold_from_db(15.0, 8), 640);
        assert_relative_eq!(raw_to_db(640, 8), 15.0);
        assert_relative_eq!(raw_to_db(853, 8), 19.992, epsilon = 1e-3);
        assert_eq!(threshold_from_db(-3.0, 8), 0);
    }

    #[test]
    fn test_matrix_layout() {
        let mut m = DetectionMatrix::new(4, 3, 2, 8).unwrap();
        m.set(1, 2, 0, 77);
        assert_eq!(m.get(1, 2, 0), 77);
        assert_eq!(m.data()[(4 + 2) * 3], 77);
        assert_eq!(m.row(1, 2), &[77, 0, 0]);
        assert_eq!(m.azimuth_axis(), &[-1.0, 0.0, 1.0]);
        assert_relative_eq!(m.elevation_deg(0), -0.5);
    }

    #[test]
    fn test_matrix_shape_errors() {
        assert_eq!(
            DetectionMatrix::from_data(4, 4, 1, 8, vec![0; 15]),
            Err(ShapeError::DataLength {
                expected: 16,
                actual: 15
            })
        );
        assert_eq!(DetectionMatrix::new(0, 4, 1, 8), Err(ShapeError::Empty));
        let m = DetectionMatrix::new(4, 2, 1, 8).unwrap();
        assert!(m.with_azimuth_axis(vec![0.0]).is_err());
    }

    #[test]
    fn test_point_cloud_alignment() {
        let mut pc = PointCloud::with_capacity(2);
        pc.push(PointCloudPoint::default(), SideInfo { snr: 150, noise: 10 });
        assert_eq!(pc.len(), 1);
        let (_, info) = pc.iter().next().unwrap();
        assert_eq!(info.snr, 150);
    }
}
