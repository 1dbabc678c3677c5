//! Point cloud assembly
//!
//! Turns (detection, angle, Doppler) tuples into Cartesian points with side
//! information, applying field-of-view gating and the per-frame point cap.
//!
//! Coordinate frame: `y` along boresight, `x` to the right, `z` up.
//!
//! ```text
//! x = r·cos(el)·sin(az)
//! y = r·cos(el)·cos(az)
//! z = r·sin(el)
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::stats::FrameStats;
use crate::types::{AngleEstimate, CfarDetection, PointCloud, PointCloudPoint, SideInfo};

/// Field of view; points outside are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOfView {
    pub min_range_m: f64,
    pub max_range_m: f64,
    pub min_azimuth_deg: f64,
    pub max_azimuth_deg: f64,
    pub min_elevation_deg: f64,
    pub max_elevation_deg: f64,
}

impl Default for FieldOfView {
    fn default() -> Self {
        Self {
            min_range_m: 0.0,
            max_range_m: 100.0,
            min_azimuth_deg: -90.0,
            max_azimuth_deg: 90.0,
            min_elevation_deg: -90.0,
            max_elevation_deg: 90.0,
        }
    }
}

impl FieldOfView {
    pub fn contains(&self, range_m: f64, azimuth_deg: f64, elevation_deg: f64) -> bool {
        (self.min_range_m..=self.max_range_m).contains(&range_m)
            && (self.min_azimuth_deg..=self.max_azimuth_deg).contains(&azimuth_deg)
            && (self.min_elevation_deg..=self.max_elevation_deg).contains(&elevation_deg)
    }
}

/// Point cloud conversion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudConfig {
    /// Metres per range bin
    pub range_step_m: f64,
    /// Subtracted from every range, metres
    pub range_bias_m: f64,
    /// m/s per Doppler bin
    pub velocity_step_mps: f64,
    pub max_points: usize,
    pub fov: FieldOfView,
}

impl Default for PointCloudConfig {
    fn default() -> Self {
        Self {
            range_step_m: 0.0732,
            range_bias_m: 0.0,
            velocity_step_mps: 0.08,
            max_points: 128,
            fov: FieldOfView::default(),
        }
    }
}

impl PointCloudConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.range_step_m > 0.0) {
            return Err(ConfigError::invalid("range_step_m must be positive"));
        }
        if !self.velocity_step_mps.is_finite() || !self.range_bias_m.is_finite() {
            return Err(ConfigError::invalid("velocity step and range bias must be finite"));
        }
        if self.max_points == 0 {
            return Err(ConfigError::invalid("max_points must be > 0"));
        }
        let fov = &self.fov;
        if fov.min_range_m > fov.max_range_m
            || fov.min_azimuth_deg > fov.max_azimuth_deg
            || fov.min_elevation_deg > fov.max_elevation_deg
        {
            return Err(ConfigError::invalid("field of view bounds are inverted"));
        }
        Ok(())
    }
}

/// Polar to Cartesian.
pub fn spherical_to_cartesian(range_m: f64, azimuth_deg: f64, elevation_deg: f64) -> (f64, f64, f64) {
    let (az, el) = (azimuth_deg.to_radians(), elevation_deg.to_radians());
    (
        range_m * el.cos() * az.sin(),
        range_m * el.cos() * az.cos(),
        range_m * el.sin(),
    )
}

/// Cartesian to polar: `(range, azimuth_deg, elevation_deg)`.
pub fn cartesian_to_spherical(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let range = (x * x + y * y + z * z).sqrt();
    if range == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let azimuth = x.atan2(y).to_degrees();
    let elevation = (z / range).clamp(-1.0, 1.0).asin().to_degrees();
    (range, azimuth, elevation)
}

impl PointCloudPoint {
    /// `(range, azimuth_deg, elevation_deg)` of this point.
    pub fn to_spherical(&self) -> (f64, f64, f64) {
        cartesian_to_spherical(self.x, self.y, self.z)
    }
}

/// One candidate point before gating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointInput {
    pub detection: CfarDetection,
    pub angle: AngleEstimate,
    pub doppler_index: i32,
}

/// Converts candidates into a capped, FOV-gated point cloud.
#[derive(Debug, Clone)]
pub struct PointCloudAssembler {
    config: PointCloudConfig,
}

impl PointCloudAssembler {
    pub fn new(config: PointCloudConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PointCloudConfig {
        &self.config
    }

    /// Range of a bin, clamped at zero.
    pub fn range_of(&self, range_index: usize) -> f64 {
        (range_index as f64 * self.config.range_step_m - self.config.range_bias_m).max(0.0)
    }

    /// Build the frame's point cloud; updates FOV and truncation counts in `stats`.
    pub fn assemble(&self, inputs: &[PointInput], stats: &mut FrameStats) -> PointCloud {
        let mut candidates: Vec<(PointCloudPoint, SideInfo, f64)> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let range = self.range_of(input.detection.range_index);
            let (az, el) = (input.angle.azimuth_deg, input.angle.elevation_deg);
            if !self.config.fov.contains(range, az, el) {
                stats.points_out_of_fov += 1;
                continue;
            }
            let (x, y, z) = spherical_to_cartesian(range, az, el);
            let point = PointCloudPoint {
                x,
                y,
                z,
                velocity: input.doppler_index as f64 * self.config.velocity_step_mps,
            };
            let snr_db = input.detection.snr_db;
            let side_info = SideInfo {
                snr: (snr_db * 10.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16,
                noise: input.detection.noise_avg,
            };
            candidates.push((point, side_info, snr_db));
        }

        let max = self.config.max_points;
        if candidates.len() > max {
            let dropped = candidates.len() - max;
            // Keep the strongest `max`, preserving input order
            let mut order: Vec<usize> = (0..candidates.len()).collect();
            order.sort_by(|&a, &b| candidates[b].2.total_cmp(&candidates[a].2));
            let mut keep = order[..max].to_vec();
            keep.sort_unstable();
            candidates = keep.into_iter().map(|i| candidates[i]).collect();
            stats.points_truncated += dropped;
            warn!(dropped, max, "point cloud truncated");
        }

        let mut cloud = PointCloud::with_capacity(candidates.len());
        for (point, side_info, _) in candidates {
            cloud.push(point, side_info);
        }
        debug!(
            points = cloud.len(),
            out_of_fov = stats.points_out_of_fov,
            "point cloud assembled"
        );
        cloud
    }
}
