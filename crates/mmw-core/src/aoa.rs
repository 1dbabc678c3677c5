//! Capon angle-of-arrival estimation
//!
//! Builds a diagonally loaded spatial covariance from a range cell's
//! snapshots, evaluates the Capon spectrum over an azimuth × elevation grid
//! and returns up to `max_peaks` refined peaks.
//!
//! Refinement steps, in order:
//! 1. local maxima above `peak_snr_threshold_db` (relative to the spectrum median)
//! 2. side-lobe rejection relative to the strongest peak
//! 3. peak expansion: power-weighted centroid over contiguous strong neighbours
//! 4. optional zoom-in on a finer grid around each peak
//!
//! ## Example
//!
//! ```rust
//! use mmw_core::antenna::AntennaGeometry;
//! use mmw_core::aoa::{AngleEstimator, AoaConfig};
//! use num_complex::Complex64;
//!
//! let geometry = AntennaGeometry::ula(8, 0.5);
//! let estimator = AngleEstimator::new(AoaConfig::azimuth_only(), geometry.clone()).unwrap();
//! let snapshots: Vec<Vec<Complex64>> = (0..32)
//!     .map(|k| {
//!         let s = Complex64::from_polar(10.0, k as f64);
//!         geometry.steering_vector(20.0, 0.0).into_iter().map(|a| a * s).collect()
//!     })
//!     .collect();
//! let peaks = estimator.estimate(&snapshots);
//! assert_eq!(peaks.len(), 1);
//! assert!((peaks[0].azimuth_deg - 20.0).abs() <= 1.0);
//! ```

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::antenna::{AntennaGeometry, ChannelCompensation};
use crate::error::ConfigError;
use crate::mvdr_beamformer::{capon_power, loaded_inverse, CMatrix};
use crate::types::AngleEstimate;

/// Hard ceiling on peaks per cell.
pub const MAX_PEAKS_LIMIT: usize = 6;

/// Which dimensions the search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AoaMode {
    /// Full azimuth × elevation search.
    #[default]
    FullHeatmap,
    /// Azimuth comes from the range-angle CFAR pass; only elevation is searched.
    ElevationOnly,
}

/// Angle estimation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AoaConfig {
    pub mode: AoaMode,
    pub azimuth_step_deg: f64,
    /// Half-width of the azimuth search, degrees
    pub azimuth_span_deg: f64,
    pub elevation_step_deg: f64,
    /// Half-width of the elevation search, degrees (0 = boresight only)
    pub elevation_span_deg: f64,
    /// Diagonal loading as a fraction of mean diagonal power
    pub mvdr_alpha: f64,
    pub max_peaks: usize,
    pub peak_expansion_samples: usize,
    pub peak_expansion_rel_threshold: f64,
    pub peak_expansion_snr_threshold_db: f64,
    pub side_lobe_threshold_db: f64,
    pub peak_snr_threshold_db: f64,
    /// Fine-grid subdivision; 1 disables zoom-in
    pub zoom_in_factor: usize,
    /// Coarse cells either side of a peak covered by the fine grid
    pub zoom_in_neighbors: usize,
    pub local_max_check: bool,
}

impl Default for AoaConfig {
    fn default() -> Self {
        Self {
            mode: AoaMode::FullHeatmap,
            azimuth_step_deg: 1.0,
            azimuth_span_deg: 60.0,
            elevation_step_deg: 2.0,
            elevation_span_deg: 20.0,
            mvdr_alpha: 0.03,
            max_peaks: 2,
            peak_expansion_samples: 2,
            peak_expansion_rel_threshold: 0.5,
            peak_expansion_snr_threshold_db: 3.0,
            side_lobe_threshold_db: 10.0,
            peak_snr_threshold_db: 6.0,
            zoom_in_factor: 1,
            zoom_in_neighbors: 1,
            local_max_check: true,
        }
    }
}

impl AoaConfig {
    /// Azimuth-only search (single elevation at boresight).
    pub fn azimuth_only() -> Self {
        Self {
            elevation_span_deg: 0.0,
            ..Default::default()
        }
    }

    /// Points on the searched grid: elevation only, or elevation × azimuth.
    pub fn search_points(&self) -> usize {
        let elevation = angle_grid(self.elevation_span_deg, self.elevation_step_deg).len();
        match self.mode {
            AoaMode::ElevationOnly => elevation,
            AoaMode::FullHeatmap => {
                elevation * angle_grid(self.azimuth_span_deg, self.azimuth_step_deg).len()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mvdr_alpha > 0.0) {
            return Err(ConfigError::invalid(format!(
                "mvdr_alpha must be positive, got {}",
                self.mvdr_alpha
            )));
        }
        if !(1..=MAX_PEAKS_LIMIT).contains(&self.max_peaks) {
            return Err(ConfigError::invalid(format!(
                "max_peaks must be 1..={}, got {}",
                MAX_PEAKS_LIMIT, self.max_peaks
            )));
        }
        if !(self.azimuth_step_deg > 0.0) || !(self.elevation_step_deg > 0.0) {
            return Err(ConfigError::invalid("angle search steps must be positive"));
        }
        if !(0.0..=90.0).contains(&self.azimuth_span_deg)
            || !(0.0..=90.0).contains(&self.elevation_span_deg)
        {
            return Err(ConfigError::invalid("angle search spans must be within 0..=90 degrees"));
        }
        if self.search_points() < 2 {
            return Err(ConfigError::invalid(format!(
                "{:?} angle search needs at least 2 grid points, got {}",
                self.mode,
                self.search_points()
            )));
        }
        if self.zoom_in_factor == 0 {
            return Err(ConfigError::invalid("zoom_in_factor must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.peak_expansion_rel_threshold) {
            return Err(ConfigError::invalid("peak_expansion_rel_threshold must be within 0..=1"));
        }
        Ok(())
    }
}

/// Symmetric grid `-span..=span` at `step`.
pub fn angle_grid(span_deg: f64, step_deg: f64) -> Vec<f64> {
    let half = (span_deg / step_deg + 1e-9).floor() as i64;
    (-half..=half).map(|k| k as f64 * step_deg).collect()
}

/// Capon spectrum over a (elevation × azimuth) grid, row-major by elevation.
#[derive(Debug, Clone)]
struct Spectrum {
    azimuth: Vec<f64>,
    elevation: Vec<f64>,
    power: Vec<f64>,
}

impl Spectrum {
    #[inline]
    fn at(&self, el: usize, az: usize) -> f64 {
        self.power[el * self.azimuth.len() + az]
    }

    fn neighbours(&self, el: usize, az: usize) -> impl Iterator<Item = f64> + '_ {
        let (ne, na) = (self.elevation.len() as isize, self.azimuth.len() as isize);
        (-1isize..=1)
            .flat_map(move |de| (-1isize..=1).map(move |da| (de, da)))
            .filter(|&(de, da)| de != 0 || da != 0)
            .filter_map(move |(de, da)| {
                let (e, a) = (el as isize + de, az as isize + da);
                (e >= 0 && e < ne && a >= 0 && a < na).then(|| self.at(e as usize, a as usize))
            })
    }

    /// Grid points no smaller than every neighbour and larger than at least one.
    fn local_maxima(&self) -> Vec<(usize, usize)> {
        let mut peaks = Vec::new();
        for el in 0..self.elevation.len() {
            for az in 0..self.azimuth.len() {
                let p = self.at(el, az);
                let mut any_lower = false;
                let mut is_max = true;
                for q in self.neighbours(el, az) {
                    if q > p {
                        is_max = false;
                        break;
                    }
                    any_lower |= q < p;
                }
                if is_max && any_lower {
                    peaks.push((el, az));
                }
            }
        }
        peaks
    }

    fn median(&self) -> f64 {
        let mut sorted = self.power.clone();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        if n == 0 {
            0.0
        } else if n % 2 == 1 {
            sorted[n / 2]
        } else {
            0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
        }
    }
}

fn db_ratio(p: f64, reference: f64) -> f64 {
    10.0 * (p / reference).log10()
}

/// Capon/MVDR angle estimator.
#[derive(Debug, Clone)]
pub struct AngleEstimator {
    config: AoaConfig,
    geometry: AntennaGeometry,
    compensation: ChannelCompensation,
    azimuth_grid: Vec<f64>,
    elevation_grid: Vec<f64>,
    /// Steering vectors for the full grid, row-major by elevation
    steering: Vec<Vec<Complex64>>,
}

impl AngleEstimator {
    pub fn new(config: AoaConfig, geometry: AntennaGeometry) -> Result<Self, ConfigError> {
        Self::with_compensation(config, geometry, ChannelCompensation::identity())
    }

    pub fn with_compensation(
        config: AoaConfig,
        geometry: AntennaGeometry,
        compensation: ChannelCompensation,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        geometry.validate()?;
        let azimuth_grid = angle_grid(config.azimuth_span_deg, config.azimuth_step_deg);
        let elevation_grid = angle_grid(config.elevation_span_deg, config.elevation_step_deg);
        let steering = elevation_grid
            .iter()
            .flat_map(|&el| azimuth_grid.iter().map(move |&az| (az, el)))
            .map(|(az, el)| geometry.steering_vector(az, el))
            .collect();
        Ok(Self {
            config,
            geometry,
            compensation,
            azimuth_grid,
            elevation_grid,
            steering,
        })
    }

    pub fn config(&self) -> &AoaConfig {
        &self.config
    }

    pub fn geometry(&self) -> &AntennaGeometry {
        &self.geometry
    }

    /// Apply channel compensation and build the loaded inverse covariance.
    ///
    /// `None` for degenerate input (all-zero or singular).
    pub fn inverse_covariance(&self, snapshots: &[Vec<Complex64>]) -> Option<CMatrix> {
        let n = self.geometry.num_antennas();
        if snapshots.is_empty() || snapshots.iter().any(|s| s.len() != n) {
            return None;
        }
        if self.compensation.is_identity() {
            return loaded_inverse(snapshots, self.config.mvdr_alpha);
        }
        let corrected: Vec<Vec<Complex64>> = snapshots
            .iter()
            .map(|s| {
                let mut s = s.clone();
                self.compensation.apply(&mut s);
                s
            })
            .collect();
        loaded_inverse(&corrected, self.config.mvdr_alpha)
    }

    /// Full azimuth × elevation search.
    pub fn estimate(&self, snapshots: &[Vec<Complex64>]) -> Vec<AngleEstimate> {
        match self.inverse_covariance(snapshots) {
            Some(inverse) => self.estimate_with(&inverse, None),
            None => {
                trace!("degenerate covariance, no peaks");
                Vec::new()
            }
        }
    }

    /// Elevation-only search at a fixed azimuth.
    pub fn estimate_elevation(
        &self,
        snapshots: &[Vec<Complex64>],
        azimuth_deg: f64,
    ) -> Vec<AngleEstimate> {
        match self.inverse_covariance(snapshots) {
            Some(inverse) => self.estimate_with(&inverse, Some(azimuth_deg)),
            None => Vec::new(),
        }
    }

    /// Search with a precomputed inverse covariance.
    ///
    /// With `fixed_azimuth`, the azimuth axis collapses to that single angle.
    pub fn estimate_with(&self, inverse: &CMatrix, fixed_azimuth: Option<f64>) -> Vec<AngleEstimate> {
        let spectrum = match fixed_azimuth {
            None => Spectrum {
                azimuth: self.azimuth_grid.clone(),
                elevation: self.elevation_grid.clone(),
                power: self.steering.iter().map(|a| capon_power(inverse, a)).collect(),
            },
            Some(az) => Spectrum {
                azimuth: vec![az],
                elevation: self.elevation_grid.clone(),
                power: self
                    .elevation_grid
                    .iter()
                    .map(|&el| capon_power(inverse, &self.geometry.steering_vector(az, el)))
                    .collect(),
            },
        };
        self.search(inverse, &spectrum)
    }

    fn search(&self, inverse: &CMatrix, spectrum: &Spectrum) -> Vec<AngleEstimate> {
        let cfg = &self.config;
        let floor = spectrum.median();
        if !(floor > 0.0) {
            return Vec::new();
        }

        let mut peaks: Vec<(usize, usize, f64)> = spectrum
            .local_maxima()
            .into_iter()
            .map(|(el, az)| (el, az, spectrum.at(el, az)))
            .filter(|&(_, _, p)| db_ratio(p, floor) >= cfg.peak_snr_threshold_db)
            .collect();
        peaks.sort_by(|a, b| b.2.total_cmp(&a.2));

        let Some(&(_, _, strongest)) = peaks.first() else {
            return Vec::new();
        };
        peaks.retain(|&(_, _, p)| db_ratio(strongest, p) <= cfg.side_lobe_threshold_db);
        peaks.truncate(cfg.max_peaks);

        peaks
            .into_iter()
            .map(|(el, az, peak_power)| {
                let (mut azimuth_deg, mut elevation_deg, power) =
                    self.expand(spectrum, el, az, peak_power, floor);
                if cfg.zoom_in_factor > 1 {
                    if let Some((z_az, z_el)) =
                        self.zoom(inverse, spectrum.azimuth[az], spectrum.elevation[el], spectrum)
                    {
                        azimuth_deg = z_az;
                        elevation_deg = z_el;
                    }
                }
                AngleEstimate {
                    azimuth_deg,
                    elevation_deg,
                    power,
                    confidence: (1.0 - floor / peak_power).clamp(0.0, 1.0),
                }
            })
            .collect()
    }

    /// Walk outwards along each axis while neighbours stay strong.
    ///
    /// Returns the power-weighted centroid and the summed power.
    fn expand(
        &self,
        spectrum: &Spectrum,
        el: usize,
        az: usize,
        peak_power: f64,
        floor: f64,
    ) -> (f64, f64, f64) {
        let cfg = &self.config;
        let mut members = vec![(el, az, peak_power)];
        let qualifies = |p: f64| {
            p >= cfg.peak_expansion_rel_threshold * peak_power
                && db_ratio(p, floor) >= cfg.peak_expansion_snr_threshold_db
        };
        let (ne, na) = (spectrum.elevation.len(), spectrum.azimuth.len());

        for (de, da) in [(0isize, -1isize), (0, 1), (-1, 0), (1, 0)] {
            let (mut e, mut a) = (el as isize, az as isize);
            for _ in 0..cfg.peak_expansion_samples {
                e += de;
                a += da;
                if e < 0 || a < 0 || e >= ne as isize || a >= na as isize {
                    break;
                }
                let p = spectrum.at(e as usize, a as usize);
                if !qualifies(p) {
                    break;
                }
                members.push((e as usize, a as usize, p));
            }
        }

        let total: f64 = members.iter().map(|m| m.2).sum();
        let az_c = members.iter().map(|m| spectrum.azimuth[m.1] * m.2).sum::<f64>() / total;
        let el_c = members.iter().map(|m| spectrum.elevation[m.0] * m.2).sum::<f64>() / total;
        (az_c, el_c, total)
    }

    /// Fine-grid search around a coarse peak.
    ///
    /// `None` when `local_max_check` rejects a maximum on the window edge.
    fn zoom(
        &self,
        inverse: &CMatrix,
        az: f64,
        el: f64,
        coarse: &Spectrum,
    ) -> Option<(f64, f64)> {
        let cfg = &self.config;
        let factor = cfg.zoom_in_factor as i64;
        let reach = cfg.zoom_in_neighbors as i64 * factor;
        let fine_az = cfg.azimuth_step_deg / factor as f64;
        let fine_el = cfg.elevation_step_deg / factor as f64;
        let az_steps: Vec<i64> = if coarse.azimuth.len() > 1 { (-reach..=reach).collect() } else { vec![0] };
        let el_steps: Vec<i64> = if coarse.elevation.len() > 1 { (-reach..=reach).collect() } else { vec![0] };

        let mut best = (0i64, 0i64, f64::NEG_INFINITY);
        for &de in &el_steps {
            for &da in &az_steps {
                let a = self.geometry.steering_vector(az + da as f64 * fine_az, el + de as f64 * fine_el);
                let p = capon_power(inverse, &a);
                if p > best.2 {
                    best = (de, da, p);
                }
            }
        }
        let on_edge = (az_steps.len() > 1 && best.1.abs() == reach)
            || (el_steps.len() > 1 && best.0.abs() == reach);
        if cfg.local_max_check && on_edge {
            trace!(az, el, "zoom maximum on window edge, keeping coarse estimate");
            return None;
        }
        Some((az + best.1 as f64 * fine_az, el + best.0 as f64 * fine_el))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    fn scenario(
        geometry: &AntennaGeometry,
        sources: &[(f64, f64)],
        snr_db: f64,
        snapshots: usize,
        seed: u64,
    ) -> Vec<Vec<Complex64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, (0.5f64).sqrt()).unwrap();
        let amplitude = 10f64.powf(snr_db / 20.0);
        let steering: Vec<_> = sources
            .iter()
            .map(|&(az, el)| geometry.steering_vector(az, el))
            .collect();
        (0..snapshots)
            .map(|_| {
                let gains: Vec<Complex64> = steering
                    .iter()
                    .map(|_| Complex64::from_polar(amplitude, rng.gen_range(0.0..2.0 * PI)))
                    .collect();
                (0..geometry.num_antennas())
                    .map(|n| {
                        let signal: Complex64 =
                            steering.iter().zip(&gains).map(|(a, g)| a[n] * g).sum();
                        signal + Complex64::new(noise.sample(&mut rng), noise.sample(&mut rng))
                    })
                    .collect()
            })
            .collect()
    }

    fn two_source_config() -> AoaConfig {
        AoaConfig {
            azimuth_span_deg: 90.0,
            azimuth_step_deg: 1.0,
            elevation_span_deg: 0.0,
            mvdr_alpha: 0.01,
            max_peaks: 4,
            peak_snr_threshold_db: 10.0,
            side_lobe_threshold_db: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_angle_grid() {
        assert_eq!(angle_grid(2.0, 1.0), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(angle_grid(0.0, 2.0), vec![0.0]);
        assert_eq!(angle_grid(60.0, 2.0).len(), 61);
    }

    #[test]
    fn test_two_sources() {
        let geometry = AntennaGeometry::ula(8, 0.5);
        let snapshots = scenario(&geometry, &[(-10.0, 0.0), (10.0, 0.0)], 15.0, 128, 42);
        let estimator = AngleEstimator::new(two_source_config(), geometry).unwrap();
        let mut peaks = estimator.estimate(&snapshots);
        assert_eq!(peaks.len(), 2, "{:?}", peaks);
        peaks.sort_by(|a, b| a.azimuth_deg.total_cmp(&b.azimuth_deg));
        assert!((peaks[0].azimuth_deg + 10.0).abs() <= 1.0);
        assert!((peaks[1].azimuth_deg - 10.0).abs() <= 1.0);
        assert!(peaks.iter().all(|p| p.confidence > 0.9));
    }

    #[test]
    fn test_zero_snapshots_yield_no_peaks() {
        let geometry = AntennaGeometry::ula(8, 0.5);
        let estimator = AngleEstimator::new(two_source_config(), geometry).unwrap();
        let zeros = vec![vec![Complex64::new(0.0, 0.0); 8]; 16];
        assert!(estimator.estimate(&zeros).is_empty());
        assert!(estimator.estimate(&[]).is_empty());
    }

    #[test]
    fn test_wrong_snapshot_width_yields_no_peaks() {
        let estimator =
            AngleEstimator::new(two_source_config(), AntennaGeometry::ula(8, 0.5)).unwrap();
        let short = vec![vec![Complex64::new(1.0, 0.0); 4]; 16];
        assert!(estimator.estimate(&short).is_empty());
    }

    #[test]
    fn test_side_lobe_threshold_drops_weak_source() {
        let geometry = AntennaGeometry::ula(8, 0.5);
        let mut snapshots = scenario(&geometry, &[(0.0, 0.0)], 30.0, 128, 3);
        // Add a second source 15 dB weaker at 35°
        let weak = scenario(&geometry, &[(35.0, 0.0)], 15.0, 128, 4);
        for (s, w) in snapshots.iter_mut().zip(&weak) {
            for (x, y) in s.iter_mut().zip(w) {
                *x += y;
            }
        }
        let strict = AoaConfig {
            side_lobe_threshold_db: 6.0,
            ..two_source_config()
        };
        let peaks = AngleEstimator::new(strict, geometry.clone())
            .unwrap()
            .estimate(&snapshots);
        assert_eq!(peaks.len(), 1);
        assert!(peaks[0].azimuth_deg.abs() <= 1.0);

        let lenient = AoaConfig {
            side_lobe_threshold_db: 40.0,
            ..two_source_config()
        };
        let peaks = AngleEstimator::new(lenient, geometry).unwrap().estimate(&snapshots);
        assert!(peaks.iter().any(|p| (p.azimuth_deg - 35.0).abs() <= 2.0));
    }

    #[test]
    fn test_max_peaks_caps_output() {
        let geometry = AntennaGeometry::ula(8, 0.5);
        let snapshots = scenario(&geometry, &[(-30.0, 0.0), (0.0, 0.0), (30.0, 0.0)], 20.0, 128, 9);
        let config = AoaConfig {
            max_peaks: 2,
            ..two_source_config()
        };
        let peaks = AngleEstimator::new(config, geometry).unwrap().estimate(&snapshots);
        assert_eq!(peaks.len(), 2);
    }

    #[test]
    fn test_zoom_refines_off_grid_source() {
        let geometry = AntennaGeometry::ula(8, 0.5);
        let snapshots = scenario(&geometry, &[(12.5, 0.0)], 25.0, 128, 5);
        let config = AoaConfig {
            azimuth_step_deg: 2.0,
            peak_expansion_samples: 0,
            zoom_in_factor: 4,
            zoom_in_neighbors: 1,
            ..two_source_config()
        };
        let peaks = AngleEstimator::new(config, geometry).unwrap().estimate(&snapshots);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].azimuth_deg - 12.5).abs() <= 0.5, "{:?}", peaks);
    }

    #[test]
    fn test_elevation_only() {
        let geometry = AntennaGeometry::default();
        let snapshots = scenario(&geometry, &[(10.0, 12.0)], 25.0, 64, 8);
        let estimator = AngleEstimator::new(
            AoaConfig {
                mode: AoaMode::ElevationOnly,
                elevation_span_deg: 40.0,
                elevation_step_deg: 2.0,
                max_peaks: 1,
                ..Default::default()
            },
            geometry,
        )
        .unwrap();
        let peaks = estimator.estimate_elevation(&snapshots, 10.0);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].azimuth_deg - 10.0).abs() < 1e-9);
        assert!((peaks[0].elevation_deg - 12.0).abs() <= 3.0, "{:?}", peaks);
    }

    #[test]
    fn test_compensation_restores_peak() {
        let geometry = AntennaGeometry::ula(8, 0.5);
        let mut snapshots = scenario(&geometry, &[(20.0, 0.0)], 25.0, 64, 12);
        // Channel 3 arrives 60° late
        let skew = Complex64::from_polar(1.0, (-60f64).to_radians());
        for s in &mut snapshots {
            s[3] *= skew;
        }
        let calibration = crate::antenna::CalibrationConfig {
            phase_deg: (0..8).map(|i| if i == 3 { 60.0 } else { 0.0 }).collect(),
            gain: vec![],
        };
        let comp = ChannelCompensation::from_config(&calibration, 8).unwrap();
        let estimator = AngleEstimator::with_compensation(
            AoaConfig::azimuth_only(),
            geometry,
            comp,
        )
        .unwrap();
        let peaks = estimator.estimate(&snapshots);
        assert!(!peaks.is_empty());
        assert!((peaks[0].azimuth_deg - 20.0).abs() <= 1.0);
    }

    #[test]
    fn test_validation() {
        let bad = [
            AoaConfig { mvdr_alpha: 0.0, ..Default::default() },
            AoaConfig { max_peaks: 0, ..Default::default() },
            AoaConfig { max_peaks: 7, ..Default::default() },
            AoaConfig { azimuth_step_deg: 0.0, ..Default::default() },
            AoaConfig { zoom_in_factor: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
        assert!(AoaConfig::default().validate().is_ok());
    }

    #[test]
    fn test_single_point_grid_rejected() {
        let flat = AoaConfig {
            mode: AoaMode::ElevationOnly,
            elevation_span_deg: 0.0,
            ..Default::default()
        };
        assert_eq!(flat.search_points(), 1);
        assert!(matches!(flat.validate(), Err(ConfigError::ValidationError(_))));
        assert!(AngleEstimator::new(flat, AntennaGeometry::default()).is_err());

        // Sub-step span still collapses to boresight
        let narrow = AoaConfig {
            mode: AoaMode::ElevationOnly,
            elevation_span_deg: 1.0,
            elevation_step_deg: 2.0,
            ..Default::default()
        };
        assert!(narrow.validate().is_err());

        let pinned = AoaConfig {
            azimuth_span_deg: 0.0,
            elevation_span_deg: 0.0,
            ..Default::default()
        };
        assert!(pinned.validate().is_err());

        // One elevation row is fine while azimuth still spans
        assert!(AoaConfig::azimuth_only().search_points() > 2);
        assert!(AoaConfig::azimuth_only().validate().is_ok());
    }
}
