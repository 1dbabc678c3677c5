//! Software detection chain
//!
//! Consumes a transferred radar cube: heatmap, CFAR, angle estimation,
//! Doppler and point-cloud assembly.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::antenna::{AntennaGeometry, ChannelCompensation};
use crate::aoa::{AngleEstimator, AoaMode};
use crate::cfar::CfarDetector;
use crate::config::MmwConfig;
use crate::doppler::DopplerEstimator;
use crate::error::ConfigError;
use crate::heatmap::HeatmapBuilder;
use crate::mvdr_beamformer::CMatrix;
use crate::point_cloud::{PointCloudAssembler, PointInput};
use crate::radar_cube::RadarCube;
use crate::stats::FrameStats;
use crate::types::{AngleEstimate, CfarDetection, DetectionMatrix, IQSample, PointCloud, ShapeError};

/// Frozen per-configuration processing chain.
#[derive(Debug, Clone)]
pub struct DetectionChain {
    heatmap: HeatmapBuilder,
    cfar: CfarDetector,
    aoa: AngleEstimator,
    doppler: DopplerEstimator,
    assembler: PointCloudAssembler,
    compensation: ChannelCompensation,
    static_clutter_removal: bool,
    num_range_bins: usize,
    num_angle_bins: usize,
    num_chirps: usize,
    num_antennas: usize,
}

impl DetectionChain {
    /// Validate `config` and build every stage.
    pub fn new(config: &MmwConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometry: &AntennaGeometry = &config.geometry.antennas;
        let compensation =
            ChannelCompensation::from_config(&config.calibration, geometry.num_antennas())?;

        let heatmap = HeatmapBuilder::new(
            config.pipeline.heatmap.clone(),
            geometry,
            config.aoa.mvdr_alpha,
            compensation.clone(),
        )?;
        let cfar = CfarDetector::new(
            config.cfar.clone(),
            config.cfar_second_pass.clone(),
            config.num_range_bins(),
            config.num_angle_bins(),
        )?;
        // Snapshots are compensated once here, so the estimator sees corrected data
        let aoa = AngleEstimator::new(config.aoa.clone(), geometry.clone())?;
        let doppler = DopplerEstimator::new(config.geometry.num_chirps)?;
        let assembler = PointCloudAssembler::new(config.point_cloud.clone())?;

        Ok(Self {
            heatmap,
            cfar,
            aoa,
            doppler,
            assembler,
            compensation,
            static_clutter_removal: config.pipeline.static_clutter_removal,
            num_range_bins: config.num_range_bins(),
            num_angle_bins: config.num_angle_bins(),
            num_chirps: config.geometry.num_chirps,
            num_antennas: geometry.num_antennas(),
        })
    }

    pub fn cfar(&self) -> &CfarDetector {
        &self.cfar
    }

    pub fn angle_estimator(&self) -> &AngleEstimator {
        &self.aoa
    }

    pub fn assembler(&self) -> &PointCloudAssembler {
        &self.assembler
    }

    /// Full chain over a range-processed cube.
    pub fn process_cube(
        &self,
        mut cube: RadarCube,
        stats: &mut FrameStats,
    ) -> Result<(PointCloud, RadarCube), ShapeError> {
        check_axis("range", self.num_range_bins, cube.range_bins())?;
        check_axis("chirp", self.num_chirps, cube.chirps())?;
        check_axis("antenna", self.num_antennas, cube.antennas())?;

        if self.static_clutter_removal {
            cube.remove_static_clutter();
        }
        let matrix = self.heatmap.build(&cube)?;
        let detections = self.cfar.detect(&matrix);
        stats.detections = detections.len();

        let mut by_range: BTreeMap<usize, Vec<CfarDetection>> = BTreeMap::new();
        for det in detections {
            by_range.entry(det.range_index).or_default().push(det);
        }

        let mut inputs = Vec::new();
        for (range, dets) in &by_range {
            let snapshots = self.snapshots(&cube, *range);
            let Some(inverse) = self.aoa.inverse_covariance(&snapshots) else {
                trace!(range, "degenerate covariance");
                continue;
            };
            match self.aoa.config().mode {
                AoaMode::FullHeatmap => {
                    for angle in self.aoa.estimate_with(&inverse, None) {
                        let detection = nearest_detection(dets, &matrix, angle.azimuth_deg);
                        inputs.push(PointInput {
                            detection,
                            angle,
                            doppler_index: self.doppler_index(&snapshots, &inverse, &angle),
                        });
                    }
                }
                AoaMode::ElevationOnly => {
                    for det in dets {
                        let azimuth = matrix.azimuth_deg(det.angle_index);
                        for angle in self.aoa.estimate_with(&inverse, Some(azimuth)) {
                            inputs.push(PointInput {
                                detection: *det,
                                angle,
                                doppler_index: self.doppler_index(&snapshots, &inverse, &angle),
                            });
                        }
                    }
                }
            }
        }

        let cloud = self.assembler.assemble(&inputs, stats);
        debug!(
            detections = stats.detections,
            ranges = by_range.len(),
            points = cloud.len(),
            "cube processed"
        );
        Ok((cloud, cube))
    }

    /// CFAR and point assembly over a pre-built detection matrix.
    ///
    /// Angles come from the matrix axes; Doppler is not available and is
    /// reported as zero.
    pub fn process_matrix(
        &self,
        matrix: &DetectionMatrix,
        stats: &mut FrameStats,
    ) -> Result<PointCloud, ShapeError> {
        check_axis("range", self.num_range_bins, matrix.range_bins())?;
        if self.cfar.second_pass().is_some() {
            check_axis("angle", self.num_angle_bins, matrix.angle_bins())?;
        }

        let detections = self.cfar.detect(matrix);
        stats.detections = detections.len();
        let q = matrix.q_format();
        let inputs: Vec<PointInput> = detections
            .into_iter()
            .map(|det| PointInput {
                angle: AngleEstimate {
                    azimuth_deg: matrix.azimuth_deg(det.angle_index),
                    elevation_deg: matrix.elevation_deg(det.elevation_index),
                    power: linear_power(det.signal, q),
                    confidence: 1.0 - linear_power(det.noise_avg, q) / linear_power(det.signal, q),
                },
                detection: det,
                doppler_index: 0,
            })
            .collect();
        Ok(self.assembler.assemble(&inputs, stats))
    }

    fn snapshots(&self, cube: &RadarCube, range: usize) -> Vec<Vec<IQSample>> {
        let mut snapshots = cube.snapshots(range);
        if !self.compensation.is_identity() {
            for s in &mut snapshots {
                self.compensation.apply(s);
            }
        }
        snapshots
    }

    fn doppler_index(&self, snapshots: &[Vec<IQSample>], inverse: &CMatrix, angle: &AngleEstimate) -> i32 {
        let steering = self
            .aoa
            .geometry()
            .steering_vector(angle.azimuth_deg, angle.elevation_deg);
        self.doppler.estimate(snapshots, inverse, &steering).unwrap_or(0)
    }
}

fn check_axis(axis: &'static str, expected: usize, actual: usize) -> Result<(), ShapeError> {
    if expected != actual {
        return Err(ShapeError::Axis {
            axis,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Linear power of a raw log2-magnitude value.
fn linear_power(raw: u16, q_format: u8) -> f64 {
    (2.0 * raw as f64 / (1u32 << q_format) as f64).exp2()
}

/// Detection at the same range whose column is closest to `azimuth_deg`.
fn nearest_detection(dets: &[CfarDetection], matrix: &DetectionMatrix, azimuth_deg: f64) -> CfarDetection {
    let mut best = dets[0];
    let mut best_dist = f64::INFINITY;
    for det in dets {
        let dist = (matrix.azimuth_deg(det.angle_index) - azimuth_deg).abs();
        if dist < best_dist {
            best = *det;
            best_dist = dist;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfar::PeakGrouping;
    use crate::point_cloud::FieldOfView;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    const TARGET_RANGE: usize = 20;
    const TARGET_AZ: f64 = 20.0;
    const TARGET_DOPPLER: f64 = 3.0;

    fn target_cube(config: &MmwConfig, seed: u64) -> RadarCube {
        let (nr, nc) = (config.num_range_bins(), config.geometry.num_chirps);
        let geometry = &config.geometry.antennas;
        let na = geometry.num_antennas();
        let steering = geometry.steering_vector(TARGET_AZ, 0.0);
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.1).unwrap();
        let mut data = Vec::with_capacity(nr * nc * na);
        for r in 0..nr {
            for c in 0..nc {
                let s = IQSample::from_polar(100.0, 2.0 * PI * TARGET_DOPPLER * c as f64 / nc as f64);
                for a in 0..na {
                    let n = IQSample::new(noise.sample(&mut rng), noise.sample(&mut rng));
                    let x = if r == TARGET_RANGE { steering[a] * s } else { IQSample::new(0.0, 0.0) };
                    data.push(x + n);
                }
            }
        }
        RadarCube::new(nr, nc, na, data).unwrap()
    }

    #[test]
    fn test_moving_target_full_heatmap() {
        let config = MmwConfig::default();
        let chain = DetectionChain::new(&config).unwrap();
        let mut stats = FrameStats::default();
        let (cloud, _) = chain.process_cube(target_cube(&config, 7), &mut stats).unwrap();

        assert!(stats.detections >= 1);
        assert!(!cloud.is_empty());
        assert!(cloud.len() <= config.aoa.max_peaks);
        let (point, side) = cloud.iter().next().unwrap();
        let (range, az, el) = point.to_spherical();
        assert_relative_eq!(range, TARGET_RANGE as f64 * config.point_cloud.range_step_m, epsilon = 1e-6);
        assert!((az - TARGET_AZ).abs() <= 2.0, "azimuth {}", az);
        assert!(el.abs() <= 2.0, "elevation {}", el);
        assert_relative_eq!(point.velocity, TARGET_DOPPLER * config.point_cloud.velocity_step_mps, epsilon = 1e-9);
        assert!(side.snr > 150);
    }

    #[test]
    fn test_elevation_only_uses_cfar_azimuth() {
        let mut config = MmwConfig::default();
        config.aoa.mode = AoaMode::ElevationOnly;
        config.aoa.max_peaks = 1;
        config.cfar.peak_grouping = PeakGrouping::MatrixNeighbors;
        config.cfar_second_pass = Some(crate::cfar::CfarSecondPassConfig {
            peak_grouping: PeakGrouping::MatrixNeighbors,
            ..Default::default()
        });
        let chain = DetectionChain::new(&config).unwrap();
        let mut stats = FrameStats::default();
        let (cloud, _) = chain.process_cube(target_cube(&config, 11), &mut stats).unwrap();
        assert!(!cloud.is_empty());
        // Azimuth is the CFAR column, which sits exactly on the target
        assert!(cloud.points.iter().any(|p| (p.to_spherical().1 - TARGET_AZ).abs() < 1e-6));
        for point in &cloud.points {
            let (range, _, _) = point.to_spherical();
            assert_relative_eq!(range, TARGET_RANGE as f64 * config.point_cloud.range_step_m, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_static_target_removed() {
        let config = MmwConfig::default();
        let chain = DetectionChain::new(&config).unwrap();
        let (nr, nc) = (config.num_range_bins(), config.geometry.num_chirps);
        let na = config.geometry.num_antennas();
        let steering = config.geometry.antennas.steering_vector(-15.0, 0.0);
        let mut data = vec![IQSample::new(0.0, 0.0); nr * nc * na];
        for c in 0..nc {
            for a in 0..na {
                data[(10 * nc + c) * na + a] = steering[a] * 50.0;
            }
        }
        let cube = RadarCube::new(nr, nc, na, data).unwrap();
        let mut stats = FrameStats::default();
        let (cloud, _) = chain.process_cube(cube, &mut stats).unwrap();
        assert!(cloud.is_empty());
        assert_eq!(stats.detections, 0);
    }

    #[test]
    fn test_cube_shape_checked() {
        let config = MmwConfig::default();
        let chain = DetectionChain::new(&config).unwrap();
        let na = config.geometry.num_antennas();
        let cube = RadarCube::new(32, 16, na, vec![IQSample::new(0.0, 0.0); 32 * 16 * na]).unwrap();
        let err = chain.process_cube(cube, &mut FrameStats::default()).unwrap_err();
        assert_eq!(
            err,
            ShapeError::Axis {
                axis: "range",
                expected: 64,
                actual: 32
            }
        );
    }

    #[test]
    fn test_process_matrix_uses_axes() {
        let mut config = MmwConfig::default();
        config.point_cloud.range_step_m = 0.1;
        config.point_cloud.fov = FieldOfView::default();
        let chain = DetectionChain::new(&config).unwrap();

        let (nr, na) = (64, 9);
        let mut matrix = DetectionMatrix::new(nr, na, 1, 8)
            .unwrap()
            .with_azimuth_axis((0..na).map(|i| -40.0 + 10.0 * i as f64).collect())
            .unwrap();
        for r in 0..nr {
            for a in 0..na {
                matrix.set(0, r, a, 2000);
            }
        }
        // 20 dB above the floor at range 30, azimuth +20
        matrix.set(0, 30, 6, 2853);

        let mut stats = FrameStats::default();
        let cloud = chain.process_matrix(&matrix, &mut stats).unwrap();
        assert_eq!(stats.detections, 1);
        assert_eq!(cloud.len(), 1);
        let (range, az, el) = cloud.points[0].to_spherical();
        assert_relative_eq!(range, 3.0, epsilon = 1e-9);
        assert_relative_eq!(az, 20.0, epsilon = 1e-9);
        assert_relative_eq!(el, 0.0, epsilon = 1e-9);
        assert_eq!(cloud.points[0].velocity, 0.0);
        assert_eq!(cloud.side_info[0].snr, 200);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MmwConfig::default();
        config.aoa.max_peaks = 0;
        assert!(DetectionChain::new(&config).is_err());
    }
}
