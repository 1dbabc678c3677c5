//! CFAR (Constant False Alarm Rate) detection
//!
//! Sliding-window detection over a log2-magnitude [`DetectionMatrix`]. The
//! first pass runs along range for every angle column; an optional second pass
//! re-tests the survivors along the angle dimension with its own window.
//!
//! Everything runs in the log domain: the noise estimate is an average of
//! reference cells and a cell passes when
//! `signal > noise_avg + threshold_scale`.
//!
//! ## Example
//!
//! ```rust
//! use mmw_core::cfar::{CfarConfig, CfarDetector};
//! use mmw_core::types::DetectionMatrix;
//!
//! let mut matrix = DetectionMatrix::from_data(64, 1, 1, 8, vec![2000; 64]).unwrap();
//! matrix.set(0, 30, 0, 2900);
//!
//! let detector = CfarDetector::new(CfarConfig::default(), None, 64, 1).unwrap();
//! let detections = detector.detect(&matrix);
//! assert_eq!(detections.len(), 1);
//! assert_eq!(detections[0].range_index, 30);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ConfigError;
use crate::types::{raw_to_db, CfarDetection, DetectionMatrix};

pub use crate::types::threshold_from_db;

/// How left and right reference sums combine into a noise estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CfarMode {
    /// Cell averaging: both sides together.
    #[default]
    Ca,
    /// Greatest-of: the larger side. Robust at clutter edges.
    Cago,
    /// Smallest-of: the smaller side. Resolves closely spaced targets.
    Caso,
}

/// Peak grouping scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakGrouping {
    Disabled,
    /// Compare against the neighbouring matrix cells.
    #[default]
    MatrixNeighbors,
    /// Compare only against neighbours that also passed CFAR.
    DetectedNeighbors,
}

/// Reference window along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfarWindow {
    pub mode: CfarMode,
    /// Total reference cells, half on each side
    pub win_len: usize,
    /// Guard cells per side
    pub guard_len: usize,
    /// Right shift applied to the two-sided sum
    pub noise_div_shift: u8,
    pub cyclic_mode: bool,
}

impl CfarWindow {
    fn half(&self) -> usize {
        self.win_len / 2
    }

    fn validate(&self, num_bins: usize, dimension: &str) -> Result<(), ConfigError> {
        if self.win_len < 2 || self.win_len % 2 != 0 {
            return Err(ConfigError::invalid(format!(
                "{} win_len must be even and >= 2, got {}",
                dimension, self.win_len
            )));
        }
        if self.noise_div_shift == 0 || self.noise_div_shift > 16 {
            return Err(ConfigError::invalid(format!(
                "{} noise_div_shift must be 1..=16, got {}",
                dimension, self.noise_div_shift
            )));
        }
        if 2 * (self.guard_len + self.win_len) >= num_bins {
            return Err(ConfigError::invalid(format!(
                "{} window 2*(guard_len {} + win_len {}) must be smaller than {} bins",
                dimension, self.guard_len, self.win_len, num_bins
            )));
        }
        Ok(())
    }
}

/// First-pass (range dimension) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CfarConfig {
    pub mode: CfarMode,
    pub win_len: usize,
    pub guard_len: usize,
    pub noise_div_shift: u8,
    pub cyclic_mode: bool,
    /// Detection threshold, raw log2 units
    pub threshold_scale: u16,
    pub peak_grouping: PeakGrouping,
    /// Leading range bins never tested
    pub left_skip: usize,
    /// Trailing range bins never tested
    pub right_skip: usize,
}

impl Default for CfarConfig {
    fn default() -> Self {
        Self {
            mode: CfarMode::Ca,
            win_len: 8,
            guard_len: 2,
            noise_div_shift: 3,
            cyclic_mode: false,
            threshold_scale: threshold_from_db(15.0, 8),
            peak_grouping: PeakGrouping::MatrixNeighbors,
            left_skip: 0,
            right_skip: 0,
        }
    }
}

impl CfarConfig {
    pub fn window(&self) -> CfarWindow {
        CfarWindow {
            mode: self.mode,
            win_len: self.win_len,
            guard_len: self.guard_len,
            noise_div_shift: self.noise_div_shift,
            cyclic_mode: self.cyclic_mode,
        }
    }

    /// Validate against the number of range bins.
    pub fn validate(&self, num_range_bins: usize) -> Result<(), ConfigError> {
        self.window().validate(num_range_bins, "range")?;
        if self.left_skip + self.right_skip >= num_range_bins {
            return Err(ConfigError::invalid(format!(
                "left_skip {} + right_skip {} leave no range bins",
                self.left_skip, self.right_skip
            )));
        }
        Ok(())
    }
}

/// Second-pass (angle dimension) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CfarSecondPassConfig {
    pub mode: CfarMode,
    pub win_len: usize,
    pub guard_len: usize,
    pub noise_div_shift: u8,
    pub cyclic_mode: bool,
    pub threshold_scale: u16,
    pub peak_grouping: PeakGrouping,
}

impl Default for CfarSecondPassConfig {
    fn default() -> Self {
        Self {
            mode: CfarMode::Ca,
            win_len: 4,
            guard_len: 1,
            noise_div_shift: 2,
            cyclic_mode: false,
            threshold_scale: threshold_from_db(6.0, 8),
            peak_grouping: PeakGrouping::Disabled,
        }
    }
}

impl CfarSecondPassConfig {
    pub fn window(&self) -> CfarWindow {
        CfarWindow {
            mode: self.mode,
            win_len: self.win_len,
            guard_len: self.guard_len,
            noise_div_shift: self.noise_div_shift,
            cyclic_mode: self.cyclic_mode,
        }
    }

    /// Validate against the number of angle bins.
    pub fn validate(&self, num_angle_bins: usize) -> Result<(), ConfigError> {
        self.window().validate(num_angle_bins, "angle")
    }
}

/// Strided view of one line through the matrix.
#[derive(Clone, Copy)]
struct Line<'a> {
    data: &'a [u16],
    start: usize,
    stride: usize,
    len: usize,
}

impl Line<'_> {
    #[inline]
    fn at(&self, i: usize) -> u16 {
        self.data[self.start + i * self.stride]
    }

    fn to_vec(self) -> Vec<u16> {
        (0..self.len).map(|i| self.at(i)).collect()
    }
}

/// Noise estimate for cell `index` of `line`.
///
/// Returns `None` when the window does not fit and the mode is not cyclic.
pub fn noise_estimate(line: &[u16], index: usize, window: &CfarWindow) -> Option<u16> {
    noise_on(
        Line {
            data: line,
            start: 0,
            stride: 1,
            len: line.len(),
        },
        index,
        window,
    )
}

fn noise_on(line: Line<'_>, index: usize, window: &CfarWindow) -> Option<u16> {
    let n = line.len;
    let half = window.half();
    let reach = window.guard_len + half;
    if n == 0 {
        return None;
    }

    let (left, right) = if window.cyclic_mode {
        let mut left = 0u32;
        let mut right = 0u32;
        for k in 1..=half {
            let offset = (window.guard_len + k) % n;
            left += line.at((index + n - offset) % n) as u32;
            right += line.at((index + offset) % n) as u32;
        }
        (left, right)
    } else {
        if index < reach || index + reach >= n {
            return None;
        }
        let left = (1..=half)
            .map(|k| line.at(index - window.guard_len - k) as u32)
            .sum::<u32>();
        let right = (1..=half)
            .map(|k| line.at(index + window.guard_len + k) as u32)
            .sum::<u32>();
        (left, right)
    };

    let shift = window.noise_div_shift as u32;
    let noise = match window.mode {
        CfarMode::Ca => (left + right) >> shift,
        CfarMode::Cago => left.max(right) >> (shift - 1),
        CfarMode::Caso => left.min(right) >> (shift - 1),
    };
    Some(noise.min(u16::MAX as u32) as u16)
}

/// Collapse runs of adjacent detections to their local maxima.
///
/// A detected cell survives if it is strictly greater than its left
/// neighbour and no smaller than its right neighbour. Under
/// `DetectedNeighbors`, neighbours that did not pass count as zero.
pub fn group_peaks(
    line: &[u16],
    detected: &[bool],
    scheme: PeakGrouping,
    cyclic: bool,
) -> Vec<bool> {
    let n = line.len();
    if scheme == PeakGrouping::Disabled {
        return detected.to_vec();
    }
    let neighbour = |i: usize, step: isize| -> u16 {
        let j = i as isize + step;
        let j = if cyclic {
            j.rem_euclid(n as isize) as usize
        } else if j < 0 || j >= n as isize {
            return 0;
        } else {
            j as usize
        };
        match scheme {
            PeakGrouping::DetectedNeighbors if !detected[j] => 0,
            _ => line[j],
        }
    };
    (0..n)
        .map(|i| detected[i] && line[i] > neighbour(i, -1) && line[i] >= neighbour(i, 1))
        .collect()
}

/// Two-pass CFAR detector over a detection matrix.
#[derive(Debug, Clone)]
pub struct CfarDetector {
    config: CfarConfig,
    second_pass: Option<CfarSecondPassConfig>,
}

impl CfarDetector {
    /// Validate and freeze a configuration for the given geometry.
    pub fn new(
        config: CfarConfig,
        second_pass: Option<CfarSecondPassConfig>,
        num_range_bins: usize,
        num_angle_bins: usize,
    ) -> Result<Self, ConfigError> {
        config.validate(num_range_bins)?;
        if let Some(second) = &second_pass {
            second.validate(num_angle_bins)?;
        }
        Ok(Self {
            config,
            second_pass,
        })
    }

    pub fn config(&self) -> &CfarConfig {
        &self.config
    }

    pub fn second_pass(&self) -> Option<&CfarSecondPassConfig> {
        self.second_pass.as_ref()
    }

    /// Run CFAR on every elevation plane.
    ///
    /// The output holds at most one detection per (range, angle), taken from
    /// the strongest plane, sorted by range then angle.
    pub fn detect(&self, matrix: &DetectionMatrix) -> Vec<CfarDetection> {
        let mut best: BTreeMap<(usize, usize), CfarDetection> = BTreeMap::new();
        for plane in 0..matrix.elevation_planes() {
            for det in self.detect_plane(matrix, plane) {
                best.entry((det.range_index, det.angle_index))
                    .and_modify(|cur| {
                        if det.signal > cur.signal {
                            *cur = det;
                        }
                    })
                    .or_insert(det);
            }
        }
        best.into_values().collect()
    }

    fn detect_plane(&self, matrix: &DetectionMatrix, plane: usize) -> Vec<CfarDetection> {
        let num_range = matrix.range_bins();
        let num_angle = matrix.angle_bins();
        let data = matrix.data();
        let window = self.config.window();

        // noise[range][angle] for cells passing the range pass
        let mut noise: Vec<Option<u16>> = vec![None; num_range * num_angle];

        let first = self.config.left_skip;
        let last = num_range.saturating_sub(self.config.right_skip);
        for angle in 0..num_angle {
            let line = Line {
                data,
                start: matrix.index(plane, 0, angle),
                stride: num_angle,
                len: num_range,
            };
            let mut passed = vec![false; num_range];
            let mut estimates = vec![0u16; num_range];
            for range in first..last {
                if let Some(est) = noise_on(line, range, &window) {
                    if line.at(range) as u32 > est as u32 + self.config.threshold_scale as u32 {
                        passed[range] = true;
                        estimates[range] = est;
                    }
                }
            }
            let kept = group_peaks(
                &line.to_vec(),
                &passed,
                self.config.peak_grouping,
                self.config.cyclic_mode,
            );
            for range in 0..num_range {
                if kept[range] {
                    noise[range * num_angle + angle] = Some(estimates[range]);
                }
            }
        }

        if let Some(second) = &self.second_pass {
            let window = second.window();
            for range in 0..num_range {
                let row = &noise[range * num_angle..(range + 1) * num_angle];
                if row.iter().all(Option::is_none) {
                    continue;
                }
                let line = Line {
                    data,
                    start: matrix.index(plane, range, 0),
                    stride: 1,
                    len: num_angle,
                };
                let passed: Vec<bool> = (0..num_angle)
                    .map(|angle| {
                        row[angle].is_some()
                            && noise_on(line, angle, &window).is_some_and(|est| {
                                line.at(angle) as u32 > est as u32 + second.threshold_scale as u32
                            })
                    })
                    .collect();
                let kept = group_peaks(
                    matrix.row(plane, range),
                    &passed,
                    second.peak_grouping,
                    second.cyclic_mode,
                );
                for (angle, keep) in kept.into_iter().enumerate() {
                    if !keep {
                        noise[range * num_angle + angle] = None;
                    }
                }
            }
        }

        let q = matrix.q_format();
        let detections: Vec<CfarDetection> = noise
            .iter()
            .enumerate()
            .filter_map(|(idx, est)| {
                est.map(|noise_avg| {
                    let range_index = idx / num_angle;
                    let angle_index = idx % num_angle;
                    let signal = matrix.get(plane, range_index, angle_index);
                    CfarDetection {
                        range_index,
                        angle_index,
                        elevation_index: plane,
                        signal,
                        noise_avg,
                        snr_db: raw_to_db(signal.saturating_sub(noise_avg) as u32, q),
                    }
                })
            })
            .collect();
        trace!(plane, count = detections.len(), "cfar plane done");
        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn line_matrix(values: Vec<u16>) -> DetectionMatrix {
        let n = values.len();
        DetectionMatrix::from_data(n, 1, 1, 8, values).unwrap()
    }

    #[test]
    fn test_single_target() {
        let mut values = vec![2000u16; 256];
        values[100] = 2000 + 853; // 20 dB in Q8
        let config = CfarConfig {
            win_len: 8,
            guard_len: 2,
            threshold_scale: threshold_from_db(15.0, 8),
            ..Default::default()
        };
        let detector = CfarDetector::new(config, None, 256, 1).unwrap();
        let dets = detector.detect(&line_matrix(values));
        assert_eq!(dets.len(), 1);
        assert!(dets[0].range_index.abs_diff(100) <= 1);
        assert!((dets[0].snr_db - 20.0).abs() < 0.5);
        assert_eq!(dets[0].noise_avg, 2000);
    }

    #[test]
    fn test_flat_input_no_detections() {
        let detector = CfarDetector::new(CfarConfig::default(), None, 128, 1).unwrap();
        assert!(detector.detect(&line_matrix(vec![1500; 128])).is_empty());
    }

    #[test]
    fn test_window_too_large_rejected() {
        let config = CfarConfig {
            win_len: 16,
            guard_len: 4,
            ..Default::default()
        };
        assert!(CfarDetector::new(config.clone(), None, 40, 1).is_err());
        assert!(CfarDetector::new(config, None, 41, 1).is_ok());

        let second = CfarSecondPassConfig {
            win_len: 4,
            guard_len: 2,
            ..Default::default()
        };
        assert!(CfarDetector::new(CfarConfig::default(), Some(second), 64, 12).is_err());
    }

    #[test]
    fn test_odd_window_rejected() {
        let config = CfarConfig {
            win_len: 7,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(256),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_noise_ordering() {
        let mut rng = StdRng::seed_from_u64(7);
        let line: Vec<u16> = (0..200).map(|_| rng.gen_range(1000..4000)).collect();
        for cyclic in [false, true] {
            let window = |mode| CfarWindow {
                mode,
                win_len: 8,
                guard_len: 2,
                noise_div_shift: 3,
                cyclic_mode: cyclic,
            };
            for i in 0..line.len() {
                let ca = noise_estimate(&line, i, &window(CfarMode::Ca));
                let go = noise_estimate(&line, i, &window(CfarMode::Cago));
                let so = noise_estimate(&line, i, &window(CfarMode::Caso));
                match (so, ca, go) {
                    (Some(so), Some(ca), Some(go)) => assert!(so <= ca && ca <= go),
                    (None, None, None) => assert!(!cyclic),
                    _ => panic!("modes disagree on window fit at {}", i),
                }
            }
        }
    }

    #[test]
    fn test_edges_skipped_unless_cyclic() {
        let mut values = vec![2000u16; 64];
        values[1] = 3000;
        let matrix = line_matrix(values);

        let plain = CfarDetector::new(CfarConfig::default(), None, 64, 1).unwrap();
        assert!(plain.detect(&matrix).is_empty());

        let cyclic = CfarConfig {
            cyclic_mode: true,
            ..Default::default()
        };
        let dets = CfarDetector::new(cyclic, None, 64, 1).unwrap().detect(&matrix);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].range_index, 1);
    }

    #[test]
    fn test_skip_bins_never_tested() {
        let mut values = vec![2000u16; 64];
        values[20] = 3000;
        values[50] = 3000;
        let config = CfarConfig {
            cyclic_mode: true,
            left_skip: 21,
            right_skip: 0,
            ..Default::default()
        };
        let dets = CfarDetector::new(config, None, 64, 1)
            .unwrap()
            .detect(&line_matrix(values));
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].range_index, 50);
    }

    #[test]
    fn test_grouping_collapses_cluster() {
        let mut values = vec![2000u16; 64];
        values[30] = 2800;
        values[31] = 3000;
        values[32] = 2900;
        for scheme in [PeakGrouping::MatrixNeighbors, PeakGrouping::DetectedNeighbors] {
            let config = CfarConfig {
                peak_grouping: scheme,
                threshold_scale: 300,
                ..Default::default()
            };
            let dets = CfarDetector::new(config, None, 64, 1)
                .unwrap()
                .detect(&line_matrix(values.clone()));
            assert_eq!(dets.len(), 1, "{:?}", scheme);
            assert_eq!(dets[0].range_index, 31);
        }

        let ungrouped = CfarConfig {
            peak_grouping: PeakGrouping::Disabled,
            threshold_scale: 300,
            ..Default::default()
        };
        let dets = CfarDetector::new(ungrouped, None, 64, 1)
            .unwrap()
            .detect(&line_matrix(values));
        assert_eq!(dets.len(), 3);
    }

    #[test]
    fn test_grouping_schemes_agree_on_isolated_target() {
        let line = [10, 10, 50, 10, 10, 10, 60, 10];
        let detected = [false, false, true, false, false, false, true, false];
        let a = group_peaks(&line, &detected, PeakGrouping::MatrixNeighbors, false);
        let b = group_peaks(&line, &detected, PeakGrouping::DetectedNeighbors, false);
        assert_eq!(a, b);
        assert_eq!(a, detected.to_vec());
    }

    #[test]
    fn test_grouping_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let line: Vec<u16> = (0..40).map(|_| rng.gen_range(0..100)).collect();
            let detected: Vec<bool> = line.iter().map(|&v| v > 40).collect();
            for scheme in [PeakGrouping::MatrixNeighbors, PeakGrouping::DetectedNeighbors] {
                for cyclic in [false, true] {
                    let once = group_peaks(&line, &detected, scheme, cyclic);
                    let twice = group_peaks(&line, &once, scheme, cyclic);
                    assert_eq!(once, twice);
                }
            }
        }
    }

    #[test]
    fn test_plateau_keeps_one_cell() {
        let line = [0, 5, 5, 0];
        let detected = [false, true, true, false];
        let kept = group_peaks(&line, &detected, PeakGrouping::MatrixNeighbors, false);
        assert_eq!(kept, vec![false, true, false, false]);
    }

    #[test]
    fn test_second_pass_rejects_angle_spread() {
        // Range 20 lights up every angle (broad clutter ridge); range 40 only angle 8.
        let (nr, na) = (64, 16);
        let mut matrix = DetectionMatrix::new(nr, na, 1, 8).unwrap();
        for r in 0..nr {
            for a in 0..na {
                matrix.set(0, r, a, 2000);
            }
        }
        for a in 0..na {
            matrix.set(0, 20, a, 3000);
        }
        matrix.set(0, 40, 8, 3000);

        let first_only = CfarDetector::new(CfarConfig::default(), None, nr, na).unwrap();
        assert_eq!(first_only.detect(&matrix).len(), na + 1);

        let second = CfarSecondPassConfig::default();
        let both = CfarDetector::new(CfarConfig::default(), Some(second), nr, na).unwrap();
        let dets = both.detect(&matrix);
        assert_eq!(dets.len(), 1);
        assert_eq!((dets[0].range_index, dets[0].angle_index), (40, 8));
        // Pass-one noise is reported
        assert_eq!(dets[0].noise_avg, 2000);
    }

    #[test]
    fn test_strongest_plane_wins() {
        let mut matrix = DetectionMatrix::new(64, 1, 2, 8).unwrap();
        for plane in 0..2 {
            for r in 0..64 {
                matrix.set(plane, r, 0, 2000);
            }
        }
        matrix.set(0, 30, 0, 2900);
        matrix.set(1, 30, 0, 3100);
        let detector = CfarDetector::new(CfarConfig::default(), None, 64, 1).unwrap();
        let dets = detector.detect(&matrix);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].elevation_index, 1);
        assert_eq!(dets[0].signal, 3100);
    }

    #[test]
    fn test_matrix_not_mutated() {
        let mut values = vec![2000u16; 64];
        values[30] = 2900;
        let matrix = line_matrix(values);
        let before = matrix.clone();
        let _ = CfarDetector::new(CfarConfig::default(), None, 64, 1)
            .unwrap()
            .detect(&matrix);
        assert_eq!(matrix, before);
    }
}
