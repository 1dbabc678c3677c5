//! # Configuration System
//!
//! YAML configuration for the detection pipeline:
//!
//! - Frame geometry (samples per chirp, range FFT size, chirps, antenna layout)
//! - Per-channel calibration
//! - CFAR, angle-of-arrival and point-cloud settings
//! - Pipeline settings (heatmap, clutter removal, timeouts, resource policy)
//! - Logging
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `MMW_CONFIG` environment variable
//! 2. `./mmw.yaml` (current directory)
//! 3. `~/.config/mmw/config.yaml` (user config)
//! 4. `/etc/mmw/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! version: 1
//! geometry:
//!   samples_per_chirp: 64
//!   range_fft_size: 64
//!   num_chirps: 16
//! cfar:
//!   mode: cago
//!   win_len: 8
//!   guard_len: 2
//! aoa:
//!   mode: elevation_only
//!   max_peaks: 2
//! pipeline:
//!   completion_timeout_ms: 20
//!   resource_policy: refuse
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mmw_accel::{WindowKind, BANK_CAPACITY};

use crate::antenna::{AntennaGeometry, CalibrationConfig, ChannelCompensation};
use crate::aoa::AoaConfig;
use crate::cfar::{CfarConfig, CfarSecondPassConfig};
use crate::error::ConfigError;
use crate::heatmap::HeatmapConfig;
use crate::observe::LogConfig;
use crate::pipeline::ResourcePolicy;
use crate::point_cloud::PointCloudConfig;

/// Current configuration format version.
pub const CONFIG_VERSION: u32 = 1;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MMW_CONFIG";

/// Frame geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// ADC samples per chirp and antenna
    pub samples_per_chirp: usize,
    /// Range FFT length, also the number of range bins
    pub range_fft_size: usize,
    /// Chirps per frame, also the Doppler FFT length
    pub num_chirps: usize,
    /// Virtual array layout
    pub antennas: AntennaGeometry,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            samples_per_chirp: 64,
            range_fft_size: 64,
            num_chirps: 16,
            antennas: AntennaGeometry::default(),
        }
    }
}

impl GeometryConfig {
    pub fn num_antennas(&self) -> usize {
        self.antennas.num_antennas()
    }

    /// Samples in one ADC frame.
    pub fn adc_samples(&self) -> usize {
        self.samples_per_chirp * self.num_chirps * self.num_antennas()
    }

    /// Samples in one range-processed cube.
    pub fn cube_samples(&self) -> usize {
        self.range_fft_size * self.num_chirps * self.num_antennas()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.antennas.validate()?;
        if self.samples_per_chirp == 0 {
            return Err(ConfigError::invalid("samples_per_chirp must be > 0"));
        }
        if !self.range_fft_size.is_power_of_two() || self.range_fft_size < self.samples_per_chirp {
            return Err(ConfigError::invalid(format!(
                "range_fft_size {} must be a power of two >= samples_per_chirp {}",
                self.range_fft_size, self.samples_per_chirp
            )));
        }
        if self.num_chirps < 2 || !self.num_chirps.is_power_of_two() {
            return Err(ConfigError::invalid(format!(
                "num_chirps {} must be a power of two >= 2",
                self.num_chirps
            )));
        }
        if self.adc_samples() > BANK_CAPACITY || self.cube_samples() > BANK_CAPACITY {
            return Err(ConfigError::invalid(format!(
                "frame needs {} ADC / {} cube samples, bank holds {}",
                self.adc_samples(),
                self.cube_samples(),
                BANK_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Window applied before the range FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeWindow {
    Rectangular,
    #[default]
    Hann,
    Blackman,
}

impl From<RangeWindow> for WindowKind {
    fn from(window: RangeWindow) -> Self {
        match window {
            RangeWindow::Rectangular => WindowKind::Rectangular,
            RangeWindow::Hann => WindowKind::Hann,
            RangeWindow::Blackman => WindowKind::Blackman,
        }
    }
}

/// Scheduler and processing-chain settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub heatmap: HeatmapConfig,
    /// Subtract the per range/antenna mean across chirps
    pub static_clutter_removal: bool,
    pub range_window: RangeWindow,
    /// Upper bound on one completion wait
    pub completion_timeout_ms: u64,
    pub resource_policy: ResourcePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            heatmap: HeatmapConfig::default(),
            static_clutter_removal: true,
            range_window: RangeWindow::Hann,
            completion_timeout_ms: 20,
            resource_policy: ResourcePolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmwConfig {
    pub version: u32,
    pub geometry: GeometryConfig,
    pub calibration: CalibrationConfig,
    pub cfar: CfarConfig,
    pub cfar_second_pass: Option<CfarSecondPassConfig>,
    pub aoa: AoaConfig,
    pub point_cloud: PointCloudConfig,
    pub pipeline: PipelineConfig,
    pub logging: LogConfig,
}

impl Default for MmwConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            geometry: GeometryConfig::default(),
            calibration: CalibrationConfig::default(),
            cfar: CfarConfig::default(),
            cfar_second_pass: None,
            aoa: AoaConfig::default(),
            point_cloud: PointCloudConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl MmwConfig {
    /// Load configuration from the default search path.
    ///
    /// Search order:
    /// 1. `MMW_CONFIG` environment variable
    /// 2. `./mmw.yaml`
    /// 3. `~/.config/mmw/config.yaml`
    /// 4. `/etc/mmw/config.yaml`
    ///
    /// Returns default config if no file is found. A file named by
    /// `MMW_CONFIG` that does not exist is an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            return Self::load_from(&path);
        }

        for path in &Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Get configuration search paths.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./mmw.yaml")];

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "mmw") {
            paths.push(config_dir.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/mmw/config.yaml"));

        paths
    }

    /// Number of range bins produced by the range FFT.
    pub fn num_range_bins(&self) -> usize {
        self.geometry.range_fft_size
    }

    /// Number of azimuth columns in the heatmap.
    pub fn num_angle_bins(&self) -> usize {
        self.pipeline.heatmap.num_angle_bins()
    }

    /// Validate every section against the frame geometry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::invalid(format!(
                "unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            )));
        }
        self.geometry.validate()?;
        self.pipeline.heatmap.validate()?;
        if self.pipeline.completion_timeout_ms == 0 {
            return Err(ConfigError::invalid("completion_timeout_ms must be > 0"));
        }

        self.cfar.validate(self.num_range_bins())?;
        if let Some(second) = &self.cfar_second_pass {
            second.validate(self.num_angle_bins())?;
        }
        self.aoa.validate()?;
        self.point_cloud.validate()?;
        ChannelCompensation::from_config(&self.calibration, self.geometry.num_antennas())?;

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let config = Self {
            cfar_second_pass: Some(CfarSecondPassConfig::default()),
            ..Default::default()
        };

        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoa::AoaMode;
    use crate::cfar::CfarMode;
    use crate::observe::LogLevel;

    #[test]
    fn test_default_config() {
        let config = MmwConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.geometry.num_antennas(), 12);
        assert_eq!(config.num_range_bins(), 64);
        assert_eq!(config.num_angle_bins(), 61);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
geometry:
  samples_per_chirp: 48
  range_fft_size: 64
  num_chirps: 32
cfar:
  mode: cago
  win_len: 6
  guard_len: 1
aoa:
  mode: elevation_only
  max_peaks: 3
pipeline:
  completion_timeout_ms: 5
  resource_policy: refuse
  range_window: blackman
logging:
  level: debug
"#;
        let config = MmwConfig::parse(yaml).unwrap();
        assert_eq!(config.geometry.samples_per_chirp, 48);
        assert_eq!(config.geometry.num_chirps, 32);
        assert_eq!(config.cfar.mode, CfarMode::Cago);
        assert_eq!(config.cfar.win_len, 6);
        assert_eq!(config.aoa.mode, AoaMode::ElevationOnly);
        assert_eq!(config.aoa.max_peaks, 3);
        assert_eq!(config.pipeline.resource_policy, ResourcePolicy::Refuse);
        assert_eq!(config.pipeline.range_window, RangeWindow::Blackman);
        assert_eq!(config.pipeline.completion_timeout(), Duration::from_millis(5));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = MmwConfig::parse("cfar:\n  guard_len: 3\n").unwrap();
        assert_eq!(config.cfar.guard_len, 3);
        assert_eq!(config.cfar.win_len, CfarConfig::default().win_len);
        assert_eq!(config.geometry, GeometryConfig::default());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            MmwConfig::parse("geometry: [1, 2"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = MmwConfig::default();
        config.geometry.num_chirps = 12;
        assert!(config.validate().is_err());

        let mut config = MmwConfig::default();
        config.geometry.range_fft_size = 16;
        config.cfar.win_len = 8;
        config.cfar.guard_len = 2;
        config.geometry.samples_per_chirp = 16;
        // 2*(2+8) >= 16
        assert!(config.validate().is_err());

        let mut config = MmwConfig::default();
        config.geometry.samples_per_chirp = 256;
        config.geometry.range_fft_size = 256;
        config.geometry.num_chirps = 64;
        assert!(config.validate().is_err(), "frame exceeds bank capacity");

        let mut config = MmwConfig::default();
        config.calibration.phase_deg = vec![0.0; 3];
        assert!(config.validate().is_err());

        let mut config = MmwConfig::default();
        config.cfar_second_pass = Some(CfarSecondPassConfig {
            win_len: 40,
            ..Default::default()
        });
        assert!(config.validate().is_err());

        let mut config = MmwConfig::default();
        config.version = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_yaml() {
        let yaml = MmwConfig::example_yaml();
        assert!(yaml.contains("geometry:"));
        assert!(yaml.contains("cfar_second_pass:"));
        let parsed = MmwConfig::parse(&yaml).unwrap();
        assert!(parsed.cfar_second_pass.is_some());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mmw.yaml");
        let mut config = MmwConfig::default();
        config.point_cloud.max_points = 42;
        config.cfar.mode = CfarMode::Caso;
        config.save(&path).unwrap();

        let loaded = MmwConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "aoa:\n  max_peaks: 9\n").unwrap();
        assert!(matches!(
            MmwConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            MmwConfig::load_from(&dir.path().join("missing.yaml")),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    fn test_range_window_mapping() {
        assert_eq!(WindowKind::from(RangeWindow::Hann), WindowKind::Hann);
        assert_eq!(WindowKind::from(RangeWindow::Rectangular), WindowKind::Rectangular);
    }

    #[test]
    fn test_config_search_paths() {
        let paths = MmwConfig::config_search_paths();
        assert!(paths.len() >= 2);
        assert_eq!(paths[0], PathBuf::from("./mmw.yaml"));
        assert_eq!(paths.last(), Some(&PathBuf::from("/etc/mmw/config.yaml")));
    }
}
