//! # mmWave Radar Detection Core
//!
//! Signal processing and scheduling for an FMCW mmWave radar front end.
//! Raw ADC frames are range-transformed on an FFT accelerator, moved into
//! host memory by a transfer engine and turned into a point cloud in
//! software.
//!
//! ## Signal Flow
//!
//! ```text
//! ADC frame → [accel] range FFT → [transfer] transpose → radar cube
//!   → clutter removal → range-angle heatmap → CFAR → Capon AoA
//!   → Doppler → field-of-view filter → point cloud
//! ```
//!
//! Two buffers (ping and pong) alternate so that capture and the range FFT
//! of one frame overlap the detection chain of the previous one. See
//! [`pipeline`] for the state machine and the overrun/fault rules.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmw_core::{MmwConfig, PipelineScheduler};
//! use mmw_core::observe::init_logging;
//!
//! let config = MmwConfig::load().expect("valid configuration");
//! init_logging(&config.logging);
//!
//! let (memory, accel, dma) = mmw_accel::create_default();
//! let mut scheduler = PipelineScheduler::new(&config, accel, dma, memory)
//!     .expect("configuration accepted");
//! scheduler.start();
//! ```

pub mod antenna;
pub mod aoa;
pub mod cfar;
pub mod clock;
pub mod config;
pub mod doppler;
pub mod error;
pub mod heatmap;
pub mod mvdr_beamformer;
pub mod observe;
pub mod pipeline;
pub mod point_cloud;
pub mod radar_cube;
pub mod stats;
pub mod types;

pub use antenna::{AntennaGeometry, CalibrationConfig, ChannelCompensation};
pub use aoa::{AngleEstimator, AoaConfig, AoaMode};
pub use cfar::{CfarConfig, CfarDetector, CfarMode, CfarSecondPassConfig, CfarWindow, PeakGrouping};
pub use clock::{CycleClock, MockCycleClock, SystemCycleClock};
pub use config::{GeometryConfig, MmwConfig, PipelineConfig, RangeWindow};
pub use doppler::DopplerEstimator;
pub use error::{ConfigError, PipelineError, PipelineResult, ResourceError};
pub use heatmap::{HeatmapBuilder, HeatmapConfig};
pub use pipeline::{
    BufferId, BufferState, DetectionChain, FrameOutput, PipelineEvent, PipelineRunner,
    PipelineScheduler, ResourcePolicy, RunnerOutput,
};
pub use point_cloud::{FieldOfView, PointCloudAssembler, PointCloudConfig};
pub use radar_cube::{AdcFrame, RadarCube};
pub use stats::{CountersSnapshot, FrameError, FrameStats, PipelineCounters};
pub use types::{
    AngleEstimate, CfarDetection, DetectionMatrix, IQSample, PointCloud, PointCloudPoint,
    ShapeError, SideInfo,
};
