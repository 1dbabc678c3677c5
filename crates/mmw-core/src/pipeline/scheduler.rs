//! Ping/pong pipeline scheduler
//!
//! Owns the buffer arena, both engines and the detection chain, and walks
//! each buffer through its state machine. Accelerator and Transfer are
//! exclusive: at most one buffer is `AcceleratorDispatched` and at most one
//! is `TransferDispatched` at any time.
//!
//! ## Example
//!
//! ```rust
//! use mmw_accel::{LocalMemory, SimulatedAccelerator, SimulatedTransfer};
//! use mmw_core::config::MmwConfig;
//! use mmw_core::pipeline::{PipelineScheduler, ResourcePolicy};
//! use mmw_core::radar_cube::AdcFrame;
//! use mmw_core::types::IQSample;
//!
//! let config = MmwConfig::default();
//! let memory = LocalMemory::shared();
//! let mut scheduler = PipelineScheduler::new(
//!     &config,
//!     SimulatedAccelerator::new(memory.clone()),
//!     SimulatedTransfer::new(memory.clone()),
//!     memory,
//! )
//! .unwrap()
//! .with_policy(ResourcePolicy::Refuse);
//!
//! scheduler.start();
//! let g = &config.geometry;
//! let frame = AdcFrame::from_fn(g.num_chirps, g.num_antennas(), g.samples_per_chirp, |_, _, _| {
//!     IQSample::new(0.0, 0.0)
//! })
//! .unwrap();
//! let outputs = scheduler.process_frame(&frame).unwrap();
//! assert_eq!(outputs.len(), 1);
//! assert!(outputs[0].stats.is_valid());
//! ```

use std::sync::Arc;

use mmw_accel::{
    memory, AccelError, Accelerator, CompletionToken, MemRegion, SharedMemory, StageDescriptor,
    Transfer, TransferDescriptor, TransferLayout,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::clock::{CycleClock, SystemCycleClock};
use crate::config::MmwConfig;
use crate::error::{ConfigError, PipelineError, PipelineResult, ResourceError};
use crate::pipeline::buffer::{BufferArena, BufferId, BufferState};
use crate::pipeline::chain::DetectionChain;
use crate::radar_cube::{AdcFrame, RadarCube};
use crate::stats::{FrameError, FrameStats, PipelineCounters};
use crate::types::PointCloud;

/// What to do when a caller violates engine exclusivity or buffer ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourcePolicy {
    /// Panic
    Fatal,
    /// Report the error and leave all state unchanged
    Refuse,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ResourcePolicy::Fatal
        } else {
            ResourcePolicy::Refuse
        }
    }
}

/// Result of one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameOutput {
    pub stats: FrameStats,
    /// Empty when `stats.error_code` is set
    pub cloud: PointCloud,
}

impl FrameOutput {
    fn failed(stats: FrameStats) -> Self {
        Self {
            stats,
            cloud: PointCloud::new(),
        }
    }
}

const ACCELERATOR: &str = "accelerator";
const TRANSFER: &str = "transfer";

/// Double-buffered detection pipeline.
pub struct PipelineScheduler<A: Accelerator, T: Transfer> {
    config: MmwConfig,
    chain: DetectionChain,
    arena: BufferArena,
    accel: A,
    dma: T,
    memory: SharedMemory,
    counters: Arc<PipelineCounters>,
    clock: Arc<dyn CycleClock>,
    policy: ResourcePolicy,
    running: bool,
    frame_number: u64,
    /// Buffer started by the latest frame-start signal
    current: Option<BufferId>,
    accel_outstanding: Option<(BufferId, CompletionToken)>,
    dma_outstanding: Option<(BufferId, CompletionToken)>,
}

impl<A: Accelerator, T: Transfer> PipelineScheduler<A, T> {
    /// Build a stopped scheduler; call [`start`](Self::start) before feeding frames.
    pub fn new(config: &MmwConfig, accel: A, dma: T, memory: SharedMemory) -> Result<Self, ConfigError> {
        let chain = DetectionChain::new(config)?;
        Ok(Self {
            config: config.clone(),
            chain,
            arena: BufferArena::new(),
            accel,
            dma,
            memory,
            counters: Arc::new(PipelineCounters::new()),
            clock: Arc::new(SystemCycleClock::default()),
            policy: config.pipeline.resource_policy,
            running: false,
            frame_number: 0,
            current: None,
            accel_outstanding: None,
            dma_outstanding: None,
        })
    }

    pub fn with_policy(mut self, policy: ResourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn CycleClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MmwConfig {
        &self.config
    }

    pub fn chain(&self) -> &DetectionChain {
        &self.chain
    }

    pub fn policy(&self) -> ResourcePolicy {
        self.policy
    }

    /// Shared cumulative counters.
    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    pub fn buffer_state(&self, id: BufferId) -> BufferState {
        self.arena.state(id)
    }

    pub fn current_buffer(&self) -> Option<BufferId> {
        self.current
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The started buffer, while it still has engine work or consumption ahead.
    pub fn in_flight(&self) -> Option<BufferId> {
        self.current.filter(|&id| {
            let state = self.arena.state(id);
            !state.is_quiescent() && state != BufferState::InputLoaded
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn accelerator_mut(&mut self) -> &mut A {
        &mut self.accel
    }

    pub fn transfer_mut(&mut self) -> &mut T {
        &mut self.dma
    }

    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            info!(frame = self.frame_number, "pipeline started");
        }
    }

    /// Stop at the frame boundary.
    ///
    /// The in-flight frame is driven to completion and returned; input that
    /// was loaded but never started is discarded.
    pub fn stop(&mut self) -> PipelineResult<Vec<FrameOutput>> {
        let mut drained = Vec::new();
        if let Some(output) = self.finish_frame()? {
            drained.push(output);
        }
        for id in BufferId::ALL {
            if self.arena.state(id) == BufferState::InputLoaded {
                debug!(buffer = %id, "discarding unstarted input");
                self.arena.reset(id);
            }
        }
        self.running = false;
        info!(frame = self.frame_number, drained = drained.len(), "pipeline stopped");
        Ok(drained)
    }

    /// Apply a new configuration.
    ///
    /// Refused with `InProgress` while any buffer is outside `Idle`/`Consumed`;
    /// a configuration that fails validation leaves the active one untouched.
    pub fn reconfigure(&mut self, config: &MmwConfig) -> PipelineResult<()> {
        let busy = self.arena.busy_count();
        if busy > 0 {
            self.counters.record_refused();
            warn!(busy, "reconfiguration refused, frame in flight");
            return Err(PipelineError::InProgress { busy });
        }
        let chain = DetectionChain::new(config)?;
        self.chain = chain;
        self.config = config.clone();
        self.policy = config.pipeline.resource_policy;
        info!(
            range_bins = config.num_range_bins(),
            chirps = config.geometry.num_chirps,
            policy = ?self.policy,
            "pipeline reconfigured"
        );
        Ok(())
    }

    fn refuse<R>(&self, err: ResourceError) -> PipelineResult<R> {
        self.counters.record_refused();
        match self.policy {
            ResourcePolicy::Fatal => panic!("pipeline resource violation: {}", err),
            ResourcePolicy::Refuse => {
                warn!(%err, "request refused");
                Err(PipelineError::Resource(err))
            }
        }
    }

    /// Write one ADC frame into a free buffer.
    pub fn load_input(&mut self, frame: &AdcFrame) -> PipelineResult<BufferId> {
        if !self.running {
            return Err(PipelineError::Stopped);
        }
        let g = &self.config.geometry;
        let expected = g.adc_samples();
        if frame.num_chirps() != g.num_chirps
            || frame.num_antennas() != g.num_antennas()
            || frame.samples_per_chirp() != g.samples_per_chirp
        {
            return Err(ResourceError::InputShape {
                expected,
                actual: frame.len(),
            }
            .into());
        }

        // Capture timing is external: a frame with nowhere to go is dropped,
        // never escalated under the policy.
        let Some(id) = self.free_buffer() else {
            self.counters.record_dropped_input();
            warn!(current = ?self.current, "no idle buffer, captured frame dropped");
            return Err(ResourceError::NoIdleBuffer.into());
        };
        if self.arena.state(id) == BufferState::Consumed {
            self.arena.reset(id);
        }

        {
            let mut mem = memory::lock(&self.memory).map_err(PipelineError::Accelerator)?;
            mem.write(&MemRegion::whole(id.adc_bank(), expected), frame.samples())
                .map_err(PipelineError::Accelerator)?;
        }
        self.arena.mark_loaded(id)?;
        if self.current == Some(id) {
            self.current = None;
        }
        debug!(buffer = %id, samples = expected, "input loaded");
        Ok(id)
    }

    /// Idle buffer first, then a consumed one; never one that is in flight.
    fn free_buffer(&self) -> Option<BufferId> {
        let mut candidates = BufferId::ALL;
        // Prefer the half not used by the current frame
        if self.current == Some(BufferId::Ping) {
            candidates.swap(0, 1);
        }
        candidates
            .iter()
            .copied()
            .find(|&id| self.arena.state(id) == BufferState::Idle)
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|&id| self.arena.state(id) == BufferState::Consumed)
            })
    }

    /// Frame-start signal.
    ///
    /// If the previous frame's buffer has not been consumed this is an
    /// overrun: the stale buffer is drained and reset, and its record is
    /// returned. The oldest loaded buffer is then dispatched; if the
    /// accelerator rejects it, that frame's failed record follows.
    pub fn frame_start(&mut self) -> PipelineResult<Vec<FrameOutput>> {
        if !self.running {
            return Err(PipelineError::Stopped);
        }
        // Refusals happen before any buffer is touched
        if let Some((outstanding, _)) = self.accel_outstanding {
            if self.current != Some(outstanding) {
                return self.refuse(ResourceError::DoubleDispatch {
                    engine: ACCELERATOR,
                    outstanding,
                });
            }
        }

        let mut records = Vec::new();
        if let Some(prev) = self.current.take() {
            match self.arena.state(prev) {
                BufferState::Consumed => self.arena.reset(prev),
                BufferState::Idle | BufferState::InputLoaded => {}
                _ => records.push(self.handle_overrun(prev)),
            }
        }

        self.frame_number += 1;
        let Some(id) = self.arena.oldest_loaded() else {
            debug!(frame = self.frame_number, "frame start without input");
            return Ok(records);
        };
        let now = self.clock.now_cycles();
        self.arena.get_mut(id).start_frame(self.frame_number, now);
        match self.dispatch_accelerator(id) {
            Ok(_) => self.current = Some(id),
            Err(PipelineError::Accelerator(err)) => {
                records.push(self.rejected(id, err, FrameError::AcceleratorFault));
            }
            Err(err) => return Err(err),
        }
        Ok(records)
    }

    /// An engine refused a stage for `id`: the frame is lost and the buffer
    /// goes back to `Idle`.
    fn rejected(&mut self, id: BufferId, source: AccelError, code: FrameError) -> FrameOutput {
        self.counters.record_hardware_fault();
        error!(buffer = %id, err = %source, "engine rejected stage");
        let mut stats = FrameStats::new(self.arena.get(id).frame_number());
        stats.error_code = Some(code);
        let output = self.finish_stats(id, stats, PointCloud::new());
        self.arena.reset(id);
        if self.current == Some(id) {
            self.current = None;
        }
        output
    }

    fn reset_accelerator(&mut self) {
        if let Err(err) = self.accel.reset() {
            warn!(%err, engine = ACCELERATOR, "engine reset failed");
        }
    }

    fn reset_transfer(&mut self) {
        if let Err(err) = self.dma.reset() {
            warn!(%err, engine = TRANSFER, "engine reset failed");
        }
    }

    fn handle_overrun(&mut self, id: BufferId) -> FrameOutput {
        self.counters.record_overrun();
        let state = self.arena.state(id);
        let frame_number = self.arena.get(id).frame_number();
        warn!(buffer = %id, ?state, frame = frame_number, "deadline overrun");
        self.drain(id);

        let mut stats = FrameStats::new(frame_number);
        stats.error_code = Some(FrameError::Overrun);
        stats.overrun_count = self.counters.overruns();
        FrameOutput::failed(stats)
    }

    /// Give up on the in-flight frame without a record: its outstanding
    /// completions are drained and the buffer returns to `Idle`.
    pub fn abandon_frame(&mut self) -> Option<BufferId> {
        let id = self.in_flight()?;
        warn!(buffer = %id, state = ?self.arena.state(id), "frame abandoned");
        self.drain(id);
        self.current = None;
        Some(id)
    }

    /// Collect any completion still owed to `id`, then reset it.
    fn drain(&mut self, id: BufferId) {
        let timeout = self.config.pipeline.completion_timeout();
        if let Some((owner, token)) = self.accel_outstanding {
            if owner == id {
                self.accel_outstanding = None;
                if let Err(err) = self.accel.wait(token, timeout) {
                    debug!(%err, "discarding accelerator completion");
                    self.reset_accelerator();
                }
            }
        }
        if let Some((owner, token)) = self.dma_outstanding {
            if owner == id {
                self.dma_outstanding = None;
                match self.dma.wait(token, timeout) {
                    Ok(storage) => self.arena.get_mut(id).recycle(storage),
                    Err(err) => {
                        debug!(%err, "discarding transfer completion");
                        self.reset_transfer();
                    }
                }
            }
        }
        self.arena.reset(id);
    }

    /// Submit the range FFT for `id`.
    pub fn dispatch_accelerator(&mut self, id: BufferId) -> PipelineResult<CompletionToken> {
        if let Some((outstanding, _)) = self.accel_outstanding {
            return self.refuse(ResourceError::DoubleDispatch {
                engine: ACCELERATOR,
                outstanding,
            });
        }
        let from = self.arena.state(id);
        if !from.can_transition_to(BufferState::AcceleratorDispatched) {
            return self.refuse(ResourceError::InvalidTransition {
                buffer: id,
                from,
                to: BufferState::AcceleratorDispatched,
            });
        }

        let g = &self.config.geometry;
        let stage = StageDescriptor::range_fft(
            id.adc_bank(),
            id.out_bank(),
            g.samples_per_chirp,
            g.range_fft_size,
            g.num_chirps * g.num_antennas(),
            self.config.pipeline.range_window.into(),
        );
        let token = self.accel.submit(stage).map_err(PipelineError::Accelerator)?;
        self.arena.transition(id, BufferState::AcceleratorDispatched)?;
        self.accel_outstanding = Some((id, token));
        debug!(buffer = %id, %token, "accelerator dispatched");
        Ok(token)
    }

    /// Block on the accelerator completion for `id`.
    ///
    /// On an error completion or timeout the buffer is marked consumed and
    /// `HardwareFault` is returned.
    pub fn wait_accelerator(&mut self, id: BufferId) -> PipelineResult<()> {
        let token = match self.accel_outstanding {
            Some((owner, token)) if owner == id => token,
            _ => {
                return self.refuse(ResourceError::InvalidTransition {
                    buffer: id,
                    from: self.arena.state(id),
                    to: BufferState::AcceleratorDone,
                })
            }
        };
        self.accel_outstanding = None;
        match self.accel.wait(token, self.config.pipeline.completion_timeout()) {
            Ok(()) => {
                self.arena.transition(id, BufferState::AcceleratorDone)?;
                Ok(())
            }
            Err(err) => {
                if matches!(err, AccelError::Timeout { .. }) {
                    self.reset_accelerator();
                }
                Err(self.hardware_fault(id, err))
            }
        }
    }

    /// Move the range FFT output of `id` into host memory.
    pub fn dispatch_transfer(&mut self, id: BufferId) -> PipelineResult<CompletionToken> {
        if let Some((outstanding, _)) = self.dma_outstanding {
            return self.refuse(ResourceError::DoubleDispatch {
                engine: TRANSFER,
                outstanding,
            });
        }
        let from = self.arena.state(id);
        if !from.can_transition_to(BufferState::TransferDispatched) {
            return self.refuse(ResourceError::InvalidTransition {
                buffer: id,
                from,
                to: BufferState::TransferDispatched,
            });
        }

        let g = &self.config.geometry;
        let len = g.cube_samples();
        let layout = TransferLayout::Transpose {
            rows: g.num_chirps * g.num_antennas(),
            cols: g.range_fft_size,
        };
        let host = self.arena.get_mut(id).take_host(len);
        let transfer = TransferDescriptor::new(MemRegion::whole(id.out_bank(), len), layout, host);
        let token = self.dma.submit(transfer).map_err(PipelineError::Accelerator)?;
        self.arena.transition(id, BufferState::TransferDispatched)?;
        self.dma_outstanding = Some((id, token));
        debug!(buffer = %id, %token, "transfer dispatched");
        Ok(token)
    }

    /// Block on the transfer completion for `id`.
    pub fn wait_transfer(&mut self, id: BufferId) -> PipelineResult<()> {
        let token = match self.dma_outstanding {
            Some((owner, token)) if owner == id => token,
            _ => {
                return self.refuse(ResourceError::InvalidTransition {
                    buffer: id,
                    from: self.arena.state(id),
                    to: BufferState::TransferDone,
                })
            }
        };
        self.dma_outstanding = None;
        match self.dma.wait(token, self.config.pipeline.completion_timeout()) {
            Ok(cube) => {
                self.arena.get_mut(id).store_cube(cube);
                self.arena.transition(id, BufferState::TransferDone)?;
                Ok(())
            }
            Err(err) => {
                if matches!(err, AccelError::Timeout { .. }) {
                    self.reset_transfer();
                }
                Err(self.hardware_fault(id, err))
            }
        }
    }

    fn hardware_fault(&mut self, id: BufferId, source: AccelError) -> PipelineError {
        self.counters.record_hardware_fault();
        error!(buffer = %id, err = %source, "hardware fault");
        // Dispatched -> Consumed is always in the table
        if let Err(err) = self.arena.transition(id, BufferState::Consumed) {
            warn!(%err, "fault on buffer in unexpected state");
            self.arena.reset(id);
        }
        PipelineError::HardwareFault { buffer: id, source }
    }

    /// Run the detection chain on a transferred buffer.
    pub fn consume(&mut self, id: BufferId) -> PipelineResult<FrameOutput> {
        let from = self.arena.state(id);
        if from != BufferState::TransferDone {
            return self.refuse(ResourceError::InvalidTransition {
                buffer: id,
                from,
                to: BufferState::Consumed,
            });
        }

        let mut stats = FrameStats::new(self.arena.get(id).frame_number());
        let data = self.arena.get_mut(id).take_cube().unwrap_or_default();
        let g = &self.config.geometry;
        let cloud = match RadarCube::new(g.range_fft_size, g.num_chirps, g.num_antennas(), data)
            .and_then(|cube| self.chain.process_cube(cube, &mut stats))
        {
            Ok((cloud, cube)) => {
                self.arena.get_mut(id).recycle(cube.into_data());
                cloud
            }
            Err(err) => {
                error!(buffer = %id, %err, "corrupt frame");
                stats.error_code = Some(FrameError::Corrupt);
                PointCloud::new()
            }
        };
        self.arena.transition(id, BufferState::Consumed)?;
        Ok(self.finish_stats(id, stats, cloud))
    }

    fn finish_stats(&mut self, id: BufferId, mut stats: FrameStats, cloud: PointCloud) -> FrameOutput {
        let cycles = self
            .clock
            .now_cycles()
            .saturating_sub(self.arena.get(id).dispatched_at());
        stats.processing_cycles = cycles;
        stats.overrun_count = self.counters.overruns();
        self.counters.record_frame(cycles, cloud.len());
        self.counters.record_truncated(stats.points_truncated);
        debug!(
            frame = stats.frame_number,
            points = cloud.len(),
            cycles,
            error = ?stats.error_code,
            "frame consumed"
        );
        FrameOutput { stats, cloud }
    }

    /// Take the current buffer one step along its state machine.
    ///
    /// Returns the frame output once the buffer is consumed, including frames
    /// invalidated by a hardware fault.
    pub fn advance(&mut self) -> PipelineResult<Option<FrameOutput>> {
        let Some(id) = self.current else {
            return Ok(None);
        };
        match self.arena.state(id) {
            BufferState::AcceleratorDispatched => self.settle(
                id,
                Self::wait_accelerator,
                FrameError::AcceleratorFault,
                FrameError::AcceleratorTimeout,
            ),
            BufferState::AcceleratorDone => match self.dispatch_transfer(id) {
                Ok(_) => Ok(None),
                Err(PipelineError::Accelerator(err)) => {
                    Ok(Some(self.rejected(id, err, FrameError::TransferFault)))
                }
                Err(err) => Err(err),
            },
            BufferState::TransferDispatched => self.settle(
                id,
                Self::wait_transfer,
                FrameError::TransferFault,
                FrameError::TransferTimeout,
            ),
            BufferState::TransferDone => self.consume(id).map(Some),
            BufferState::Idle | BufferState::InputLoaded | BufferState::Consumed => Ok(None),
        }
    }

    fn settle(
        &mut self,
        id: BufferId,
        wait: fn(&mut Self, BufferId) -> PipelineResult<()>,
        on_fault: FrameError,
        on_timeout: FrameError,
    ) -> PipelineResult<Option<FrameOutput>> {
        match wait(self, id) {
            Ok(()) => Ok(None),
            Err(PipelineError::HardwareFault { source, .. }) => {
                let mut stats = FrameStats::new(self.arena.get(id).frame_number());
                stats.error_code = Some(match source {
                    AccelError::Timeout { .. } => on_timeout,
                    _ => on_fault,
                });
                Ok(Some(self.finish_stats(id, stats, PointCloud::new())))
            }
            Err(err) => Err(err),
        }
    }

    /// Drive the current buffer until it is consumed.
    pub fn finish_frame(&mut self) -> PipelineResult<Option<FrameOutput>> {
        while self.in_flight().is_some() {
            if let Some(output) = self.advance()? {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }

    /// Load, start and fully process one frame.
    ///
    /// Returns every record produced: an overrun record for a stale buffer,
    /// if any, followed by the frame that was started.
    pub fn process_frame(&mut self, frame: &AdcFrame) -> PipelineResult<Vec<FrameOutput>> {
        self.load_input(frame)?;
        let mut outputs = self.frame_start()?;
        if let Some(output) = self.finish_frame()? {
            outputs.push(output);
        }
        Ok(outputs)
    }
}

impl<A: Accelerator, T: Transfer> std::fmt::Debug for PipelineScheduler<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineScheduler")
            .field("running", &self.running)
            .field("frame_number", &self.frame_number)
            .field("current", &self.current)
            .field("ping", &self.arena.state(BufferId::Ping))
            .field("pong", &self.arena.state(BufferId::Pong))
            .field("policy", &self.policy)
            .finish()
    }
}
