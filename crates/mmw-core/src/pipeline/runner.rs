//! Event-driven pipeline thread
//!
//! [`PipelineRunner`] moves a [`PipelineScheduler`] onto a dedicated thread
//! and feeds it events over a bounded channel: captured ADC frames,
//! frame-start ticks and control requests. Every frame record and every
//! refused request comes back on the output channel in order.
//!
//! The in-flight frame is driven one engine step at a time and the event
//! queue is polled between steps, so a frame-start tick that lands before
//! the previous frame is consumed is handled as an overrun.
//!
//! ```rust
//! use std::time::Duration;
//! use mmw_accel::{LocalMemory, SimulatedAccelerator, SimulatedTransfer};
//! use mmw_core::config::MmwConfig;
//! use mmw_core::pipeline::{PipelineEvent, PipelineRunner, PipelineScheduler, RunnerOutput};
//!
//! let memory = LocalMemory::shared();
//! let scheduler = PipelineScheduler::new(
//!     &MmwConfig::default(),
//!     SimulatedAccelerator::new(memory.clone()),
//!     SimulatedTransfer::new(memory.clone()),
//!     memory,
//! )
//! .unwrap();
//!
//! let runner = PipelineRunner::spawn(scheduler).unwrap();
//! runner.send(PipelineEvent::Start).unwrap();
//! assert!(matches!(
//!     runner.recv_timeout(Duration::from_secs(1)),
//!     Some(RunnerOutput::Started)
//! ));
//! runner.shutdown();
//! ```

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mmw_accel::{Accelerator, Transfer};
use tracing::{debug, info, warn};

use crate::config::MmwConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::scheduler::{FrameOutput, PipelineScheduler};
use crate::radar_cube::AdcFrame;
use crate::stats::PipelineCounters;

const THREAD_NAME: &str = "mmw-pipeline";

/// Events that may wait for the pipeline thread before `send` blocks.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Input to the pipeline thread.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Capture finished writing one ADC frame
    InputCaptured(AdcFrame),
    /// Frame-start tick; an unconsumed previous frame is an overrun
    FrameStart,
    Reconfigure(Box<MmwConfig>),
    Start,
    /// Stop at the frame boundary
    Stop,
    /// Stop and exit the thread
    Shutdown,
}

/// Output of the pipeline thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerOutput {
    Frame(FrameOutput),
    Error(PipelineError),
    Started,
    Stopped,
    Reconfigured,
}

/// Handle to the pipeline thread.
pub struct PipelineRunner {
    events: SyncSender<PipelineEvent>,
    outputs: Receiver<RunnerOutput>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<PipelineCounters>,
}

impl PipelineRunner {
    /// Move `scheduler` onto its own thread.
    pub fn spawn<A, T>(scheduler: PipelineScheduler<A, T>) -> PipelineResult<Self>
    where
        A: Accelerator + 'static,
        T: Transfer + 'static,
    {
        let (events, rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);
        let (tx, outputs) = mpsc::channel();
        let counters = scheduler.counters();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(scheduler, rx, tx))
            .map_err(|err| {
                warn!(%err, "failed to spawn pipeline thread");
                PipelineError::Disconnected
            })?;

        Ok(Self {
            events,
            outputs,
            handle: Some(handle),
            counters,
        })
    }

    /// Queue an event, blocking while the queue is full.
    pub fn send(&self, event: PipelineEvent) -> PipelineResult<()> {
        self.events.send(event).map_err(|_| PipelineError::Disconnected)
    }

    /// Queue an event without blocking; a full queue gives the event back.
    pub fn try_send(&self, event: PipelineEvent) -> Result<(), TrySendError<PipelineEvent>> {
        self.events.try_send(event)
    }

    /// Next output, or `None` if nothing arrives within `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RunnerOutput> {
        match self.outputs.recv_timeout(timeout) {
            Ok(output) => Some(output),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything already queued, without blocking.
    pub fn drain(&self) -> Vec<RunnerOutput> {
        self.outputs.try_iter().collect()
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Stop the pipeline and join the thread.
    ///
    /// Returns whatever the thread published after the last receive.
    pub fn shutdown(mut self) -> Vec<RunnerOutput> {
        self.join();
        self.outputs.try_iter().collect()
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.events.send(PipelineEvent::Shutdown);
            if handle.join().is_err() {
                warn!("pipeline thread panicked");
            }
        }
    }
}

impl Drop for PipelineRunner {
    fn drop(&mut self) {
        self.join();
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("running", &self.handle.is_some())
            .field("counters", &self.counters.snapshot())
            .finish()
    }
}

fn run<A: Accelerator, T: Transfer>(
    mut scheduler: PipelineScheduler<A, T>,
    events: Receiver<PipelineEvent>,
    outputs: Sender<RunnerOutput>,
) {
    debug!("pipeline thread up");
    loop {
        // Block only when no frame has engine work left
        let event = if scheduler.in_flight().is_some() {
            match events.try_recv() {
                Ok(event) => Some(event),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match events.recv() {
                Ok(event) => Some(event),
                Err(_) => break,
            }
        };

        let shutdown = matches!(event, Some(PipelineEvent::Shutdown));
        let published = match event {
            Some(event) => handle_event(&mut scheduler, event),
            None => step(&mut scheduler),
        };
        if published.into_iter().any(|out| outputs.send(out).is_err()) {
            debug!("output receiver dropped");
            break;
        }
        if shutdown {
            break;
        }
    }
    info!(frames = scheduler.counters().frames(), "pipeline thread exiting");
}

/// One state-machine step of the in-flight frame.
fn step<A: Accelerator, T: Transfer>(scheduler: &mut PipelineScheduler<A, T>) -> Vec<RunnerOutput> {
    let position = |s: &PipelineScheduler<A, T>| s.in_flight().map(|id| (id, s.buffer_state(id)));
    let before = position(scheduler);
    match scheduler.advance() {
        Ok(frame) => frame.map(RunnerOutput::Frame).into_iter().collect(),
        Err(err) => {
            // A refused step leaves the buffer where it was
            if before.is_some() && position(scheduler) == before {
                scheduler.abandon_frame();
            }
            vec![RunnerOutput::Error(err)]
        }
    }
}

fn handle_event<A: Accelerator, T: Transfer>(
    scheduler: &mut PipelineScheduler<A, T>,
    event: PipelineEvent,
) -> Vec<RunnerOutput> {
    let mut out = Vec::new();
    match event {
        PipelineEvent::InputCaptured(frame) => {
            if let Err(err) = scheduler.load_input(&frame) {
                out.push(RunnerOutput::Error(err));
            }
        }
        PipelineEvent::FrameStart => match scheduler.frame_start() {
            Ok(records) => out.extend(records.into_iter().map(RunnerOutput::Frame)),
            Err(err) => out.push(RunnerOutput::Error(err)),
        },
        PipelineEvent::Reconfigure(config) => match scheduler.reconfigure(&config) {
            Ok(()) => out.push(RunnerOutput::Reconfigured),
            Err(err) => out.push(RunnerOutput::Error(err)),
        },
        PipelineEvent::Start => {
            scheduler.start();
            out.push(RunnerOutput::Started);
        }
        PipelineEvent::Stop | PipelineEvent::Shutdown => {
            if !scheduler.is_running() {
                return out;
            }
            match scheduler.stop() {
                Ok(drained) => out.extend(drained.into_iter().map(RunnerOutput::Frame)),
                Err(err) => out.push(RunnerOutput::Error(err)),
            }
            out.push(RunnerOutput::Stopped);
        }
    }
    out
}
