//! Ping/pong buffer arena and per-buffer state machine
//!
//! ```text
//! Idle -> InputLoaded -> AcceleratorDispatched -> AcceleratorDone
//!      -> TransferDispatched -> TransferDone -> Consumed -> Idle
//! ```
//!
//! A hardware fault moves a dispatched buffer straight to `Consumed`.
//! Draining after an overrun resets any state to `Idle`.

use std::fmt;

use mmw_accel::{BankId, IQSample};
use tracing::debug;

use crate::error::ResourceError;

/// One half of the double buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferId {
    Ping,
    Pong,
}

impl BufferId {
    pub const ALL: [BufferId; 2] = [BufferId::Ping, BufferId::Pong];

    /// The other half.
    pub fn other(self) -> Self {
        match self {
            BufferId::Ping => BufferId::Pong,
            BufferId::Pong => BufferId::Ping,
        }
    }

    /// Accelerator-local bank receiving the ADC samples.
    pub fn adc_bank(self) -> BankId {
        match self {
            BufferId::Ping => BankId::AdcPing,
            BufferId::Pong => BankId::AdcPong,
        }
    }

    /// Accelerator-local bank holding the range FFT output.
    pub fn out_bank(self) -> BankId {
        match self {
            BufferId::Ping => BankId::OutPing,
            BufferId::Pong => BankId::OutPong,
        }
    }

    fn index(self) -> usize {
        match self {
            BufferId::Ping => 0,
            BufferId::Pong => 1,
        }
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferId::Ping => write!(f, "ping"),
            BufferId::Pong => write!(f, "pong"),
        }
    }
}

/// Processing state of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BufferState {
    /// Free for input capture
    Idle = 0,
    /// ADC samples written to the buffer's ADC bank
    InputLoaded = 1,
    /// Range FFT stage outstanding on the accelerator
    AcceleratorDispatched = 2,
    /// Range FFT output sits in the output bank
    AcceleratorDone = 3,
    /// Output bank is being moved to host memory
    TransferDispatched = 4,
    /// Radar cube available in host memory
    TransferDone = 5,
    /// Detection chain finished with the buffer
    Consumed = 6,
}

impl BufferState {
    /// Get valid transitions from this state
    pub fn valid_transitions(&self) -> &'static [BufferState] {
        match self {
            BufferState::Idle => &[BufferState::InputLoaded],
            BufferState::InputLoaded => &[BufferState::AcceleratorDispatched],
            BufferState::AcceleratorDispatched => {
                &[BufferState::AcceleratorDone, BufferState::Consumed]
            }
            BufferState::AcceleratorDone => &[BufferState::TransferDispatched],
            BufferState::TransferDispatched => &[BufferState::TransferDone, BufferState::Consumed],
            BufferState::TransferDone => &[BufferState::Consumed],
            BufferState::Consumed => &[BufferState::Idle],
        }
    }

    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: BufferState) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Idle or Consumed: nothing owned by an engine or the chain.
    pub fn is_quiescent(&self) -> bool {
        matches!(self, BufferState::Idle | BufferState::Consumed)
    }
}

/// Per-buffer bookkeeping.
#[derive(Debug)]
pub struct PipelineBuffer {
    id: BufferId,
    state: BufferState,
    /// Order in which input was loaded
    load_seq: u64,
    /// Frame this buffer is carrying
    frame_number: u64,
    /// Cycle count when the accelerator was dispatched
    dispatched_at: u64,
    /// Host destination, moved into the transfer while it is in flight
    host: Option<Vec<IQSample>>,
    /// Filled destination after transfer
    cube: Option<Vec<IQSample>>,
}

impl PipelineBuffer {
    fn new(id: BufferId) -> Self {
        Self {
            id,
            state: BufferState::Idle,
            load_seq: 0,
            frame_number: 0,
            dispatched_at: 0,
            host: None,
            cube: None,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn dispatched_at(&self) -> u64 {
        self.dispatched_at
    }

    pub(crate) fn start_frame(&mut self, frame_number: u64, cycles: u64) {
        self.frame_number = frame_number;
        self.dispatched_at = cycles;
    }

    /// Take the host destination, sized to `len`.
    pub(crate) fn take_host(&mut self, len: usize) -> Vec<IQSample> {
        let mut host = self.host.take().unwrap_or_default();
        host.clear();
        host.resize(len, IQSample::new(0.0, 0.0));
        host
    }

    pub(crate) fn store_cube(&mut self, cube: Vec<IQSample>) {
        self.cube = Some(cube);
    }

    /// Hand the cube to the consumer.
    pub(crate) fn take_cube(&mut self) -> Option<Vec<IQSample>> {
        self.cube.take()
    }

    /// Give a consumed cube's storage back for the next transfer.
    pub(crate) fn recycle(&mut self, storage: Vec<IQSample>) {
        self.host = Some(storage);
    }

    fn reset(&mut self) {
        if let Some(cube) = self.cube.take() {
            self.host.get_or_insert(cube);
        }
        self.state = BufferState::Idle;
    }
}

/// The two pipeline buffers.
#[derive(Debug)]
pub struct BufferArena {
    buffers: [PipelineBuffer; 2],
    next_seq: u64,
}

impl Default for BufferArena {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferArena {
    pub fn new() -> Self {
        Self {
            buffers: [PipelineBuffer::new(BufferId::Ping), PipelineBuffer::new(BufferId::Pong)],
            next_seq: 1,
        }
    }

    pub fn get(&self, id: BufferId) -> &PipelineBuffer {
        &self.buffers[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: BufferId) -> &mut PipelineBuffer {
        &mut self.buffers[id.index()]
    }

    pub fn state(&self, id: BufferId) -> BufferState {
        self.get(id).state
    }

    /// Move `id` to `to`, refusing transitions outside the table.
    pub fn transition(&mut self, id: BufferId, to: BufferState) -> Result<(), ResourceError> {
        let buffer = self.get_mut(id);
        let from = buffer.state;
        if !from.can_transition_to(to) {
            return Err(ResourceError::InvalidTransition { buffer: id, from, to });
        }
        buffer.state = to;
        debug!(buffer = %id, ?from, ?to, "buffer transition");
        Ok(())
    }

    /// Mark input loaded on `id`, recording load order.
    pub fn mark_loaded(&mut self, id: BufferId) -> Result<(), ResourceError> {
        self.transition(id, BufferState::InputLoaded)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.get_mut(id).load_seq = seq;
        Ok(())
    }

    /// Force `id` back to `Idle`.
    pub fn reset(&mut self, id: BufferId) {
        let buffer = self.get_mut(id);
        let from = buffer.state;
        buffer.reset();
        debug!(buffer = %id, ?from, "buffer reset");
    }

    /// Buffers in `state`.
    pub fn in_state(&self, state: BufferState) -> impl Iterator<Item = BufferId> + '_ {
        self.buffers.iter().filter(move |b| b.state == state).map(|b| b.id)
    }

    /// The buffer whose input was loaded first, if any.
    pub fn oldest_loaded(&self) -> Option<BufferId> {
        self.buffers
            .iter()
            .filter(|b| b.state == BufferState::InputLoaded)
            .min_by_key(|b| b.load_seq)
            .map(|b| b.id)
    }

    /// Number of buffers outside `Idle`/`Consumed`.
    pub fn busy_count(&self) -> usize {
        self.buffers.iter().filter(|b| !b.state.is_quiescent()).count()
    }
}
