//! Simulated accelerator and transfer backends
//!
//! Software implementations of the FFT engine and DMA engine, useful for:
//! - Development without hardware access
//! - Unit and scenario testing (including fault injection)
//! - Algorithm verification
//!
//! Work runs synchronously inside `submit`; the completion is then posted on
//! the completion channel exactly as a hardware interrupt would.

use std::f64::consts::PI;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{AccelError, AccelResult};
use crate::memory::{self, LocalMemory, SharedMemory, BANK_CAPACITY, NUM_BANKS};
use crate::signal::{completion_channel, CompletionQueue, CompletionSignal};
use crate::traits::{Accelerator, Transfer};
use crate::types::{
    AccelCapabilities, AccelInfo, Completion, CompletionStatus, CompletionToken, IQSample,
    StageDescriptor, StageKind, TransferDescriptor, TransferLayout, WindowKind,
};

/// Injected misbehaviour for the next submitted operation.
#[derive(Debug, Clone, PartialEq, Default)]
enum Fault {
    #[default]
    None,
    /// Complete with an error status
    ErrorCompletion(String),
    /// Never post a completion
    LostCompletion,
}

/// Bookkeeping shared by both simulated engines.
#[derive(Debug)]
struct Engine {
    name: &'static str,
    signal: CompletionSignal,
    queue: CompletionQueue,
    next_token: u64,
    outstanding: Option<CompletionToken>,
    fault: Fault,
    submitted: u64,
}

impl Engine {
    fn new(name: &'static str) -> Self {
        let (signal, queue) = completion_channel(name);
        Self {
            name,
            signal,
            queue,
            next_token: 1,
            outstanding: None,
            fault: Fault::None,
            submitted: 0,
        }
    }

    /// Claim the engine and allocate a token.
    fn claim(&mut self) -> AccelResult<CompletionToken> {
        if let Some(outstanding) = self.outstanding {
            return Err(AccelError::Busy {
                engine: self.name,
                outstanding,
            });
        }
        let token = CompletionToken(self.next_token);
        self.next_token += 1;
        self.outstanding = Some(token);
        self.submitted += 1;
        Ok(token)
    }

    /// Post the completion for `token`, honouring any injected fault.
    fn complete(&mut self, token: CompletionToken, result: AccelResult<Option<Vec<IQSample>>>) -> AccelResult<()> {
        let completion = match (std::mem::take(&mut self.fault), result) {
            (Fault::LostCompletion, _) => {
                trace!(engine = self.name, %token, "completion suppressed");
                return Ok(());
            }
            (Fault::ErrorCompletion(reason), _) => Completion::fault(token, reason),
            (Fault::None, Err(err)) => Completion::fault(token, err.to_string()),
            (Fault::None, Ok(Some(payload))) => Completion::with_payload(token, payload),
            (Fault::None, Ok(None)) => Completion::done(token),
        };
        self.signal.post(completion)
    }

    /// Wait for the outstanding completion and release the engine.
    fn wait(&mut self, token: CompletionToken, timeout: Duration) -> AccelResult<Completion> {
        match self.outstanding {
            None => return Err(AccelError::NothingOutstanding(self.name)),
            Some(expected) if expected != token => {
                return Err(AccelError::TokenMismatch {
                    expected,
                    actual: token,
                })
            }
            Some(_) => {}
        }
        let result = self.queue.wait_for(token, timeout);
        self.outstanding = None;
        let completion = result?;
        match &completion.status {
            CompletionStatus::Done => Ok(completion),
            CompletionStatus::Fault(reason) => Err(AccelError::Fault {
                engine: self.name,
                reason: reason.clone(),
            }),
        }
    }

    fn reset(&mut self) {
        self.outstanding = None;
        self.fault = Fault::None;
        let flushed = self.queue.flush();
        debug!(engine = self.name, flushed, "engine reset");
    }
}

/// Simulated FFT accelerator.
pub struct SimulatedAccelerator {
    memory: SharedMemory,
    engine: Engine,
    capabilities: AccelCapabilities,
}

impl SimulatedAccelerator {
    /// Create a simulated accelerator over the given local memory.
    pub fn new(memory: SharedMemory) -> Self {
        Self {
            memory,
            engine: Engine::new("accelerator"),
            capabilities: AccelCapabilities {
                max_fft_size: 1024,
                bank_count: NUM_BANKS,
                bank_capacity: BANK_CAPACITY,
                windows: vec![WindowKind::Rectangular, WindowKind::Hann, WindowKind::Blackman],
            },
        }
    }

    /// Create with custom capabilities
    pub fn with_capabilities(memory: SharedMemory, capabilities: AccelCapabilities) -> Self {
        let mut sim = Self::new(memory);
        sim.capabilities = capabilities;
        sim
    }

    /// The next submitted stage completes with an error status.
    pub fn fail_next(&mut self, reason: impl Into<String>) {
        self.engine.fault = Fault::ErrorCompletion(reason.into());
    }

    /// The next submitted stage never raises its completion.
    pub fn lose_next_completion(&mut self) {
        self.engine.fault = Fault::LostCompletion;
    }

    /// Number of stages accepted so far.
    pub fn submitted(&self) -> u64 {
        self.engine.submitted
    }

    /// Software FFT implementation (Cooley-Tukey radix-2), in place.
    fn software_fft(data: &mut [IQSample]) {
        let n = data.len();
        if n <= 1 {
            return;
        }

        // Bit-reversal permutation
        let mut j = 0;
        for i in 0..n {
            if i < j {
                data.swap(i, j);
            }
            let mut m = n >> 1;
            while m >= 1 && j >= m {
                j -= m;
                m >>= 1;
            }
            j += m;
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let angle_mult = -2.0 * PI / len as f64;
            for i in (0..n).step_by(len) {
                for k in 0..half {
                    let twiddle = IQSample::from_polar(1.0, angle_mult * k as f64);
                    let a = data[i + k];
                    let b = data[i + k + half] * twiddle;
                    data[i + k] = a + b;
                    data[i + k + half] = a - b;
                }
            }
            len *= 2;
        }
    }

    fn execute(&self, stage: &StageDescriptor) -> AccelResult<()> {
        let mut mem = memory::lock(&self.memory)?;
        LocalMemory::check(&stage.input)?;
        LocalMemory::check(&stage.output)?;

        match stage.kind {
            StageKind::Copy => {
                if stage.input.len != stage.output.len {
                    return Err(AccelError::BufferSizeMismatch {
                        expected: stage.input.len,
                        actual: stage.output.len,
                    });
                }
                let input = mem.region(&stage.input)?.to_vec();
                mem.write(&stage.output, &input)
            }
            StageKind::RangeFft {
                samples_per_vector,
                fft_size,
                num_vectors,
                window,
                remove_dc,
            } => {
                if !fft_size.is_power_of_two() || fft_size > self.capabilities.max_fft_size {
                    return Err(AccelError::ConfigError(format!(
                        "FFT size {} must be a power of 2 up to {}",
                        fft_size, self.capabilities.max_fft_size
                    )));
                }
                if samples_per_vector == 0 || samples_per_vector > fft_size {
                    return Err(AccelError::ConfigError(format!(
                        "{} samples per vector do not fit FFT size {}",
                        samples_per_vector, fft_size
                    )));
                }
                if stage.input.len != samples_per_vector * num_vectors {
                    return Err(AccelError::BufferSizeMismatch {
                        expected: samples_per_vector * num_vectors,
                        actual: stage.input.len,
                    });
                }
                if stage.output.len != fft_size * num_vectors {
                    return Err(AccelError::BufferSizeMismatch {
                        expected: fft_size * num_vectors,
                        actual: stage.output.len,
                    });
                }

                let coefficients: Vec<f64> = (0..samples_per_vector)
                    .map(|n| window.coefficient(n, samples_per_vector))
                    .collect();
                let input = mem.region(&stage.input)?.to_vec();
                let output = mem.region_mut(&stage.output)?;
                let mut scratch = vec![IQSample::new(0.0, 0.0); fft_size];

                for (vector, out) in input
                    .chunks_exact(samples_per_vector)
                    .zip(output.chunks_exact_mut(fft_size))
                {
                    let dc = if remove_dc {
                        vector.iter().sum::<IQSample>() / samples_per_vector as f64
                    } else {
                        IQSample::new(0.0, 0.0)
                    };
                    scratch.fill(IQSample::new(0.0, 0.0));
                    for ((s, &x), &w) in scratch.iter_mut().zip(vector).zip(&coefficients) {
                        *s = (x - dc) * w;
                    }
                    Self::software_fft(&mut scratch);
                    out.copy_from_slice(&scratch);
                }
                Ok(())
            }
        }
    }
}

impl Accelerator for SimulatedAccelerator {
    fn info(&self) -> AccelInfo {
        AccelInfo {
            name: "Simulated FFT accelerator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hardware: false,
        }
    }

    fn capabilities(&self) -> AccelCapabilities {
        self.capabilities.clone()
    }

    fn submit(&mut self, stage: StageDescriptor) -> AccelResult<CompletionToken> {
        let token = self.engine.claim()?;
        debug!(%token, stage = stage.name(), "accelerator stage submitted");
        let result = self.execute(&stage).map(|_| None);
        self.engine.complete(token, result)?;
        Ok(token)
    }

    fn wait(&mut self, token: CompletionToken, timeout: Duration) -> AccelResult<()> {
        self.engine.wait(token, timeout).map(|_| ())
    }

    fn is_busy(&self) -> bool {
        self.engine.outstanding.is_some()
    }

    fn reset(&mut self) -> AccelResult<()> {
        self.engine.reset();
        Ok(())
    }
}

/// Simulated DMA engine.
pub struct SimulatedTransfer {
    memory: SharedMemory,
    engine: Engine,
}

impl SimulatedTransfer {
    /// Create a simulated transfer engine over the given local memory.
    pub fn new(memory: SharedMemory) -> Self {
        Self {
            memory,
            engine: Engine::new("transfer"),
        }
    }

    /// The next submitted transfer completes with an error status.
    pub fn fail_next(&mut self, reason: impl Into<String>) {
        self.engine.fault = Fault::ErrorCompletion(reason.into());
    }

    /// The next submitted transfer never raises its completion.
    pub fn lose_next_completion(&mut self) {
        self.engine.fault = Fault::LostCompletion;
    }

    /// Number of transfers accepted so far.
    pub fn submitted(&self) -> u64 {
        self.engine.submitted
    }

    fn execute(&self, transfer: TransferDescriptor) -> AccelResult<Vec<IQSample>> {
        let TransferDescriptor {
            source,
            layout,
            mut destination,
        } = transfer;
        if destination.len() != source.len {
            return Err(AccelError::BufferSizeMismatch {
                expected: source.len,
                actual: destination.len(),
            });
        }
        let mem = memory::lock(&self.memory)?;
        let src = mem.region(&source)?;
        match layout {
            TransferLayout::Contiguous => destination.copy_from_slice(src),
            TransferLayout::Transpose { rows, cols } => {
                if rows * cols != source.len {
                    return Err(AccelError::BufferSizeMismatch {
                        expected: source.len,
                        actual: rows * cols,
                    });
                }
                for r in 0..rows {
                    for c in 0..cols {
                        destination[c * rows + r] = src[r * cols + c];
                    }
                }
            }
        }
        Ok(destination)
    }
}

impl Transfer for SimulatedTransfer {
    fn submit(&mut self, transfer: TransferDescriptor) -> AccelResult<CompletionToken> {
        let token = self.engine.claim()?;
        debug!(%token, len = transfer.source.len, "transfer submitted");
        let result = self.execute(transfer).map(Some);
        self.engine.complete(token, result)?;
        Ok(token)
    }

    fn wait(&mut self, token: CompletionToken, timeout: Duration) -> AccelResult<Vec<IQSample>> {
        let completion = self.engine.wait(token, timeout)?;
        completion.payload.ok_or(AccelError::Fault {
            engine: "transfer",
            reason: "completion carried no payload".to_string(),
        })
    }

    fn is_busy(&self) -> bool {
        self.engine.outstanding.is_some()
    }

    fn reset(&mut self) -> AccelResult<()> {
        self.engine.reset();
        Ok(())
    }
}
