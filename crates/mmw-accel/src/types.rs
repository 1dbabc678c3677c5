//! Declarative descriptors and data structures shared by accelerator backends

use num_complex::Complex64;
use std::fmt;

/// Complex sample type (compatible with mmw-core::types::IQSample)
pub type IQSample = Complex64;

/// Accelerator-local memory bank.
///
/// Each half of the ping/pong pipeline owns one ADC bank (written by input
/// capture) and one output bank (written by the accelerator, read by transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankId {
    AdcPing,
    AdcPong,
    OutPing,
    OutPong,
}

impl BankId {
    /// All banks in address order.
    pub const ALL: [BankId; 4] = [
        BankId::AdcPing,
        BankId::AdcPong,
        BankId::OutPing,
        BankId::OutPong,
    ];

    /// Index into the bank array.
    pub fn index(self) -> usize {
        match self {
            BankId::AdcPing => 0,
            BankId::AdcPong => 1,
            BankId::OutPing => 2,
            BankId::OutPong => 3,
        }
    }
}

/// A contiguous span of samples inside one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    pub bank: BankId,
    /// Offset in samples from the start of the bank
    pub offset: usize,
    /// Length in samples
    pub len: usize,
}

impl MemRegion {
    pub fn new(bank: BankId, offset: usize, len: usize) -> Self {
        Self { bank, offset, len }
    }

    /// Region covering `len` samples from the start of `bank`.
    pub fn whole(bank: BankId, len: usize) -> Self {
        Self::new(bank, 0, len)
    }

    /// One past the last sample.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Window applied before the range FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowKind {
    Rectangular,
    #[default]
    Hann,
    Blackman,
}

impl WindowKind {
    /// Window coefficient `n` of a length-`len` window.
    pub fn coefficient(self, n: usize, len: usize) -> f64 {
        if len <= 1 {
            return 1.0;
        }
        let x = 2.0 * std::f64::consts::PI * n as f64 / (len - 1) as f64;
        match self {
            WindowKind::Rectangular => 1.0,
            WindowKind::Hann => 0.5 - 0.5 * x.cos(),
            WindowKind::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
        }
    }
}

/// Operation performed by one accelerator stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageKind {
    /// Windowed FFT of each input vector.
    ///
    /// Input layout is `num_vectors` consecutive vectors of `samples_per_vector`
    /// samples; output is `num_vectors` consecutive vectors of `fft_size` bins.
    /// With `remove_dc`, the mean of each vector is subtracted before windowing.
    RangeFft {
        samples_per_vector: usize,
        fft_size: usize,
        num_vectors: usize,
        window: WindowKind,
        remove_dc: bool,
    },
    /// Plain copy, used for bring-up and loopback checks.
    Copy,
}

/// Declarative description of one accelerator stage.
///
/// No register-level detail: the backend decides how to realise it.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub input: MemRegion,
    pub output: MemRegion,
}

impl StageDescriptor {
    /// Build a range-FFT stage over `num_vectors` vectors.
    pub fn range_fft(
        input_bank: BankId,
        output_bank: BankId,
        samples_per_vector: usize,
        fft_size: usize,
        num_vectors: usize,
        window: WindowKind,
    ) -> Self {
        Self {
            kind: StageKind::RangeFft {
                samples_per_vector,
                fft_size,
                num_vectors,
                window,
                remove_dc: true,
            },
            input: MemRegion::whole(input_bank, samples_per_vector * num_vectors),
            output: MemRegion::whole(output_bank, fft_size * num_vectors),
        }
    }

    /// Short stage name for logs.
    pub fn name(&self) -> &'static str {
        match self.kind {
            StageKind::RangeFft { .. } => "range_fft",
            StageKind::Copy => "copy",
        }
    }
}

/// How a transfer lays out data in its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferLayout {
    /// Straight copy.
    Contiguous,
    /// Source is `rows × cols` row-major; destination receives it `cols × rows`.
    Transpose { rows: usize, cols: usize },
}

/// Declarative description of one transfer.
///
/// The destination buffer is moved into the descriptor and handed back by
/// `Transfer::wait`, so ownership follows the data.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferDescriptor {
    pub source: MemRegion,
    pub layout: TransferLayout,
    pub destination: Vec<IQSample>,
}

impl TransferDescriptor {
    pub fn new(source: MemRegion, layout: TransferLayout, destination: Vec<IQSample>) -> Self {
        Self {
            source,
            layout,
            destination,
        }
    }
}

/// Handle identifying one submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompletionToken(pub u64);

impl fmt::Display for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome reported by the hardware for one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionStatus {
    Done,
    Fault(String),
}

/// Message posted on the completion channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub token: CompletionToken,
    pub status: CompletionStatus,
    /// Destination buffer returned by transfers.
    pub payload: Option<Vec<IQSample>>,
}

impl Completion {
    pub fn done(token: CompletionToken) -> Self {
        Self {
            token,
            status: CompletionStatus::Done,
            payload: None,
        }
    }

    pub fn with_payload(token: CompletionToken, payload: Vec<IQSample>) -> Self {
        Self {
            token,
            status: CompletionStatus::Done,
            payload: Some(payload),
        }
    }

    pub fn fault(token: CompletionToken, reason: impl Into<String>) -> Self {
        Self {
            token,
            status: CompletionStatus::Fault(reason.into()),
            payload: None,
        }
    }
}

/// Information about the accelerator backend
#[derive(Debug, Clone)]
pub struct AccelInfo {
    /// Backend name
    pub name: String,
    /// Backend version string
    pub version: String,
    /// True for real hardware
    pub hardware: bool,
}

/// Accelerator capabilities
#[derive(Debug, Clone)]
pub struct AccelCapabilities {
    /// Maximum FFT size supported
    pub max_fft_size: usize,
    /// Number of local memory banks
    pub bank_count: usize,
    /// Capacity of each bank in samples
    pub bank_capacity: usize,
    /// Windows the FFT engine can apply
    pub windows: Vec<WindowKind>,
}
