//! Pipe error types

use ce_dma::{DmaError, TransferBuffer};
use copy_engine::{RingError, RingKind};
use thiserror::Error;

use crate::PipeSetState;

/// Pipe layer error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    #[error("Out of memory (requested: {requested} bytes)")]
    OutOfMemory { requested: usize },

    #[error("DMA mapping failed: {reason}")]
    MappingFailed { reason: String },

    #[error("Pipe {pipe}: ring full")]
    RingFull { pipe: usize },

    #[error("Pipe {pipe}: copy engine fault (code {code})")]
    RingFault { pipe: usize, code: i32 },

    #[error("Pipe {pipe}: {kind:?} ring not configured")]
    NoRing { pipe: usize, kind: RingKind },

    #[error("Invalid pipe {pipe} (pipe count {count})")]
    InvalidPipe { pipe: usize, count: usize },

    #[error("Pipe {pipe} is a pass-through channel (no buffers)")]
    PassThrough { pipe: usize },

    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Cannot {op} while {from:?}")]
    InvalidTransition { from: PipeSetState, op: &'static str },

    #[error("Pipe set is not active ({state:?})")]
    NotActive { state: PipeSetState },

    #[error("Invalid pipe configuration: {0}")]
    Config(String),

    #[error("Failed to spawn deferred task lane: {0}")]
    TaskSpawn(String),

    #[error("Failed to initialize copy engine pipe {pipe}: {source}")]
    RingInit {
        pipe: usize,
        #[source]
        source: RingError,
    },

    #[error("Failed to allocate copy engine pipe {pipe}: {source}")]
    RingAlloc {
        pipe: usize,
        #[source]
        source: RingError,
    },

    #[error("Failed to create DMA tag for pipe {pipe}: {source}")]
    TagAlloc {
        pipe: usize,
        #[source]
        source: DmaError,
    },
}

pub type Result<T> = core::result::Result<T, PipeError>;

impl PipeError {
    /// Attribute a rejection by the `kind` ring of `pipe`
    pub fn ring(pipe: usize, kind: RingKind, error: RingError) -> Self {
        match error {
            RingError::Full => PipeError::RingFull { pipe },
            RingError::Fault { code } => PipeError::RingFault { pipe, code },
            RingError::NotConfigured => PipeError::NoRing { pipe, kind },
        }
    }

    /// Check if the condition clears by itself and is handled by the retry timer
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipeError::OutOfMemory { .. }
                | PipeError::MappingFailed { .. }
                | PipeError::RingFull { .. }
        )
    }
}

impl From<DmaError> for PipeError {
    fn from(error: DmaError) -> Self {
        match error {
            DmaError::OutOfMemory { requested } => PipeError::OutOfMemory { requested },
            DmaError::MappingFailed { reason } => PipeError::MappingFailed { reason },
            DmaError::TagExhausted { requested, max } => PipeError::PayloadTooLarge {
                len: requested,
                max,
            },
        }
    }
}

/// A transmit the pipe layer refused; the buffer is handed back unmapped
#[derive(Debug, Error)]
#[error("send on pipe {pipe} rejected: {error}")]
pub struct SendRejected {
    pub pipe: usize,
    #[source]
    pub error: PipeError,
    pub buffer: TransferBuffer,
}
