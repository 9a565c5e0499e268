//! Per-pipe counters and the fault events surfaced to the device layer

use copy_engine::CeAttr;

/// Per-pipe counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeStats {
    /// Receive buffers posted into the destination ring
    pub rx_posted: u64,
    /// Receive buffers handed to the sink
    pub rx_delivered: u64,
    /// Receive completions larger than their buffer, discarded
    pub rx_oversize_dropped: u64,
    /// Receive buffers freed at cleanup
    pub rx_freed: u64,
    /// Transmit buffers queued on the source ring
    pub tx_submitted: u64,
    /// Transmit completions handed to the sink
    pub tx_completed: u64,
    /// Outstanding transmit buffers returned at cleanup
    pub tx_flushed: u64,
    /// Replenish passes stopped early by a recoverable failure
    pub replenish_failures: u64,
    /// Times a failure on this pipe armed the retry timer
    pub retry_arms: u64,
}

/// Condition the device layer must decide about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeFault {
    /// Target reported more receive data than the buffer holds
    ProtocolViolation {
        pipe: usize,
        nbytes: usize,
        capacity: usize,
    },
    /// Ring refused a post with an internal fault
    RingFault { pipe: usize, code: i32 },
}

impl PipeFault {
    /// Get the pipe the fault was seen on
    pub fn pipe(&self) -> usize {
        match *self {
            PipeFault::ProtocolViolation { pipe, .. } | PipeFault::RingFault { pipe, .. } => pipe,
        }
    }
}

/// Role of a pipe, derived from its table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeKind {
    /// Host to target only
    Transmit,
    /// Target to host only
    Receive,
    /// Both rings configured
    Duplex,
    /// Diagnostic window; never posts or cleans buffers
    Diagnostic,
    /// No rings
    Unused,
}

/// Static description of one pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeInfo {
    pub id: usize,
    pub kind: PipeKind,
    /// Buffer size; 0 for pass-through pipes
    pub buf_sz: usize,
    pub src_nentries: usize,
    pub dest_nentries: usize,
    pub flags: CeAttr,
}
