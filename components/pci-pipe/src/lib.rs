//! PCI Pipe - Copy-engine pipe layer for ring-based PCI transports
//!
//! # Purpose
//! Keeps the receive rings of a device stocked with mapped buffers, hands
//! completed buffers to the consumer, and reclaims every outstanding buffer
//! on interface bring-down. Each pipe binds one copy engine to one logical
//! channel.
//!
//! # Integration Points
//! - Depends on: ce-dma (buffers, mapping), copy-engine (ring interface)
//! - Provides to: the transport layer above (HTC/HTT/WMI style consumers)
//! - Interrupt side: calls `on_send_complete`/`on_recv_complete` directly,
//!   or hands off with `schedule_service`
//!
//! # Architecture
//! - `PipeSet`: every pipe of one device behind one `spin::Mutex`
//! - `Pipe`: replenish, drain and cleanup for one ring (crate-private)
//! - Deferred lane: worker thread running the coalesced replenish retry
//!   timer and per-pipe completion service tasks
//! - `CompletionSink`: consumer callbacks, always invoked with the lock free
//! - Faults the device layer must act on (`PipeFault`) are published on a
//!   bounded channel
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ce_dma::{DmaContext, TransferBuffer};
//! use copy_engine_mock::MockCopyEngine;
//! use pci_pipe::{ChannelSink, PipeSet, PipeSetConfig};
//!
//! let set = PipeSet::alloc_pipes(
//!     PipeSetConfig::qca988x(),
//!     |i, ce| Ok(MockCopyEngine::<TransferBuffer>::new(i, ce)),
//!     DmaContext::identity(),
//! )?;
//! let (sink, completions) = ChannelSink::new();
//! set.set_sink(Arc::new(sink));
//! set.init_pipes()?;
//! set.replenish_all()?;
//! // ... interrupt side: set.schedule_service(pipe)
//! set.shutdown()?;
//! set.free_pipes();
//! # drop(completions);
//! # Ok::<(), pci_pipe::PipeError>(())
//! ```
//!
//! # Testing Strategy
//! - Unit tests: per-pipe replenish/drain/cleanup, lane coalescing, config
//! - Integration tests: full lifecycles against copy-engine-mock, retry under
//!   allocator exhaustion, teardown safety
//! - Benchmarks: replenish/drain cycle (criterion)

mod config;
mod error;
mod lane;
mod pipe;
mod set;
mod sink;
mod stats;

pub use config::{PipeSetConfig, CE_COUNT, CE_DIAG_PIPE, QCA988X_HOST_CE, RX_POST_RETRY_MS};
pub use error::{PipeError, Result, SendRejected};
pub use set::{PipeSet, PipeSetState, RecvDrain};
pub use sink::{ChannelSink, CompletionSink, Delivery, Direction};
pub use stats::{PipeFault, PipeInfo, PipeKind, PipeStats};
