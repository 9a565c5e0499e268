//! DMA Transfer Buffers - Owned memory plus transport mapping
//!
//! # Purpose
//! Provides the buffer type that copy-engine pipes hand to the hardware rings,
//! together with the narrow mapping and allocation interfaces the pipe layer
//! consumes. A buffer owns its memory and, while posted, the mapping that makes
//! that memory addressable by the device.
//!
//! # Integration Points
//! - Depends on: Nothing (bus address translation is behind `DmaMapper`)
//! - Provides to: copy-engine rings (as slot context), pci-pipe
//! - Capabilities required: DMA-capable memory, bus mapping
//!
//! # Architecture
//! - `TransferBuffer`: memory block + optional `MappedHandle` + valid length
//! - `DmaMapper`: map/unmap primitive, per-pipe mapping domains (`DmaTag`)
//! - `BufferAllocator`: fallible buffer acquisition
//! - `DmaContext`: the allocator/mapper pair a pipe set operates with
//!
//! # Testing Strategy
//! - Unit tests: acquire/map/unmap lifecycle, programming-error panics
//! - Integration tests: exercised through pci-pipe with mock mappers

mod allocator;
mod buffer;
mod mapper;

use std::sync::Arc;

use thiserror::Error;

pub use allocator::{BufferAllocator, HeapAllocator};
pub use buffer::TransferBuffer;
pub use mapper::{DmaDirection, DmaMapper, DmaTag, IdentityMapper, MappedHandle};

/// DMA error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DmaError {
    #[error("Out of memory (requested: {requested} bytes)")]
    OutOfMemory { requested: usize },

    #[error("DMA mapping failed: {reason}")]
    MappingFailed { reason: String },

    #[error("Transfer of {requested} bytes exceeds mapping domain limit of {max} bytes")]
    TagExhausted { requested: usize, max: usize },
}

pub type Result<T> = core::result::Result<T, DmaError>;

/// Allocator and mapper a pipe set acquires and maps buffers with
#[derive(Clone)]
pub struct DmaContext {
    allocator: Arc<dyn BufferAllocator>,
    mapper: Arc<dyn DmaMapper>,
}

impl DmaContext {
    /// Create a context from an allocator and a mapper
    pub fn new(allocator: Arc<dyn BufferAllocator>, mapper: Arc<dyn DmaMapper>) -> Self {
        Self { allocator, mapper }
    }

    /// Heap allocation with identity bus mapping (hosts without an IOMMU)
    pub fn identity() -> Self {
        Self::new(Arc::new(HeapAllocator), Arc::new(IdentityMapper::new()))
    }

    /// Get the buffer allocator
    pub fn allocator(&self) -> &dyn BufferAllocator {
        self.allocator.as_ref()
    }

    /// Get the mapping primitive
    pub fn mapper(&self) -> &dyn DmaMapper {
        self.mapper.as_ref()
    }

    /// Acquire a buffer of `size` bytes and map it in one step
    ///
    /// Returns the buffer with its bus address. If the mapping fails the
    /// freshly acquired memory is released before the error is returned;
    /// the caller never owns a half-set-up buffer.
    pub fn acquire_mapped(
        &self,
        tag: &DmaTag,
        size: usize,
        direction: DmaDirection,
    ) -> Result<(TransferBuffer, u64)> {
        let mut buf = TransferBuffer::acquire(self.allocator(), size)?;
        let bus_addr = buf.map(self.mapper(), tag, direction)?;
        Ok((buf, bus_addr))
    }
}

impl core::fmt::Debug for DmaContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaContext").finish_non_exhaustive()
    }
}
