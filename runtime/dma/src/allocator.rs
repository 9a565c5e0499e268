//! Buffer allocation
//!
//! Receive replenishment runs from interrupt and timer context and must never
//! block on memory, so acquisition is fallible and the failure is reported
//! rather than retried here.

use crate::{DmaError, Result};

/// Source of transfer buffer memory
pub trait BufferAllocator: Send + Sync {
    /// Allocate a zeroed block of exactly `size` bytes
    ///
    /// # Errors
    /// Returns `DmaError::OutOfMemory` if the memory is not available now
    fn allocate(&self, size: usize) -> Result<Box<[u8]>>;
}

/// Global heap allocator that reports exhaustion instead of aborting
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>> {
        let mut block = Vec::new();
        block
            .try_reserve_exact(size)
            .map_err(|_| DmaError::OutOfMemory { requested: size })?;
        block.resize(size, 0);
        Ok(block.into_boxed_slice())
    }
}
