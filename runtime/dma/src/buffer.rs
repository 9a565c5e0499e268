//! Transfer buffer
//!
//! # State Machine
//! ```text
//!   acquire() ──> UNMAPPED ──map()──> MAPPED (posted / awaiting completion)
//!                    ▲                   │
//!                    └──────unmap()──────┘
//! ```
//!
//! INVARIANT: the CPU never touches the contents of a MAPPED buffer.

use crate::{BufferAllocator, DmaDirection, DmaMapper, DmaTag, MappedHandle, Result};

/// Owned memory block with its transport mapping and valid data length
pub struct TransferBuffer {
    data: Box<[u8]>,
    len: usize,
    mapping: Option<MappedHandle>,
}

impl TransferBuffer {
    /// Acquire an empty buffer of `size` bytes
    ///
    /// # Errors
    /// Returns `DmaError::OutOfMemory` if the allocator is exhausted
    pub fn acquire(allocator: &dyn BufferAllocator, size: usize) -> Result<Self> {
        let data = allocator.allocate(size)?;
        Ok(Self {
            data,
            len: 0,
            mapping: None,
        })
    }

    /// Wrap an outgoing payload; the whole vector is valid data
    pub fn from_vec(payload: Vec<u8>) -> Self {
        let len = payload.len();
        Self {
            data: payload.into_boxed_slice(),
            len,
            mapping: None,
        }
    }

    /// Map the buffer for `direction`, returning the bus address
    ///
    /// Device-write mappings cover the whole capacity; device-read mappings
    /// cover only the valid bytes.
    ///
    /// # Panics
    /// Panics if the buffer is already mapped.
    ///
    /// # Errors
    /// Propagates the mapper's error; the buffer stays unmapped.
    pub fn map(
        &mut self,
        mapper: &dyn DmaMapper,
        tag: &DmaTag,
        direction: DmaDirection,
    ) -> Result<u64> {
        assert!(
            self.mapping.is_none(),
            "BUG: transfer buffer mapped twice"
        );

        let region = match direction {
            DmaDirection::FromDevice => &self.data[..],
            DmaDirection::ToDevice => &self.data[..self.len],
        };
        let handle = mapper.map(tag, region, direction)?;
        let bus_addr = handle.bus_addr();
        self.mapping = Some(handle);
        Ok(bus_addr)
    }

    /// Release the mapping
    ///
    /// # Panics
    /// Panics if the buffer is not mapped (double unmap).
    pub fn unmap(&mut self, mapper: &dyn DmaMapper) {
        match self.mapping.take() {
            Some(handle) => mapper.unmap(handle),
            None => panic!("BUG: double unmap of transfer buffer"),
        }
    }

    /// Get the live mapping, if any
    pub fn mapping(&self) -> Option<&MappedHandle> {
        self.mapping.as_ref()
    }

    /// Get the device-visible address while mapped
    pub fn bus_addr(&self) -> Option<u64> {
        self.mapping.as_ref().map(MappedHandle::bus_addr)
    }

    /// Check if the buffer is currently mapped
    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Get buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Get the number of valid bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer holds no valid data
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the number of valid bytes (receive completion)
    ///
    /// # Panics
    /// Panics if `len` exceeds the capacity.
    pub fn set_len(&mut self, len: usize) {
        assert!(
            len <= self.capacity(),
            "BUG: valid length {} exceeds buffer capacity {}",
            len,
            self.capacity()
        );
        self.len = len;
    }

    /// Get the valid bytes
    ///
    /// # Panics
    /// Panics while the device owns the buffer.
    pub fn as_slice(&self) -> &[u8] {
        self.assert_cpu_owned();
        &self.data[..self.len]
    }

    /// Get the whole capacity for filling
    ///
    /// # Panics
    /// Panics while the device owns the buffer.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.assert_cpu_owned();
        &mut self.data[..]
    }

    /// Consume the buffer, returning the valid bytes
    ///
    /// # Panics
    /// Panics while the device owns the buffer.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.assert_cpu_owned();
        let len = self.len;
        let mut data = core::mem::take(&mut self.data).into_vec();
        data.truncate(len);
        data
    }

    fn assert_cpu_owned(&self) {
        assert!(
            self.mapping.is_none(),
            "BUG: cannot access transfer buffer while it is mapped for the device"
        );
    }
}

impl core::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("mapping", &self.mapping)
            .finish()
    }
}

impl Drop for TransferBuffer {
    fn drop(&mut self) {
        if let Some(handle) = &self.mapping {
            log::error!(
                "transfer buffer dropped while mapped (bus {:#x}, {} bytes), mapping leaked",
                handle.bus_addr(),
                handle.len()
            );
        }
    }
}
