//! DMA mapping primitive
//!
//! A mapping makes host memory addressable by the device for one direction of
//! transfer. Mappings are created inside a mapping domain (`DmaTag`) which
//! bounds the largest transfer a pipe may ever map.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::{DmaError, Result};

/// Direction of a transfer, from the device's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaDirection {
    /// Device reads the memory (transmit)
    ToDevice,
    /// Device writes the memory (receive)
    FromDevice,
}

/// Per-pipe mapping domain
///
/// Created once per pipe at attach time, destroyed at detach.
#[derive(Debug, PartialEq, Eq)]
pub struct DmaTag {
    id: u64,
    max_size: usize,
}

impl DmaTag {
    /// Create a tag description; mappers hand these out from `create_tag`
    pub fn new(id: u64, max_size: usize) -> Self {
        Self { id, max_size }
    }

    /// Get the tag identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the maximum transfer size mappable in this domain
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Live mapping of one buffer
///
/// Not `Clone`: a handle is consumed by `DmaMapper::unmap`, so the same
/// mapping cannot be released twice through safe code.
#[derive(Debug, PartialEq, Eq)]
pub struct MappedHandle {
    bus_addr: u64,
    len: usize,
    direction: DmaDirection,
    cookie: u64,
}

impl MappedHandle {
    /// Create a handle; called by `DmaMapper` implementations
    pub fn new(bus_addr: u64, len: usize, direction: DmaDirection, cookie: u64) -> Self {
        Self {
            bus_addr,
            len,
            direction,
            cookie,
        }
    }

    /// Get the device-visible bus address
    pub fn bus_addr(&self) -> u64 {
        self.bus_addr
    }

    /// Get the mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the mapping covers no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the transfer direction
    pub fn direction(&self) -> DmaDirection {
        self.direction
    }

    /// Get the mapper-private identifier of this mapping
    pub fn cookie(&self) -> u64 {
        self.cookie
    }
}

/// Bus mapping primitive consumed by the pipe layer
pub trait DmaMapper: Send + Sync {
    /// Create a mapping domain for transfers of up to `max_size` bytes
    fn create_tag(&self, max_size: usize) -> Result<DmaTag>;

    /// Destroy a mapping domain; no mapping created in it may still be live
    fn destroy_tag(&self, tag: DmaTag);

    /// Map `region` for `direction` inside `tag`
    ///
    /// # Errors
    /// - `DmaError::TagExhausted` if `region` is larger than the domain allows
    /// - `DmaError::MappingFailed` if the bus cannot address the memory
    fn map(&self, tag: &DmaTag, region: &[u8], direction: DmaDirection) -> Result<MappedHandle>;

    /// Release a mapping
    fn unmap(&self, handle: MappedHandle);
}

/// Mapper for identity-mapped hosts: the bus address is the CPU address
#[derive(Debug, Default)]
pub struct IdentityMapper {
    next_tag: AtomicU64,
    next_cookie: AtomicU64,
}

impl IdentityMapper {
    /// Create a new identity mapper
    pub fn new() -> Self {
        Self::default()
    }
}

impl DmaMapper for IdentityMapper {
    fn create_tag(&self, max_size: usize) -> Result<DmaTag> {
        let id = self.next_tag.fetch_add(1, Ordering::Relaxed);
        Ok(DmaTag::new(id, max_size))
    }

    fn destroy_tag(&self, tag: DmaTag) {
        log::trace!("dma tag {} destroyed", tag.id());
    }

    fn map(&self, tag: &DmaTag, region: &[u8], direction: DmaDirection) -> Result<MappedHandle> {
        if region.len() > tag.max_size() {
            return Err(DmaError::TagExhausted {
                requested: region.len(),
                max: tag.max_size(),
            });
        }

        let cookie = self.next_cookie.fetch_add(1, Ordering::Relaxed);
        Ok(MappedHandle::new(
            region.as_ptr() as u64,
            region.len(),
            direction,
            cookie,
        ))
    }

    fn unmap(&self, _handle: MappedHandle) {}
}
