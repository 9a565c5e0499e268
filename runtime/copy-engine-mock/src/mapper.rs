//! Mapper that tracks every live mapping

use std::collections::HashSet;

use ce_dma::{DmaDirection, DmaError, DmaMapper, DmaTag, MappedHandle, Result};
use spin::Mutex;

use crate::FaultPlan;

/// Base of the fake bus address window
const BUS_BASE: u64 = 0x8000_0000;

#[derive(Debug, Default)]
struct MapperState {
    next_tag: u64,
    next_cookie: u64,
    live_tags: HashSet<u64>,
    live: HashSet<u64>,
    maps: u64,
    unmaps: u64,
    plan: FaultPlan,
}

/// Mock bus mapper
///
/// Hands out synthetic bus addresses, remembers which mappings and tags are
/// live, and panics when asked to release something it never handed out.
#[derive(Debug, Default)]
pub struct MockMapper {
    state: Mutex<MapperState>,
}

impl MockMapper {
    /// Create a mapper that never fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the failure plan for `map`
    pub fn set_plan(&self, plan: FaultPlan) {
        self.state.lock().plan = plan;
    }

    /// Stop injecting failures
    pub fn restore(&self) {
        self.set_plan(FaultPlan::NONE);
    }

    /// Get the number of mappings currently live
    pub fn live_mappings(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Get the number of mapping domains currently live
    pub fn live_tags(&self) -> usize {
        self.state.lock().live_tags.len()
    }

    /// Get the number of successful maps
    pub fn maps(&self) -> u64 {
        self.state.lock().maps
    }

    /// Get the number of unmaps
    pub fn unmaps(&self) -> u64 {
        self.state.lock().unmaps
    }
}

impl DmaMapper for MockMapper {
    fn create_tag(&self, max_size: usize) -> Result<DmaTag> {
        let mut state = self.state.lock();
        state.next_tag += 1;
        let id = state.next_tag;
        state.live_tags.insert(id);
        Ok(DmaTag::new(id, max_size))
    }

    fn destroy_tag(&self, tag: DmaTag) {
        let removed = self.state.lock().live_tags.remove(&tag.id());
        assert!(removed, "BUG: destroying unknown dma tag {}", tag.id());
    }

    fn map(&self, tag: &DmaTag, region: &[u8], direction: DmaDirection) -> Result<MappedHandle> {
        let mut state = self.state.lock();
        assert!(
            state.live_tags.contains(&tag.id()),
            "BUG: mapping through destroyed dma tag {}",
            tag.id()
        );

        if state.plan.should_fail() {
            return Err(DmaError::MappingFailed {
                reason: "injected mapping failure".into(),
            });
        }
        if region.len() > tag.max_size() {
            return Err(DmaError::TagExhausted {
                requested: region.len(),
                max: tag.max_size(),
            });
        }

        state.next_cookie += 1;
        let cookie = state.next_cookie;
        state.live.insert(cookie);
        state.maps += 1;

        let bus_addr = BUS_BASE + cookie * 0x1_0000;
        Ok(MappedHandle::new(bus_addr, region.len(), direction, cookie))
    }

    fn unmap(&self, handle: MappedHandle) {
        let mut state = self.state.lock();
        let removed = state.live.remove(&handle.cookie());
        assert!(removed, "BUG: unmapping unknown mapping {:#x}", handle.bus_addr());
        state.unmaps += 1;
    }
}
