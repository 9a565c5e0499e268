//! Allocator with scripted exhaustion

use core::sync::atomic::{AtomicU64, Ordering};

use ce_dma::{BufferAllocator, DmaError, HeapAllocator, Result};
use spin::Mutex;

use crate::FaultPlan;

/// Heap allocator whose failures follow a `FaultPlan`
#[derive(Debug, Default)]
pub struct FaultyAllocator {
    plan: Mutex<FaultPlan>,
    allocations: AtomicU64,
    failures: AtomicU64,
}

impl FaultyAllocator {
    /// Create an allocator that never fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the failure plan
    pub fn set_plan(&self, plan: FaultPlan) {
        *self.plan.lock() = plan;
    }

    /// Stop injecting failures
    pub fn restore(&self) {
        self.set_plan(FaultPlan::NONE);
    }

    /// Get the number of successful allocations
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Get the number of injected failures
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

impl BufferAllocator for FaultyAllocator {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>> {
        if self.plan.lock().should_fail() {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(DmaError::OutOfMemory { requested: size });
        }
        let block = HeapAllocator.allocate(size)?;
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }
}
