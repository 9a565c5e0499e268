//! MOCK copy engine backends for host-side development
//!
//! # WARNING: This is NOT hardware!
//!
//! These backends stand in for the copy-engine rings, the bus mapper and the
//! buffer allocator so the pipe layer can be exercised on any host. They keep
//! the same ownership rules as the real collaborators and add hooks to
//! inject completions and failures.
//!
//! ## Provided Backends
//!
//! - `MockCopyEngine`: source/destination rings with per-slot contexts;
//!   a cloned handle shares state, so a test keeps one clone to drive
//!   completions while the pipe set owns the other
//! - `MockMapper`: tracks live mappings and tags, panics on unknown unmaps
//! - `FaultyAllocator`: heap allocator with scripted exhaustion
//!
//! ## Fault Injection
//!
//! Allocator and mapper share `FaultPlan`: let `skip` calls succeed, then
//! fail the next `count` calls.

mod allocator;
mod engine;
mod fault;
mod mapper;

pub use allocator::FaultyAllocator;
pub use engine::MockCopyEngine;
pub use fault::FaultPlan;
pub use mapper::MockMapper;
