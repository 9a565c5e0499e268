//! Copy Engine - Ring interface consumed by the pipe layer
//!
//! # Purpose
//! A copy engine is a pair of fixed-depth descriptor rings shared with the
//! target processor: a source ring (host to target) and a destination ring
//! (target to host). This crate defines the narrow interface the pipe layer
//! drives a copy engine through, and the per-engine attribute table.
//!
//! # Integration Points
//! - Depends on: Nothing (descriptor format and register access live in the
//!   implementation)
//! - Provides to: pci-pipe
//! - Capabilities required: Device MMIO, DMA-capable descriptor memory
//!
//! # Architecture
//! Every ring slot carries an opaque transfer context owned by the ring while
//! the slot is occupied. The pipe layer never touches ring storage directly:
//! contexts go in through `post_recv`/`send`, come back through the
//! `completed_*_next` enumerators, and are reclaimed at teardown through
//! `take_context`.
//!
//! # Testing Strategy
//! - Unit tests: attribute table parsing
//! - Integration tests: copy-engine-mock implements `CopyEngine`

mod config;

use thiserror::Error;

pub use config::{CeAttr, CeConfig};

/// Ring error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("Ring full")]
    Full,

    #[error("Copy engine fault (code {code})")]
    Fault { code: i32 },

    #[error("Ring direction not configured")]
    NotConfigured,
}

pub type Result<T> = core::result::Result<T, RingError>;

/// Which of the two rings of a copy engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingKind {
    /// Host to target
    Source,
    /// Target to host
    Destination,
}

/// One completed slot, as reported by the ring
#[derive(Debug)]
pub struct Completion<C> {
    /// Transfer context the slot held; `None` for no-op slots
    pub context: Option<C>,
    /// Bytes transferred
    pub nbytes: usize,
    /// Transfer identifier given at submission
    pub transfer_id: u32,
}

/// A post the ring refused; ownership of the context returns to the caller
#[derive(Debug)]
pub struct Rejected<C> {
    pub error: RingError,
    pub context: C,
}

impl<C> Rejected<C> {
    /// Create a rejection carrying the refused context
    pub fn new(error: RingError, context: C) -> Self {
        Self { error, context }
    }
}

/// Copy engine ring pair
///
/// Implementations are not internally synchronized; the pipe layer serializes
/// every call under its own lock.
pub trait CopyEngine<C>: Send {
    /// Check if the ring of `kind` is configured
    fn has_ring(&self, kind: RingKind) -> bool;

    /// Get the number of slots in the ring of `kind` (0 if not configured)
    fn nentries(&self, kind: RingKind) -> usize;

    /// Get the number of slots in the ring of `kind` that hold no context
    fn free_slots(&self, kind: RingKind) -> usize;

    /// Post an empty receive buffer into the destination ring
    ///
    /// # Panics
    /// May panic if the destination ring is not configured.
    fn post_recv(&mut self, context: C, bus_addr: u64) -> core::result::Result<(), Rejected<C>>;

    /// Queue `nbytes` at `bus_addr` on the source ring
    ///
    /// # Panics
    /// May panic if the source ring is not configured.
    fn send(
        &mut self,
        context: C,
        bus_addr: u64,
        nbytes: usize,
        transfer_id: u32,
    ) -> core::result::Result<(), Rejected<C>>;

    /// Pop the next completed source slot, in completion order
    fn completed_send_next(&mut self) -> Option<Completion<C>>;

    /// Pop the next completed destination slot, in completion order
    fn completed_recv_next(&mut self) -> Option<Completion<C>>;

    /// Clear slot `slot` of the ring of `kind`, returning its context
    fn take_context(&mut self, kind: RingKind, slot: usize) -> Option<C>;

    /// Program the engine from its attribute entry (interface bring-up)
    fn init(&mut self, config: &CeConfig) -> Result<()>;

    /// Stop the engine and release its hardware state (interface bring-down)
    fn deinit(&mut self);
}
