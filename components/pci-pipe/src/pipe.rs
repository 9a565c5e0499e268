//! One copy-engine pipe
//!
//! Buffer ownership per pipe:
//! ```text
//!   acquire+map ──> posted (slot context) ──completion──> unmapped ──> sink
//!                        │                                   │
//!                        └── cleanup: take_context, unmap ───┴──> dropped (rx)
//!                                                            └──> sink (tx)
//! ```
//!
//! Every function here runs under the pipe set lock.

use ce_dma::{DmaContext, DmaDirection, DmaTag, TransferBuffer};
use copy_engine::{CeConfig, CopyEngine, Rejected, RingKind};

use crate::{PipeError, PipeFault, PipeInfo, PipeKind, PipeStats, Result};

/// Outcome of one replenish pass
#[derive(Debug)]
pub(crate) struct Replenish {
    pub posted: usize,
    /// First failure; the pass stopped there
    pub failure: Option<PipeError>,
}

pub(crate) struct Pipe<R> {
    id: usize,
    kind: PipeKind,
    buf_sz: usize,
    config: CeConfig,
    ring: R,
    tag: Option<DmaTag>,
    pub(crate) stats: PipeStats,
}

impl<R: CopyEngine<TransferBuffer>> Pipe<R> {
    /// Bind a freshly allocated ring to pipe `id`
    ///
    /// Pass-through pipes (`diag` or no buffer size) get no mapping domain.
    pub(crate) fn new(
        id: usize,
        config: CeConfig,
        ring: R,
        diag: bool,
        dma: &DmaContext,
    ) -> Result<Self> {
        let buf_sz = if diag { 0 } else { config.src_sz_max };
        let tag = if buf_sz > 0 {
            let tag = dma
                .mapper()
                .create_tag(buf_sz)
                .map_err(|source| PipeError::TagAlloc { pipe: id, source })?;
            Some(tag)
        } else {
            None
        };

        let kind = match (diag, config.src_nentries > 0, config.dest_nentries > 0) {
            (true, _, _) => PipeKind::Diagnostic,
            (false, true, true) => PipeKind::Duplex,
            (false, true, false) => PipeKind::Transmit,
            (false, false, true) => PipeKind::Receive,
            (false, false, false) => PipeKind::Unused,
        };

        Ok(Self {
            id,
            kind,
            buf_sz,
            config,
            ring,
            tag,
            stats: PipeStats::default(),
        })
    }

    pub(crate) fn info(&self) -> PipeInfo {
        PipeInfo {
            id: self.id,
            kind: self.kind,
            buf_sz: self.buf_sz,
            src_nentries: self.ring.nentries(RingKind::Source),
            dest_nentries: self.ring.nentries(RingKind::Destination),
            flags: self.config.flags,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn buf_sz(&self) -> usize {
        self.buf_sz
    }

    fn posts_receive(&self) -> bool {
        self.buf_sz > 0 && self.ring.has_ring(RingKind::Destination)
    }

    /// Post one receive buffer
    ///
    /// No-op for pass-through pipes and pipes without a destination ring.
    pub(crate) fn replenish_one(&mut self, dma: &DmaContext) -> Result<()> {
        if !self.posts_receive() {
            return Ok(());
        }
        let Some(tag) = self.tag.as_ref() else {
            return Ok(());
        };

        let (buf, bus_addr) = dma.acquire_mapped(tag, self.buf_sz, DmaDirection::FromDevice)?;

        match self.ring.post_recv(buf, bus_addr) {
            Ok(()) => {
                self.stats.rx_posted += 1;
                Ok(())
            }
            Err(Rejected { error, context: mut buf }) => {
                buf.unmap(dma.mapper());
                Err(PipeError::ring(self.id, RingKind::Destination, error))
            }
        }
    }

    /// Fill every free destination slot, stopping at the first failure
    pub(crate) fn replenish(&mut self, dma: &DmaContext) -> Replenish {
        let mut done = Replenish {
            posted: 0,
            failure: None,
        };
        if !self.posts_receive() {
            return done;
        }

        let free = self.ring.free_slots(RingKind::Destination);
        for _ in 0..free {
            if let Err(e) = self.replenish_one(dma) {
                done.failure = Some(e);
                break;
            }
            done.posted += 1;
        }
        done
    }

    /// Reap every completed receive slot into `batch`
    ///
    /// Oversized completions are dropped and reported in `faults`.
    pub(crate) fn drain_recv(
        &mut self,
        dma: &DmaContext,
        batch: &mut Vec<TransferBuffer>,
        faults: &mut Vec<PipeFault>,
    ) {
        while let Some(done) = self.ring.completed_recv_next() {
            let Some(mut buf) = done.context else {
                continue;
            };
            buf.unmap(dma.mapper());

            if done.nbytes > buf.capacity() {
                log::warn!(
                    "pipe {}: rxed more than expected (nbytes {}, max {})",
                    self.id,
                    done.nbytes,
                    buf.capacity()
                );
                self.stats.rx_oversize_dropped += 1;
                faults.push(PipeFault::ProtocolViolation {
                    pipe: self.id,
                    nbytes: done.nbytes,
                    capacity: buf.capacity(),
                });
                continue;
            }

            buf.set_len(done.nbytes);
            batch.push(buf);
        }
    }

    /// Reap every completed transmit slot into `batch`
    pub(crate) fn drain_send(&mut self, dma: &DmaContext, batch: &mut Vec<TransferBuffer>) {
        while let Some(done) = self.ring.completed_send_next() {
            let Some(mut buf) = done.context else {
                continue;
            };
            buf.unmap(dma.mapper());
            batch.push(buf);
        }
    }

    /// Queue an outgoing buffer on the source ring
    ///
    /// On failure the buffer comes back unmapped with the error.
    pub(crate) fn send(
        &mut self,
        dma: &DmaContext,
        mut buf: TransferBuffer,
        transfer_id: u32,
    ) -> core::result::Result<(), (PipeError, TransferBuffer)> {
        let pipe = self.id;
        let tag = match self.tag.as_ref() {
            Some(tag) if self.buf_sz > 0 => tag,
            _ => return Err((PipeError::PassThrough { pipe }, buf)),
        };
        if !self.ring.has_ring(RingKind::Source) {
            return Err((
                PipeError::NoRing {
                    pipe,
                    kind: RingKind::Source,
                },
                buf,
            ));
        }
        if buf.len() > self.buf_sz {
            let err = PipeError::PayloadTooLarge {
                len: buf.len(),
                max: self.buf_sz,
            };
            return Err((err, buf));
        }

        let nbytes = buf.len();
        let bus_addr = match buf.map(dma.mapper(), tag, DmaDirection::ToDevice) {
            Ok(addr) => addr,
            Err(e) => return Err((e.into(), buf)),
        };

        match self.ring.send(buf, bus_addr, nbytes, transfer_id) {
            Ok(()) => {
                self.stats.tx_submitted += 1;
                Ok(())
            }
            Err(Rejected { error, context: mut buf }) => {
                buf.unmap(dma.mapper());
                Err((PipeError::ring(pipe, RingKind::Source, error), buf))
            }
        }
    }

    pub(crate) fn free_send_slots(&self) -> usize {
        self.ring.free_slots(RingKind::Source)
    }

    /// Free every receive buffer still held by the destination ring
    pub(crate) fn cleanup_recv(&mut self, dma: &DmaContext) {
        if self.buf_sz == 0 || !self.ring.has_ring(RingKind::Destination) {
            return;
        }

        for slot in 0..self.ring.nentries(RingKind::Destination) {
            if let Some(mut buf) = self.ring.take_context(RingKind::Destination, slot) {
                buf.unmap(dma.mapper());
                self.stats.rx_freed += 1;
            }
        }
    }

    /// Take back every transmit buffer still held by the source ring
    pub(crate) fn cleanup_send(&mut self, dma: &DmaContext, batch: &mut Vec<TransferBuffer>) {
        if self.buf_sz == 0 || !self.ring.has_ring(RingKind::Source) {
            return;
        }

        for slot in 0..self.ring.nentries(RingKind::Source) {
            if let Some(mut buf) = self.ring.take_context(RingKind::Source, slot) {
                buf.unmap(dma.mapper());
                self.stats.tx_flushed += 1;
                batch.push(buf);
            }
        }
    }

    pub(crate) fn init(&mut self) -> copy_engine::Result<()> {
        self.ring.init(&self.config)
    }

    pub(crate) fn deinit(&mut self) {
        self.ring.deinit();
    }

    /// Release the mapping domain; the ring goes with the pipe
    pub(crate) fn release(mut self, dma: &DmaContext) {
        if let Some(tag) = self.tag.take() {
            dma.mapper().destroy_tag(tag);
        }
    }
}
