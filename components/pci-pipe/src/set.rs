//! Pipe set
//!
//! # State Machine
//! ```text
//!   alloc_pipes ──> Deinitialized ──init_pipes──> Active
//!                        ▲                          │ kill_tasks
//!                        │                          ▼
//!                    ce_deinit                  TasksKilled
//!                        │                          │ buffer_cleanup
//!                        └────── BuffersDrained <───┘
//! ```
//!
//! # Locking
//! One `spin::Mutex` guards every pipe, the state and the sink. It is held
//! for a whole replenish or drain pass and released before any sink call and
//! before waiting on the deferred lane.

use core::time::Duration;
use std::sync::{Arc, Weak};

use ce_dma::{DmaContext, TransferBuffer};
use copy_engine::{CopyEngine, RingError};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use spin::Mutex;

use crate::lane::{DeferredLane, DeferredWork};
use crate::pipe::Pipe;
use crate::{
    CompletionSink, PipeError, PipeFault, PipeInfo, PipeSetConfig, PipeStats, Result, SendRejected,
};

/// Depth of the fault channel; older events are kept, newer ones dropped
const FAULT_QUEUE_DEPTH: usize = 64;

/// Lifecycle of a pipe set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeSetState {
    /// Rings programmed, buffers flowing
    Active,
    /// Retry timer and completion tasks stopped
    TasksKilled,
    /// No buffer left in any ring
    BuffersDrained,
    /// Rings released; pipes kept for the next bring-up
    Deinitialized,
}

/// Result of one receive drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecvDrain {
    /// Buffers handed to `receive_done`
    pub delivered: usize,
    /// Oversized completions discarded
    pub discarded: usize,
    /// Completed buffers released because no sink was installed
    pub unclaimed: usize,
    /// Buffers posted by the follow-up replenish
    pub reposted: usize,
}

struct PipeTable<R> {
    pipes: Vec<Pipe<R>>,
    state: PipeSetState,
    sink: Option<Arc<dyn CompletionSink>>,
    released: bool,
}

impl<R> PipeTable<R> {
    fn pipe_mut(&mut self, pipe: usize) -> Result<&mut Pipe<R>> {
        let count = self.pipes.len();
        self.pipes
            .get_mut(pipe)
            .ok_or(PipeError::InvalidPipe { pipe, count })
    }

    fn pipe(&self, pipe: usize) -> Result<&Pipe<R>> {
        let count = self.pipes.len();
        self.pipes.get(pipe).ok_or(PipeError::InvalidPipe { pipe, count })
    }

    fn require_active(&self) -> Result<()> {
        match self.state {
            PipeSetState::Active => Ok(()),
            state => Err(PipeError::NotActive { state }),
        }
    }
}

struct Inner<R> {
    table: Mutex<PipeTable<R>>,
    dma: DmaContext,
    lane: DeferredLane,
    retry_delay: Duration,
    faults_tx: Sender<PipeFault>,
    faults_rx: Receiver<PipeFault>,
}

/// All pipes of one device
///
/// Created at device attach with [`PipeSet::alloc_pipes`], brought up with
/// [`PipeSet::init_pipes`], brought down with [`PipeSet::shutdown`] and
/// released with [`PipeSet::free_pipes`] (or by dropping it).
pub struct PipeSet<R: CopyEngine<TransferBuffer> + 'static> {
    inner: Arc<Inner<R>>,
}

impl<R: CopyEngine<TransferBuffer> + 'static> PipeSet<R> {
    /// Allocate every pipe of `config` (device attach)
    ///
    /// # Arguments
    /// * `config` - Copy engine table
    /// * `alloc_ring` - Allocates the ring of engine `i` from its table entry
    /// * `dma` - Allocator and mapper buffers are acquired with
    ///
    /// # Errors
    /// Returns `RingAlloc`/`TagAlloc` for the first pipe that cannot be set
    /// up; pipes allocated before it are released.
    pub fn alloc_pipes<F>(config: PipeSetConfig, mut alloc_ring: F, dma: DmaContext) -> Result<Self>
    where
        F: FnMut(usize, &copy_engine::CeConfig) -> core::result::Result<R, RingError>,
    {
        config.validate()?;

        let mut pipes: Vec<Pipe<R>> = Vec::with_capacity(config.pipes.len());
        for (i, ce) in config.pipes.iter().enumerate() {
            let pipe = alloc_ring(i, ce)
                .map_err(|source| PipeError::RingAlloc { pipe: i, source })
                .and_then(|ring| Pipe::new(i, *ce, ring, config.is_diag(i), &dma));
            match pipe {
                Ok(pipe) => pipes.push(pipe),
                Err(e) => {
                    log::warn!("failed to allocate copy engine pipe {}: {}", i, e);
                    release_pipes(pipes, &dma);
                    return Err(e);
                }
            }
        }

        let lane = match DeferredLane::spawn(pipes.len()) {
            Ok(lane) => lane,
            Err(e) => {
                release_pipes(pipes, &dma);
                return Err(e);
            }
        };
        let (faults_tx, faults_rx) = channel::bounded(FAULT_QUEUE_DEPTH);

        let inner = Arc::new(Inner {
            table: Mutex::new(PipeTable {
                pipes,
                state: PipeSetState::Deinitialized,
                sink: None,
                released: false,
            }),
            dma,
            lane,
            retry_delay: config.retry_delay(),
            faults_tx,
            faults_rx,
        });
        let work: Weak<dyn DeferredWork> = Arc::downgrade(&inner) as Weak<dyn DeferredWork>;
        inner.lane.bind(work);

        log::debug!("allocated {} copy engine pipes", config.pipes.len());
        Ok(Self { inner })
    }

    /// Program every ring (interface bring-up)
    ///
    /// # Errors
    /// - `InvalidTransition` unless `Deinitialized`
    /// - `RingInit` for the first ring that fails; rings programmed before
    ///   it are deinitialized again
    pub fn init_pipes(&self) -> Result<()> {
        {
            let mut table = self.inner.table.lock();
            if table.state != PipeSetState::Deinitialized || table.released {
                return Err(PipeError::InvalidTransition {
                    from: table.state,
                    op: "init_pipes",
                });
            }

            for i in 0..table.pipes.len() {
                if let Err(source) = table.pipes[i].init() {
                    log::warn!("failed to initialize copy engine pipe {}: {}", i, source);
                    for pipe in table.pipes[..i].iter_mut() {
                        pipe.deinit();
                    }
                    return Err(PipeError::RingInit { pipe: i, source });
                }
            }
            table.state = PipeSetState::Active;
        }

        self.inner.lane.enable();
        Ok(())
    }

    /// Install the completion sink
    pub fn set_sink(&self, sink: Arc<dyn CompletionSink>) {
        self.inner.table.lock().sink = Some(sink);
    }

    /// Remove the completion sink; completions are dropped until a new one is set
    pub fn clear_sink(&self) {
        self.inner.table.lock().sink = None;
    }

    /// Post one receive buffer on `pipe`, without retry handling
    pub fn replenish_one(&self, pipe: usize) -> Result<()> {
        let mut table = self.inner.table.lock();
        table.require_active()?;
        table.pipe_mut(pipe)?.replenish_one(&self.inner.dma)
    }

    /// Fill the free receive slots of `pipe`
    ///
    /// Returns the number of buffers posted. Allocation, mapping and ring-full
    /// failures arm the retry timer and are not returned.
    ///
    /// # Errors
    /// `RingFault` if the ring rejected a post with an internal fault
    pub fn replenish_pipe(&self, pipe: usize) -> Result<usize> {
        let mut table = self.inner.table.lock();
        table.require_active()?;
        self.inner.replenish_locked(&mut table, pipe)
    }

    /// Fill the free receive slots of every pipe under one critical section
    ///
    /// No-op unless `Active`. A ring fault on one pipe does not stop the
    /// others; the first one is returned.
    pub fn replenish_all(&self) -> Result<usize> {
        self.inner.replenish_all()
    }

    /// Reap completed transmits on `pipe` and hand them to the sink
    ///
    /// Returns the number of buffers delivered; without a sink they are
    /// released and 0 is returned.
    pub fn on_send_complete(&self, pipe: usize) -> Result<usize> {
        self.inner.on_send_complete(pipe)
    }

    /// Reap completed receives on `pipe`, hand them to the sink and re-post
    pub fn on_recv_complete(&self, pipe: usize) -> Result<RecvDrain> {
        self.inner.on_recv_complete(pipe)
    }

    /// Queue `buffer` for transmission on `pipe`
    ///
    /// # Errors
    /// Hands the buffer back inside `SendRejected` when the set is not active,
    /// the pipe cannot transmit, the payload exceeds the pipe buffer size,
    /// mapping fails or the ring refuses it.
    pub fn send(
        &self,
        pipe: usize,
        buffer: TransferBuffer,
        transfer_id: u32,
    ) -> core::result::Result<(), SendRejected> {
        let result = {
            let mut table = self.inner.table.lock();
            match table.require_active() {
                Err(error) => Err((error, buffer)),
                Ok(()) => match table.pipe_mut(pipe) {
                    Ok(p) => p.send(&self.inner.dma, buffer, transfer_id),
                    Err(error) => Err((error, buffer)),
                },
            }
        };

        result.map_err(|(error, buffer)| {
            if let PipeError::RingFault { pipe, code } = error {
                self.inner.publish(PipeFault::RingFault { pipe, code });
            }
            SendRejected { pipe, error, buffer }
        })
    }

    /// Get the number of free source slots of `pipe`
    pub fn free_send_slots(&self, pipe: usize) -> Result<usize> {
        Ok(self.inner.table.lock().pipe(pipe)?.free_send_slots())
    }

    /// Request completion service for `pipe` on the deferred lane
    ///
    /// Returns false if a request is already queued or tasks are killed.
    pub fn schedule_service(&self, pipe: usize) -> Result<bool> {
        self.inner.table.lock().pipe(pipe)?;
        Ok(self.inner.lane.schedule(pipe))
    }

    /// Run send then receive completion processing for `pipe`
    pub fn service_pipe(&self, pipe: usize) -> Result<()> {
        self.inner.service_pipe(pipe)
    }

    /// Stop the retry timer and every completion task, waiting for a running one
    ///
    /// # Errors
    /// None; already-stopped sets return `Ok`
    pub fn kill_tasks(&self) -> Result<()> {
        {
            let mut table = self.inner.table.lock();
            if table.state != PipeSetState::Active {
                return Ok(());
            }
            table.state = PipeSetState::TasksKilled;
        }
        self.inner.lane.kill();
        Ok(())
    }

    /// Reclaim every buffer still held by a ring
    ///
    /// Receive buffers are freed; outstanding transmit buffers go to
    /// `transmit_done`.
    ///
    /// # Errors
    /// `InvalidTransition` while `Active`
    pub fn buffer_cleanup(&self) -> Result<()> {
        let (sink, flushed) = {
            let mut table = self.inner.table.lock();
            match table.state {
                PipeSetState::TasksKilled => {}
                PipeSetState::BuffersDrained | PipeSetState::Deinitialized => return Ok(()),
                from => {
                    return Err(PipeError::InvalidTransition {
                        from,
                        op: "buffer_cleanup",
                    })
                }
            }

            let dma = &self.inner.dma;
            let mut flushed = Vec::new();
            for pipe in table.pipes.iter_mut() {
                pipe.cleanup_recv(dma);

                let mut batch = Vec::new();
                pipe.cleanup_send(dma, &mut batch);
                let id = pipe.id();
                flushed.extend(batch.into_iter().map(|buf| (id, buf)));
            }
            table.state = PipeSetState::BuffersDrained;
            (table.sink.clone(), flushed)
        };

        for (pipe, buf) in flushed {
            deliver_transmit(sink.as_deref(), pipe, buf);
        }
        Ok(())
    }

    /// Kill tasks then reclaim buffers
    pub fn flush(&self) -> Result<()> {
        self.kill_tasks()?;
        self.buffer_cleanup()
    }

    /// Release ring hardware state
    ///
    /// # Errors
    /// `InvalidTransition` unless buffers were drained
    pub fn ce_deinit(&self) -> Result<()> {
        let mut table = self.inner.table.lock();
        match table.state {
            PipeSetState::BuffersDrained => {}
            PipeSetState::Deinitialized => return Ok(()),
            from => return Err(PipeError::InvalidTransition { from, op: "ce_deinit" }),
        }
        for pipe in table.pipes.iter_mut() {
            pipe.deinit();
        }
        table.state = PipeSetState::Deinitialized;
        Ok(())
    }

    /// Full interface bring-down: flush then deinitialize rings
    pub fn shutdown(&self) -> Result<()> {
        self.flush()?;
        self.ce_deinit()
    }

    /// Release every pipe (device detach)
    pub fn free_pipes(self) {
        self.release();
    }

    fn release(&self) {
        if let Err(e) = self.shutdown() {
            log::error!("pipe teardown failed: {}", e);
        }

        let pipes = {
            let mut table = self.inner.table.lock();
            if table.released {
                return;
            }
            table.released = true;
            table.sink = None;
            core::mem::take(&mut table.pipes)
        };
        release_pipes(pipes, &self.inner.dma);
    }

    /// Get the lifecycle state
    pub fn state(&self) -> PipeSetState {
        self.inner.table.lock().state
    }

    /// Get a snapshot of the counters of `pipe`
    pub fn stats(&self, pipe: usize) -> Result<PipeStats> {
        Ok(self.inner.table.lock().pipe(pipe)?.stats)
    }

    /// Get the receiving end of the fault channel
    pub fn faults(&self) -> Receiver<PipeFault> {
        self.inner.faults_rx.clone()
    }

    /// Check if a replenish retry is pending
    pub fn retry_pending(&self) -> bool {
        self.inner.lane.retry_pending()
    }

    /// Get the number of pipes
    pub fn pipe_count(&self) -> usize {
        self.inner.table.lock().pipes.len()
    }

    /// Describe `pipe`
    pub fn pipe_info(&self, pipe: usize) -> Result<PipeInfo> {
        Ok(self.inner.table.lock().pipe(pipe)?.info())
    }
}

impl<R: CopyEngine<TransferBuffer> + 'static> Drop for PipeSet<R> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<R: CopyEngine<TransferBuffer>> Inner<R> {
    fn publish(&self, fault: PipeFault) {
        match self.faults_tx.try_send(fault) {
            Ok(()) => {}
            Err(TrySendError::Full(fault)) => {
                log::debug!("pipe {}: fault queue full, dropping {:?}", fault.pipe(), fault);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Replenish one pipe with the lock held, routing failures
    fn replenish_locked(&self, table: &mut PipeTable<R>, pipe: usize) -> Result<usize> {
        let p = table.pipe_mut(pipe)?;
        let done = p.replenish(&self.dma);

        match done.failure {
            None => Ok(done.posted),
            Some(e) if e.is_recoverable() => {
                log::warn!("failed to post pci rx buf on pipe {}: {}", pipe, e);
                p.stats.replenish_failures += 1;
                if self.lane.arm_retry(self.retry_delay) {
                    p.stats.retry_arms += 1;
                }
                Ok(done.posted)
            }
            Some(e) => {
                log::error!("pipe {}: rx post aborted: {}", pipe, e);
                if let PipeError::RingFault { pipe, code } = e {
                    self.publish(PipeFault::RingFault { pipe, code });
                }
                Err(e)
            }
        }
    }

    fn replenish_all(&self) -> Result<usize> {
        let mut table = self.table.lock();
        if table.state != PipeSetState::Active {
            log::debug!("skipping rx post while {:?}", table.state);
            return Ok(0);
        }

        let mut posted = 0;
        let mut first_fault = None;
        for pipe in 0..table.pipes.len() {
            match self.replenish_locked(&mut table, pipe) {
                Ok(n) => posted += n,
                Err(e) => {
                    first_fault.get_or_insert(e);
                }
            }
        }

        match first_fault {
            Some(e) => Err(e),
            None => Ok(posted),
        }
    }

    fn on_send_complete(&self, pipe: usize) -> Result<usize> {
        let (sink, batch) = {
            let mut table = self.table.lock();
            if table.state != PipeSetState::Active {
                return Ok(0);
            }
            let sink = table.sink.clone();
            let p = table.pipe_mut(pipe)?;
            if p.buf_sz() == 0 {
                return Ok(0);
            }
            let mut batch = Vec::new();
            p.drain_send(&self.dma, &mut batch);
            if sink.is_some() {
                p.stats.tx_completed += batch.len() as u64;
            }
            (sink, batch)
        };

        let delivered = if sink.is_some() { batch.len() } else { 0 };
        for buf in batch {
            deliver_transmit(sink.as_deref(), pipe, buf);
        }
        Ok(delivered)
    }

    fn on_recv_complete(&self, pipe: usize) -> Result<RecvDrain> {
        let (sink, batch, faults) = {
            let mut table = self.table.lock();
            if table.state != PipeSetState::Active {
                return Ok(RecvDrain::default());
            }
            let sink = table.sink.clone();
            let p = table.pipe_mut(pipe)?;
            if p.buf_sz() == 0 {
                return Ok(RecvDrain::default());
            }
            let mut batch = Vec::new();
            let mut faults = Vec::new();
            p.drain_recv(&self.dma, &mut batch, &mut faults);
            if sink.is_some() {
                p.stats.rx_delivered += batch.len() as u64;
            }
            (sink, batch, faults)
        };

        let mut drain = RecvDrain {
            discarded: faults.len(),
            ..RecvDrain::default()
        };
        match sink {
            Some(_) => drain.delivered = batch.len(),
            None => drain.unclaimed = batch.len(),
        }
        for fault in faults {
            self.publish(fault);
        }
        for buf in batch {
            match sink.as_deref() {
                Some(sink) => sink.receive_done(pipe, buf),
                None => log::warn!("pipe {}: no completion sink, dropping rx buffer", pipe),
            }
        }

        let mut table = self.table.lock();
        if table.state == PipeSetState::Active {
            drain.reposted = self.replenish_locked(&mut table, pipe)?;
        }
        Ok(drain)
    }

    fn service_pipe(&self, pipe: usize) -> Result<()> {
        self.on_send_complete(pipe)?;
        self.on_recv_complete(pipe)?;
        Ok(())
    }
}

impl<R: CopyEngine<TransferBuffer>> DeferredWork for Inner<R> {
    fn run_retry(&self) {
        match self.replenish_all() {
            Ok(posted) => log::trace!("rx post retry posted {} buffers", posted),
            Err(e) => log::warn!("rx post retry: {}", e),
        }
    }

    fn run_service(&self, pipe: usize) {
        if let Err(e) = self.service_pipe(pipe) {
            log::warn!("pipe {}: deferred completion service failed: {}", pipe, e);
        }
    }
}

fn deliver_transmit(sink: Option<&dyn CompletionSink>, pipe: usize, buf: TransferBuffer) {
    match sink {
        Some(sink) => sink.transmit_done(pipe, buf),
        None => log::warn!("pipe {}: no completion sink, dropping tx buffer", pipe),
    }
}

fn release_pipes<R: CopyEngine<TransferBuffer>>(pipes: Vec<Pipe<R>>, dma: &DmaContext) {
    for pipe in pipes {
        pipe.release(dma);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copy_engine::{CeAttr, CeConfig, RingKind};
    use copy_engine_mock::{MockCopyEngine, MockMapper};
    use ce_dma::HeapAllocator;

    type MockSet = PipeSet<MockCopyEngine<TransferBuffer>>;

    fn small_config() -> PipeSetConfig {
        PipeSetConfig {
            rx_post_retry_ms: 10,
            diag_pipe: Some(2),
            pipes: vec![
                CeConfig::new(CeAttr::empty(), 4, 128, 0),
                CeConfig::new(CeAttr::empty(), 0, 256, 4),
                CeConfig::new(CeAttr::DISABLE_INTR, 2, 2048, 2),
            ],
        }
    }

    fn alloc(mapper: &Arc<MockMapper>) -> (MockSet, Vec<MockCopyEngine<TransferBuffer>>) {
        let mut rings = Vec::new();
        let dma = DmaContext::new(Arc::new(HeapAllocator), mapper.clone());
        let set = PipeSet::alloc_pipes(
            small_config(),
            |i, ce| {
                let ring = MockCopyEngine::new(i, ce);
                rings.push(ring.clone());
                Ok(ring)
            },
            dma,
        )
        .expect("Failed to allocate pipes");
        (set, rings)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mapper = Arc::new(MockMapper::new());
        let (set, rings) = alloc(&mapper);
        assert_eq!(set.state(), PipeSetState::Deinitialized);
        assert_eq!(mapper.live_tags(), 2);

        set.init_pipes().unwrap();
        assert_eq!(set.state(), PipeSetState::Active);
        assert!(rings.iter().all(|r| r.is_initialized()));

        assert!(matches!(
            set.buffer_cleanup(),
            Err(PipeError::InvalidTransition { from: PipeSetState::Active, .. })
        ));
        assert!(matches!(set.ce_deinit(), Err(PipeError::InvalidTransition { .. })));

        set.kill_tasks().unwrap();
        set.kill_tasks().unwrap();
        assert_eq!(set.state(), PipeSetState::TasksKilled);
        set.buffer_cleanup().unwrap();
        assert_eq!(set.state(), PipeSetState::BuffersDrained);
        set.ce_deinit().unwrap();
        assert_eq!(set.state(), PipeSetState::Deinitialized);
        assert!(rings.iter().all(|r| !r.is_initialized()));

        // pipes persist across bring-down
        set.init_pipes().unwrap();
        assert_eq!(set.replenish_all().unwrap(), 4);

        set.free_pipes();
        assert_eq!(mapper.live_tags(), 0);
        assert_eq!(mapper.live_mappings(), 0);
    }

    #[test]
    fn test_init_failure_rolls_back() {
        let mapper = Arc::new(MockMapper::new());
        let (set, rings) = alloc(&mapper);
        rings[1].fail_next_init(RingError::Fault { code: -12 });

        let err = set.init_pipes().unwrap_err();
        assert_eq!(
            err,
            PipeError::RingInit {
                pipe: 1,
                source: RingError::Fault { code: -12 }
            }
        );
        assert_eq!(set.state(), PipeSetState::Deinitialized);
        assert!(!rings[0].is_initialized());

        set.init_pipes().unwrap();
        assert!(rings.iter().all(|r| r.is_initialized()));
    }

    #[test]
    fn test_alloc_failure_releases_earlier_pipes() {
        let mapper = Arc::new(MockMapper::new());
        let dma = DmaContext::new(Arc::new(HeapAllocator), mapper.clone());
        let result: Result<MockSet> = PipeSet::alloc_pipes(
            small_config(),
            |i, ce| {
                if i == 2 {
                    Err(RingError::Fault { code: -12 })
                } else {
                    Ok(MockCopyEngine::new(i, ce))
                }
            },
            dma,
        );

        assert!(matches!(result, Err(PipeError::RingAlloc { pipe: 2, .. })));
        assert_eq!(mapper.live_tags(), 0);
    }

    #[test]
    fn test_operations_require_active() {
        let mapper = Arc::new(MockMapper::new());
        let (set, _rings) = alloc(&mapper);

        assert!(matches!(set.replenish_pipe(1), Err(PipeError::NotActive { .. })));
        assert_eq!(set.replenish_all().unwrap(), 0);
        assert_eq!(set.on_recv_complete(1).unwrap(), RecvDrain::default());

        let rejected = set.send(0, TransferBuffer::from_vec(vec![1; 8]), 0).unwrap_err();
        assert!(matches!(rejected.error, PipeError::NotActive { .. }));
        assert_eq!(rejected.buffer.into_vec(), vec![1; 8]);
    }

    #[test]
    fn test_invalid_pipe_index() {
        let mapper = Arc::new(MockMapper::new());
        let (set, _rings) = alloc(&mapper);
        set.init_pipes().unwrap();

        assert_eq!(
            set.replenish_pipe(9).unwrap_err(),
            PipeError::InvalidPipe { pipe: 9, count: 3 }
        );
        assert!(set.pipe_info(3).is_err());
        assert!(set.schedule_service(3).is_err());
    }

    #[test]
    fn test_pipe_info_reports_roles() {
        let mapper = Arc::new(MockMapper::new());
        let (set, _rings) = alloc(&mapper);

        let tx = set.pipe_info(0).unwrap();
        assert_eq!(tx.kind, crate::PipeKind::Transmit);
        assert_eq!(tx.buf_sz, 128);
        let rx = set.pipe_info(1).unwrap();
        assert_eq!(rx.kind, crate::PipeKind::Receive);
        assert_eq!(rx.dest_nentries, 4);
        let diag = set.pipe_info(2).unwrap();
        assert_eq!(diag.kind, crate::PipeKind::Diagnostic);
        assert_eq!(diag.buf_sz, 0);
        assert_eq!(diag.flags, CeAttr::DISABLE_INTR);
        assert_eq!(set.pipe_count(), 3);
    }

    #[test]
    fn test_ring_fault_is_published() {
        let mapper = Arc::new(MockMapper::new());
        let (set, rings) = alloc(&mapper);
        set.init_pipes().unwrap();
        rings[1].fail_next_post(RingKind::Destination, RingError::Fault { code: -5 });

        let err = set.replenish_pipe(1).unwrap_err();
        assert_eq!(err, PipeError::RingFault { pipe: 1, code: -5 });
        assert!(!set.retry_pending());
        assert_eq!(
            set.faults().try_recv().unwrap(),
            PipeFault::RingFault { pipe: 1, code: -5 }
        );
    }
}
