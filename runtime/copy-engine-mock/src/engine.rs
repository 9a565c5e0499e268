//! Mock copy engine
//!
//! Slots are filled in ring order starting at the write index. Posted slots
//! stay in flight until a test completes them; completed slots keep their
//! context until the pipe layer reaps them through `completed_*_next` or
//! clears them through `take_context`.

use std::collections::VecDeque;
use std::sync::Arc;

use copy_engine::{CeConfig, Completion, CopyEngine, Rejected, RingError, RingKind};
use spin::Mutex;

#[derive(Debug, Clone, Copy)]
struct SlotMeta {
    nbytes: usize,
    transfer_id: u32,
}

#[derive(Debug, Clone, Copy)]
struct CompletionEntry {
    /// `None` reports a no-op slot
    slot: Option<usize>,
    nbytes: usize,
    transfer_id: u32,
}

struct MockRing<C> {
    slots: Vec<Option<C>>,
    meta: Vec<SlotMeta>,
    write_index: usize,
    in_flight: VecDeque<usize>,
    completed: VecDeque<CompletionEntry>,
    posts: u64,
    fail_next: VecDeque<RingError>,
}

impl<C> MockRing<C> {
    fn new(nentries: usize) -> Self {
        Self {
            slots: (0..nentries).map(|_| None).collect(),
            meta: vec![SlotMeta { nbytes: 0, transfer_id: 0 }; nentries],
            write_index: 0,
            in_flight: VecDeque::new(),
            completed: VecDeque::new(),
            posts: 0,
            fail_next: VecDeque::new(),
        }
    }

    fn free(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    fn occupied(&self) -> usize {
        self.slots.len() - self.free()
    }

    fn post(&mut self, context: C, meta: SlotMeta) -> Result<usize, Rejected<C>> {
        if let Some(error) = self.fail_next.pop_front() {
            return Err(Rejected::new(error, context));
        }

        let n = self.slots.len();
        let slot = (0..n)
            .map(|i| (self.write_index + i) % n)
            .find(|&i| self.slots[i].is_none());
        let Some(slot) = slot else {
            return Err(Rejected::new(RingError::Full, context));
        };

        self.slots[slot] = Some(context);
        self.meta[slot] = meta;
        self.write_index = (slot + 1) % n;
        self.in_flight.push_back(slot);
        self.posts += 1;
        Ok(slot)
    }

    fn complete_slot(&mut self, slot: usize, nbytes: Option<usize>) -> bool {
        let Some(pos) = self.in_flight.iter().position(|&s| s == slot) else {
            return false;
        };
        self.in_flight.remove(pos);
        let meta = self.meta[slot];
        self.completed.push_back(CompletionEntry {
            slot: Some(slot),
            nbytes: nbytes.unwrap_or(meta.nbytes),
            transfer_id: meta.transfer_id,
        });
        true
    }

    fn next_completed(&mut self) -> Option<Completion<C>> {
        let entry = self.completed.pop_front()?;
        let context = entry.slot.and_then(|slot| self.slots[slot].take());
        Some(Completion {
            context,
            nbytes: entry.nbytes,
            transfer_id: entry.transfer_id,
        })
    }

    fn take(&mut self, slot: usize) -> Option<C> {
        let context = self.slots.get_mut(slot)?.take();
        self.in_flight.retain(|&s| s != slot);
        self.completed.retain(|entry| entry.slot != Some(slot));
        context
    }
}

struct EngineState<C> {
    id: usize,
    src: Option<MockRing<C>>,
    dest: Option<MockRing<C>>,
    initialized: bool,
    init_calls: u32,
    deinit_calls: u32,
    fail_init: Option<RingError>,
}

impl<C> EngineState<C> {
    fn ring(&self, kind: RingKind) -> Option<&MockRing<C>> {
        match kind {
            RingKind::Source => self.src.as_ref(),
            RingKind::Destination => self.dest.as_ref(),
        }
    }

    fn ring_mut(&mut self, kind: RingKind) -> Option<&mut MockRing<C>> {
        match kind {
            RingKind::Source => self.src.as_mut(),
            RingKind::Destination => self.dest.as_mut(),
        }
    }

    fn configured_ring(&mut self, kind: RingKind) -> &mut MockRing<C> {
        assert!(
            self.initialized,
            "BUG: post into uninitialized copy engine {}",
            self.id
        );
        let id = self.id;
        match self.ring_mut(kind) {
            Some(ring) => ring,
            None => panic!("BUG: post into unconfigured {:?} ring of copy engine {}", kind, id),
        }
    }
}

/// Mock copy engine; clones share the same rings
pub struct MockCopyEngine<C> {
    state: Arc<Mutex<EngineState<C>>>,
}

impl<C> Clone for MockCopyEngine<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C> MockCopyEngine<C> {
    /// Allocate an engine with ring depths taken from `config`
    pub fn new(id: usize, config: &CeConfig) -> Self {
        let ring = |n: usize| (n > 0).then(|| MockRing::new(n));
        Self {
            state: Arc::new(Mutex::new(EngineState {
                id,
                src: ring(config.src_nentries),
                dest: ring(config.dest_nentries),
                initialized: false,
                init_calls: 0,
                deinit_calls: 0,
                fail_init: None,
            })),
        }
    }

    /// Complete the oldest in-flight receive slot with `nbytes` of data
    ///
    /// Returns the completed slot, or `None` if nothing is in flight.
    pub fn complete_recv(&self, nbytes: usize) -> Option<usize> {
        let mut state = self.state.lock();
        let ring = state.dest.as_mut()?;
        let slot = *ring.in_flight.front()?;
        ring.complete_slot(slot, Some(nbytes));
        Some(slot)
    }

    /// Complete receive slot `slot` with `nbytes` of data
    pub fn complete_recv_slot(&self, slot: usize, nbytes: usize) -> bool {
        let mut state = self.state.lock();
        match state.dest.as_mut() {
            Some(ring) => ring.complete_slot(slot, Some(nbytes)),
            None => false,
        }
    }

    /// Complete up to `count` of the oldest in-flight sends
    ///
    /// Returns the number of sends completed.
    pub fn complete_send(&self, count: usize) -> usize {
        let mut state = self.state.lock();
        let Some(ring) = state.src.as_mut() else {
            return 0;
        };
        let mut done = 0;
        while done < count {
            let Some(&slot) = ring.in_flight.front() else {
                break;
            };
            ring.complete_slot(slot, None);
            done += 1;
        }
        done
    }

    /// Report a completion for a slot that carried no context
    pub fn push_null_completion(&self, kind: RingKind) {
        let mut state = self.state.lock();
        if let Some(ring) = state.ring_mut(kind) {
            ring.completed.push_back(CompletionEntry {
                slot: None,
                nbytes: 0,
                transfer_id: 0,
            });
        }
    }

    /// Make the next post into the ring of `kind` fail with `error`
    pub fn fail_next_post(&self, kind: RingKind, error: RingError) {
        let mut state = self.state.lock();
        if let Some(ring) = state.ring_mut(kind) {
            ring.fail_next.push_back(error);
        }
    }

    /// Make the next `init` fail with `error`
    pub fn fail_next_init(&self, error: RingError) {
        self.state.lock().fail_init = Some(error);
    }

    /// Get the number of slots holding a context
    pub fn occupied(&self, kind: RingKind) -> usize {
        self.state.lock().ring(kind).map_or(0, MockRing::occupied)
    }

    /// Get the number of successful posts ever made into the ring of `kind`
    pub fn posts(&self, kind: RingKind) -> u64 {
        self.state.lock().ring(kind).map_or(0, |ring| ring.posts)
    }

    /// Get the number of completions not yet reaped
    pub fn pending_completions(&self, kind: RingKind) -> usize {
        self.state.lock().ring(kind).map_or(0, |ring| ring.completed.len())
    }

    /// Inspect the context of one slot
    pub fn with_slot<R>(&self, kind: RingKind, slot: usize, f: impl FnOnce(Option<&C>) -> R) -> R {
        let state = self.state.lock();
        let context = state
            .ring(kind)
            .and_then(|ring| ring.slots.get(slot))
            .and_then(Option::as_ref);
        f(context)
    }

    /// Check if the engine is programmed
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Get the number of `init` calls
    pub fn init_calls(&self) -> u32 {
        self.state.lock().init_calls
    }

    /// Get the number of `deinit` calls
    pub fn deinit_calls(&self) -> u32 {
        self.state.lock().deinit_calls
    }
}

impl<C: Send> CopyEngine<C> for MockCopyEngine<C> {
    fn has_ring(&self, kind: RingKind) -> bool {
        self.state.lock().ring(kind).is_some()
    }

    fn nentries(&self, kind: RingKind) -> usize {
        self.state.lock().ring(kind).map_or(0, |ring| ring.slots.len())
    }

    fn free_slots(&self, kind: RingKind) -> usize {
        self.state.lock().ring(kind).map_or(0, MockRing::free)
    }

    fn post_recv(&mut self, context: C, _bus_addr: u64) -> Result<(), Rejected<C>> {
        let mut state = self.state.lock();
        let meta = SlotMeta { nbytes: 0, transfer_id: 0 };
        state
            .configured_ring(RingKind::Destination)
            .post(context, meta)
            .map(|_| ())
    }

    fn send(
        &mut self,
        context: C,
        _bus_addr: u64,
        nbytes: usize,
        transfer_id: u32,
    ) -> Result<(), Rejected<C>> {
        let mut state = self.state.lock();
        let meta = SlotMeta { nbytes, transfer_id };
        state
            .configured_ring(RingKind::Source)
            .post(context, meta)
            .map(|_| ())
    }

    fn completed_send_next(&mut self) -> Option<Completion<C>> {
        self.state.lock().src.as_mut()?.next_completed()
    }

    fn completed_recv_next(&mut self) -> Option<Completion<C>> {
        self.state.lock().dest.as_mut()?.next_completed()
    }

    fn take_context(&mut self, kind: RingKind, slot: usize) -> Option<C> {
        self.state.lock().ring_mut(kind)?.take(slot)
    }

    fn init(&mut self, _config: &CeConfig) -> copy_engine::Result<()> {
        let mut state = self.state.lock();
        state.init_calls += 1;
        if let Some(error) = state.fail_init.take() {
            return Err(error);
        }
        state.initialized = true;
        Ok(())
    }

    fn deinit(&mut self) {
        let mut state = self.state.lock();
        state.deinit_calls += 1;
        state.initialized = false;
        log::trace!("mock copy engine {} deinit", state.id);
    }
}
