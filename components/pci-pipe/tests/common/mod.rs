//! Shared harness for pipe integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ce_dma::{DmaContext, TransferBuffer};
use copy_engine::{CeAttr, CeConfig};
use copy_engine_mock::{FaultyAllocator, MockCopyEngine, MockMapper};
use crossbeam::channel::Receiver;
use pci_pipe::{ChannelSink, Delivery, PipeSet, PipeSetConfig};

pub type MockRing = MockCopyEngine<TransferBuffer>;

/// Transmit pipe used by the two-pipe layout
pub const TX_PIPE: usize = 0;
/// Receive pipe used by the two-pipe layout
pub const RX_PIPE: usize = 1;
/// Diagnostic pipe used by the two-pipe layout
pub const DIAG_PIPE: usize = 2;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Transmit pipe, receive pipe of `depth` x `buf_sz`, diagnostic pipe
pub fn layout(depth: usize, buf_sz: usize, retry_ms: u64) -> PipeSetConfig {
    PipeSetConfig {
        rx_post_retry_ms: retry_ms,
        diag_pipe: Some(DIAG_PIPE),
        pipes: vec![
            CeConfig::new(CeAttr::empty(), 4, 256, 0),
            CeConfig::new(CeAttr::empty(), 0, buf_sz, depth),
            CeConfig::new(CeAttr::DISABLE_INTR, 2, 2048, 2),
        ],
    }
}

pub struct Harness {
    pub set: PipeSet<MockRing>,
    pub rings: Vec<MockRing>,
    pub alloc: Arc<FaultyAllocator>,
    pub mapper: Arc<MockMapper>,
    pub completions: Receiver<Delivery>,
}

impl Harness {
    /// Allocate, attach a channel sink and bring the pipes up
    pub fn new(config: PipeSetConfig) -> Self {
        init_logging();

        let alloc = Arc::new(FaultyAllocator::new());
        let mapper = Arc::new(MockMapper::new());
        let dma = DmaContext::new(alloc.clone(), mapper.clone());

        let mut rings = Vec::new();
        let set = PipeSet::alloc_pipes(
            config,
            |i, ce| {
                let ring = MockCopyEngine::new(i, ce);
                rings.push(ring.clone());
                Ok(ring)
            },
            dma,
        )
        .expect("Failed to allocate pipes");

        let (sink, completions) = ChannelSink::new();
        set.set_sink(Arc::new(sink));
        set.init_pipes().expect("Failed to initialize pipes");

        Self {
            set,
            rings,
            alloc,
            mapper,
            completions,
        }
    }

    pub fn ring(&self, pipe: usize) -> &MockRing {
        &self.rings[pipe]
    }

    /// Collect every buffer delivered so far
    pub fn delivered(&self) -> Vec<Delivery> {
        self.completions.try_iter().collect()
    }
}

/// Poll `cond` for up to two seconds
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
