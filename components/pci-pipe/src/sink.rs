//! Completion sink
//!
//! The consumer side of the pipe layer. Sink methods run with the pipe set
//! lock released, so they may submit new transfers.

use ce_dma::TransferBuffer;
use crossbeam::channel::{self, Receiver, Sender};

/// Consumer callbacks taking ownership of completed buffers
pub trait CompletionSink: Send + Sync {
    /// A transmit finished, or was still outstanding at cleanup
    fn transmit_done(&self, pipe: usize, buffer: TransferBuffer);

    /// A receive buffer was filled; `buffer.len()` is the received length
    fn receive_done(&self, pipe: usize, buffer: TransferBuffer);
}

/// Direction of a delivered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Transmit,
    Receive,
}

/// One buffer handed to a `ChannelSink`
#[derive(Debug)]
pub struct Delivery {
    pub pipe: usize,
    pub direction: Direction,
    pub buffer: TransferBuffer,
}

/// Sink forwarding every buffer into a channel
///
/// Lets a consumer process completions on its own thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Delivery>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, Receiver<Delivery>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, pipe: usize, direction: Direction, buffer: TransferBuffer) {
        let delivery = Delivery {
            pipe,
            direction,
            buffer,
        };
        if self.tx.send(delivery).is_err() {
            log::warn!("pipe {}: completion receiver gone, dropping {:?} buffer", pipe, direction);
        }
    }
}

impl CompletionSink for ChannelSink {
    fn transmit_done(&self, pipe: usize, buffer: TransferBuffer) {
        self.forward(pipe, Direction::Transmit, buffer);
    }

    fn receive_done(&self, pipe: usize, buffer: TransferBuffer) {
        self.forward(pipe, Direction::Receive, buffer);
    }
}
