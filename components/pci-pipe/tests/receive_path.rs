//! Receive replenishment and completion dispatch
//!
//! Drives a pipe set against the mock copy engine the way the interrupt
//! side would: complete slots on the ring, then call into the pipe layer.

mod common;

use common::{layout, Harness, DIAG_PIPE, RX_PIPE, TX_PIPE};
use copy_engine::{CopyEngine, RingKind};
use pci_pipe::{Direction, PipeError, PipeFault, RecvDrain};

/// Test that a full replenish leaves no free destination slot
#[test]
fn test_replenish_fills_ring() {
    let h = Harness::new(layout(8, 512, 50));

    let posted = h.set.replenish_pipe(RX_PIPE).expect("Failed to replenish");
    assert_eq!(posted, 8);
    assert_eq!(h.ring(RX_PIPE).free_slots(RingKind::Destination), 0);
    assert_eq!(h.mapper.live_mappings(), 8);

    // nothing left to do
    assert_eq!(h.set.replenish_pipe(RX_PIPE).unwrap(), 0);
    assert_eq!(h.set.stats(RX_PIPE).unwrap().rx_posted, 8);
}

/// Test that pass-through and transmit-only pipes never post
#[test]
fn test_zero_size_pipes_never_post() {
    let h = Harness::new(layout(4, 256, 50));

    assert_eq!(h.set.replenish_pipe(DIAG_PIPE).unwrap(), 0);
    assert_eq!(h.set.replenish_pipe(TX_PIPE).unwrap(), 0);
    assert_eq!(h.set.replenish_all().unwrap(), 4);

    assert_eq!(h.ring(DIAG_PIPE).posts(RingKind::Destination), 0);
    assert_eq!(h.ring(DIAG_PIPE).posts(RingKind::Source), 0);
    assert_eq!(h.ring(TX_PIPE).posts(RingKind::Source), 0);

    // completions on the diagnostic pipe are left to its owner
    h.ring(DIAG_PIPE).push_null_completion(RingKind::Destination);
    assert_eq!(h.set.on_recv_complete(DIAG_PIPE).unwrap(), RecvDrain::default());
    assert_eq!(h.ring(DIAG_PIPE).pending_completions(RingKind::Destination), 1);
}

/// Test that a completed buffer reaches the sink exactly once with its length
#[test]
fn test_receive_round_trip() {
    let h = Harness::new(layout(4, 256, 50));
    h.set.replenish_pipe(RX_PIPE).unwrap();

    assert!(h.ring(RX_PIPE).complete_recv_slot(0, 100));
    let drain = h.set.on_recv_complete(RX_PIPE).expect("Failed to drain");
    assert_eq!(
        drain,
        RecvDrain {
            delivered: 1,
            discarded: 0,
            unclaimed: 0,
            reposted: 1
        }
    );

    let delivered = h.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].pipe, RX_PIPE);
    assert_eq!(delivered[0].direction, Direction::Receive);
    assert_eq!(delivered[0].buffer.len(), 100);
    assert!(!delivered[0].buffer.is_mapped());

    // a second drain finds nothing
    assert_eq!(h.set.on_recv_complete(RX_PIPE).unwrap().delivered, 0);
    assert!(h.delivered().is_empty());

    // ring is whole again: 3 original + 1 replacement still mapped
    assert_eq!(h.ring(RX_PIPE).free_slots(RingKind::Destination), 0);
    assert_eq!(h.mapper.live_mappings(), 4);
}

/// Test that completions are delivered in ring completion order
#[test]
fn test_delivery_order_follows_completion_order() {
    let h = Harness::new(layout(4, 256, 50));
    h.set.replenish_pipe(RX_PIPE).unwrap();

    for (slot, nbytes) in [(3, 30), (1, 10), (2, 20)] {
        assert!(h.ring(RX_PIPE).complete_recv_slot(slot, nbytes));
    }
    h.set.on_recv_complete(RX_PIPE).unwrap();

    let lengths: Vec<usize> = h.delivered().iter().map(|d| d.buffer.len()).collect();
    assert_eq!(lengths, vec![30, 10, 20]);
}

/// Ring depth 4, buffer 256: an oversized completion on slot 2 is discarded
/// and exactly one slot is replenished
#[test]
fn test_oversize_completion_discarded() {
    let h = Harness::new(layout(4, 256, 50));
    let faults = h.set.faults();

    assert_eq!(h.set.replenish_pipe(RX_PIPE).unwrap(), 4);
    assert_eq!(h.ring(RX_PIPE).free_slots(RingKind::Destination), 0);

    assert!(h.ring(RX_PIPE).complete_recv_slot(2, 300));
    let drain = h.set.on_recv_complete(RX_PIPE).unwrap();
    assert_eq!(
        drain,
        RecvDrain {
            delivered: 0,
            discarded: 1,
            unclaimed: 0,
            reposted: 1
        }
    );

    assert!(h.delivered().is_empty());
    assert_eq!(h.ring(RX_PIPE).posts(RingKind::Destination), 5);
    assert_eq!(h.ring(RX_PIPE).free_slots(RingKind::Destination), 0);
    assert_eq!(
        faults.try_recv().unwrap(),
        PipeFault::ProtocolViolation {
            pipe: RX_PIPE,
            nbytes: 300,
            capacity: 256
        }
    );

    let stats = h.set.stats(RX_PIPE).unwrap();
    assert_eq!(stats.rx_oversize_dropped, 1);
    assert_eq!(stats.rx_delivered, 0);
    assert_eq!(h.mapper.live_mappings(), 4);
}

/// Test that a completion of exactly the buffer size is accepted
#[test]
fn test_full_size_completion_delivered() {
    let h = Harness::new(layout(2, 256, 50));
    h.set.replenish_pipe(RX_PIPE).unwrap();

    h.ring(RX_PIPE).complete_recv(256);
    assert_eq!(h.set.on_recv_complete(RX_PIPE).unwrap().delivered, 1);
    assert_eq!(h.delivered()[0].buffer.len(), 256);
}

/// Test that no-op completions are skipped
#[test]
fn test_null_completion_skipped() {
    let h = Harness::new(layout(4, 256, 50));
    h.set.replenish_pipe(RX_PIPE).unwrap();

    h.ring(RX_PIPE).push_null_completion(RingKind::Destination);
    h.ring(RX_PIPE).complete_recv(64);

    let drain = h.set.on_recv_complete(RX_PIPE).unwrap();
    assert_eq!(drain.delivered, 1);
    assert_eq!(drain.discarded, 0);
}

/// Test that completions without a sink are released, not counted as delivered
#[test]
fn test_no_sink_drops_buffers() {
    let h = Harness::new(layout(4, 256, 50));
    h.set.clear_sink();
    h.set.replenish_pipe(RX_PIPE).unwrap();

    h.ring(RX_PIPE).complete_recv(64);
    h.ring(RX_PIPE).complete_recv(64);
    let drain = h.set.on_recv_complete(RX_PIPE).unwrap();
    assert_eq!(drain.delivered, 0);
    assert_eq!(drain.unclaimed, 2);
    assert_eq!(drain.reposted, 2);
    assert!(h.delivered().is_empty());
    assert_eq!(h.mapper.live_mappings(), 4);
    assert_eq!(h.set.stats(RX_PIPE).unwrap().rx_delivered, 0);

    h.set
        .send(TX_PIPE, ce_dma::TransferBuffer::from_vec(vec![7; 16]), 0)
        .unwrap();
    h.ring(TX_PIPE).complete_send(1);
    assert_eq!(h.set.on_send_complete(TX_PIPE).unwrap(), 0);
    assert_eq!(h.set.stats(TX_PIPE).unwrap().tx_completed, 0);
    assert_eq!(h.mapper.live_mappings(), 4);
}

/// Test that a completion dispatched through the deferred lane reaches the sink
#[test]
fn test_scheduled_service_delivers() {
    let h = Harness::new(layout(4, 256, 50));
    h.set.replenish_pipe(RX_PIPE).unwrap();

    h.ring(RX_PIPE).complete_recv(42);
    assert!(h.set.schedule_service(RX_PIPE).unwrap());

    let delivery = h
        .completions
        .recv_timeout(std::time::Duration::from_secs(2))
        .expect("Deferred service never delivered");
    assert_eq!(delivery.pipe, RX_PIPE);
    assert_eq!(delivery.buffer.len(), 42);
    assert!(common::wait_until(|| h.ring(RX_PIPE).free_slots(RingKind::Destination) == 0));
}

/// Test that replenish on an invalid pipe fails cleanly
#[test]
fn test_unknown_pipe() {
    let h = Harness::new(layout(4, 256, 50));
    assert!(matches!(
        h.set.on_recv_complete(17),
        Err(PipeError::InvalidPipe { pipe: 17, .. })
    ));
}

/// Test completion processing racing replenish from another thread
#[test]
fn test_concurrent_drain_and_replenish() {
    let h = Harness::new(layout(8, 128, 50));
    h.set.replenish_pipe(RX_PIPE).unwrap();

    let completed = std::thread::scope(|s| {
        let replenisher = s.spawn(|| {
            for _ in 0..200 {
                h.set.replenish_all().unwrap();
            }
        });

        let mut completed = 0;
        for i in 0..200 {
            if h.ring(RX_PIPE).complete_recv(i % 128).is_some() {
                completed += 1;
            }
            h.set.on_recv_complete(RX_PIPE).unwrap();
        }
        replenisher.join().unwrap();
        completed
    });

    assert_eq!(h.delivered().len(), completed);
    assert_eq!(h.set.stats(RX_PIPE).unwrap().rx_delivered, completed as u64);
    assert_eq!(h.ring(RX_PIPE).occupied(RingKind::Destination), 8);
    assert_eq!(h.mapper.live_mappings(), 8);
}
