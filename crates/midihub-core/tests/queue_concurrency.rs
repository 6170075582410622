//! Producer/consumer behaviour of `PacketQueue` under concurrent use.

use midihub_core::{OverflowPolicy, Packet, PacketQueue, PushOutcome};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

/// Encodes (producer, sequence) in the payload so every packet is unique.
fn tagged(producer: u8, seq: u16) -> Packet {
    let [hi, lo] = seq.to_be_bytes();
    Packet::new(seq as u64, &[producer, hi, lo]).unwrap()
}

fn tag_of(packet: &Packet) -> (u8, u16) {
    let b = packet.bytes();
    (b[0], u16::from_be_bytes([b[1], b[2]]))
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

proptest! {
    /// Any sequence of pushes followed by one drain returns exactly those
    /// packets, in push order, and leaves the queue empty.
    #[test]
    fn test_drain_returns_pushes_in_order(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 0..64)
    ) {
        let queue = PacketQueue::unbounded();
        let pushed: Vec<Packet> = payloads
            .iter()
            .enumerate()
            .map(|(i, bytes)| Packet::new(i as u64, bytes).unwrap())
            .collect();

        for packet in &pushed {
            prop_assert_eq!(queue.push(*packet), PushOutcome::Queued);
        }

        prop_assert_eq!(queue.drain(), pushed);
        prop_assert!(queue.is_empty());
    }

    /// A bounded drop-oldest queue always holds the most recent `capacity` pushes.
    #[test]
    fn test_drop_oldest_keeps_newest_window(count in 0usize..200, capacity in 1usize..32) {
        let queue = PacketQueue::bounded(capacity, OverflowPolicy::DropOldest);
        for seq in 0..count {
            queue.push(tagged(0, seq as u16));
        }

        let kept: Vec<u16> = queue.drain().iter().map(|p| tag_of(p).1).collect();
        let expected: Vec<u16> = (count.saturating_sub(capacity)..count).map(|s| s as u16).collect();
        prop_assert_eq!(kept, expected);
        prop_assert_eq!(queue.dropped_count() as usize, count.saturating_sub(capacity));
    }
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

/// Several producers push while a consumer drains repeatedly. Every packet is
/// seen exactly once across all drains plus the final remainder, and each
/// producer's packets keep their relative order.
#[test]
fn test_concurrent_pushes_are_partitioned_exactly_once() {
    const PRODUCERS: u8 = 4;
    const PER_PRODUCER: u16 = 5_000;

    let queue = Arc::new(PacketQueue::unbounded());
    let barrier = Arc::new(Barrier::new(PRODUCERS as usize + 1));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..PER_PRODUCER {
                    assert_eq!(queue.push(tagged(producer, seq)), PushOutcome::Queued);
                }
            })
        })
        .collect();

    barrier.wait();
    let mut received = Vec::new();
    while producers.iter().any(|p| !p.is_finished()) {
        queue.drain_into(&mut received);
        thread::yield_now();
    }
    for producer in producers {
        producer.join().unwrap();
    }
    // Whatever is left after the producers stopped
    queue.drain_into(&mut received);

    assert_eq!(received.len(), PRODUCERS as usize * PER_PRODUCER as usize);

    let unique: HashSet<(u8, u16)> = received.iter().map(tag_of).collect();
    assert_eq!(unique.len(), received.len(), "no packet duplicated");

    for producer in 0..PRODUCERS {
        let seqs: Vec<u16> = received
            .iter()
            .map(tag_of)
            .filter(|(p, _)| *p == producer)
            .map(|(_, s)| s)
            .collect();
        assert_eq!(seqs, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

/// With a bounded drop-newest queue, queued + dropped always equals pushed.
#[test]
fn test_bounded_queue_accounts_for_every_push() {
    const PRODUCERS: u8 = 3;
    const PER_PRODUCER: u16 = 2_000;

    let queue = Arc::new(PacketQueue::bounded(64, OverflowPolicy::DropNewest));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut queued = 0usize;
                for seq in 0..PER_PRODUCER {
                    if queue.push(tagged(producer, seq)).is_queued() {
                        queued += 1;
                    }
                }
                queued
            })
        })
        .collect();

    let mut drained = 0usize;
    let mut buf = Vec::new();
    while handles.iter().any(|h| !h.is_finished()) {
        buf.clear();
        drained += queue.drain_into(&mut buf);
    }
    let queued: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    drained += queue.drain().len();

    assert_eq!(drained, queued);
    assert_eq!(
        queued as u64 + queue.dropped_count(),
        PRODUCERS as u64 * PER_PRODUCER as u64
    );
}

/// Pushes racing a close never leave packets behind in the closed queue.
#[test]
fn test_close_races_with_producer() {
    for _ in 0..50 {
        let queue = Arc::new(PacketQueue::unbounded());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seq = 0u16;
                while queue.push(tagged(0, seq)) != PushOutcome::Closed {
                    seq = seq.wrapping_add(1);
                }
            })
        };

        thread::yield_now();
        queue.close();
        producer.join().unwrap();

        assert!(queue.is_empty());
        assert!(queue.is_closed());
    }
}
