//! Packet hand-off between a platform receive callback and its consumer.
//!
//! - Producer: the platform's MIDI callback thread calls [`PacketQueue::push`]
//! - Consumer: any thread calls [`PacketQueue::drain`] after being signalled
//!
//! One mutex guards the buffer. Critical sections are a single push or a
//! bounded copy-out; no user code ever runs while the lock is held.

use crate::Packet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What to discard when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Evict the oldest queued packet to make room.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the incoming packet.
    DropNewest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest packet.
    DroppedOldest,
    /// Not queued: the queue was full.
    DroppedNewest,
    /// Not queued: the queue has been closed.
    Closed,
}

impl PushOutcome {
    #[inline]
    pub fn is_queued(self) -> bool {
        matches!(self, PushOutcome::Queued | PushOutcome::DroppedOldest)
    }

    #[inline]
    pub fn is_overflow(self) -> bool {
        matches!(self, PushOutcome::DroppedOldest | PushOutcome::DroppedNewest)
    }
}

struct QueueState {
    packets: VecDeque<Packet>,
    closed: bool,
}

pub struct PacketQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    overflowed: AtomicBool,
    dropped: AtomicU64,
}

impl PacketQueue {
    /// Bounded queue. The full capacity is allocated up front so pushes never
    /// allocate. A capacity of zero is raised to one.
    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self::with_state(VecDeque::with_capacity(capacity), Some(capacity), policy)
    }

    /// Unbounded queue. Grows while the consumer falls behind.
    pub fn unbounded() -> Self {
        Self::with_state(VecDeque::new(), None, OverflowPolicy::default())
    }

    /// `None` selects an unbounded queue.
    pub fn new(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        match capacity {
            Some(capacity) => Self::bounded(capacity, policy),
            None => Self::unbounded(),
        }
    }

    fn with_state(packets: VecDeque<Packet>, capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                packets,
                closed: false,
            }),
            capacity,
            policy,
            overflowed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Producer side. O(1) under the lock.
    #[inline]
    pub fn push(&self, packet: Packet) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                PushOutcome::Closed
            } else {
                match self.capacity {
                    Some(capacity) if state.packets.len() >= capacity => match self.policy {
                        OverflowPolicy::DropOldest => {
                            state.packets.pop_front();
                            state.packets.push_back(packet);
                            PushOutcome::DroppedOldest
                        }
                        OverflowPolicy::DropNewest => PushOutcome::DroppedNewest,
                    },
                    _ => {
                        state.packets.push_back(packet);
                        PushOutcome::Queued
                    }
                }
            }
        };

        if outcome.is_overflow() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.overflowed.store(true, Ordering::Release);
        }
        outcome
    }

    /// Consumer side. Takes every queued packet, oldest first.
    pub fn drain(&self) -> Vec<Packet> {
        let mut out = Vec::with_capacity(self.len());
        self.drain_into(&mut out);
        out
    }

    /// Consumer side. Appends every queued packet to `out` and returns how
    /// many were moved. Reusing `out` keeps the consumer allocation-free.
    pub fn drain_into(&self, out: &mut Vec<Packet>) -> usize {
        let mut state = self.state.lock();
        let count = state.packets.len();
        out.extend(state.packets.drain(..));
        count
    }

    /// Discards queued packets; returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.packets.len();
        state.packets.clear();
        count
    }

    /// Discards queued packets and rejects every later push.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            let count = state.packets.len();
            state.packets.clear();
            count
        };
        tracing::trace!("Packet queue closed, discarded {} packets", discarded);
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Advisory: may be stale by the time the caller acts on it.
    pub fn len(&self) -> usize {
        self.state.lock().packets.len()
    }

    /// Advisory: may be stale by the time the caller acts on it.
    pub fn is_empty(&self) -> bool {
        self.state.lock().packets.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Total packets lost to overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns `true` once per overflow episode: reading clears the flag.
    pub fn take_overflow(&self) -> bool {
        self.overflowed.swap(false, Ordering::AcqRel)
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::bounded(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }
}

impl fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(n: u8) -> Packet {
        Packet::new(n as u64, &[0x90, n, 100]).unwrap()
    }

    #[test]
    fn test_push_then_drain_in_order() {
        let queue = PacketQueue::default();
        for n in 0..5 {
            assert_eq!(queue.push(packet(n)), PushOutcome::Queued);
        }
        assert_eq!(queue.len(), 5);

        let drained = queue.drain();
        assert_eq!(drained, (0..5).map(packet).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_drain_is_noop() {
        let queue = PacketQueue::default();
        assert!(queue.drain().is_empty());

        let mut buf = Vec::new();
        assert_eq!(queue.drain_into(&mut buf), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_into_appends() {
        let queue = PacketQueue::default();
        queue.push(packet(1));
        queue.push(packet(2));

        let mut buf = vec![packet(0)];
        assert_eq!(queue.drain_into(&mut buf), 2);
        assert_eq!(buf, vec![packet(0), packet(1), packet(2)]);
    }

    #[test]
    fn test_drop_oldest_on_overflow() {
        let queue = PacketQueue::bounded(3, OverflowPolicy::DropOldest);
        for n in 0..3 {
            queue.push(packet(n));
        }
        assert!(!queue.take_overflow());

        assert_eq!(queue.push(packet(3)), PushOutcome::DroppedOldest);
        assert_eq!(queue.dropped_count(), 1);
        assert!(queue.take_overflow());
        assert!(!queue.take_overflow(), "flag clears on read");

        assert_eq!(queue.drain(), vec![packet(1), packet(2), packet(3)]);
    }

    #[test]
    fn test_drop_newest_on_overflow() {
        let queue = PacketQueue::bounded(2, OverflowPolicy::DropNewest);
        queue.push(packet(0));
        queue.push(packet(1));

        assert_eq!(queue.push(packet(2)), PushOutcome::DroppedNewest);
        assert_eq!(queue.push(packet(3)), PushOutcome::DroppedNewest);
        assert_eq!(queue.dropped_count(), 2);
        assert!(queue.take_overflow());

        assert_eq!(queue.drain(), vec![packet(0), packet(1)]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let queue = PacketQueue::bounded(0, OverflowPolicy::DropOldest);
        assert_eq!(queue.capacity(), Some(1));
        queue.push(packet(0));
        queue.push(packet(1));
        assert_eq!(queue.drain(), vec![packet(1)]);
    }

    #[test]
    fn test_unbounded_never_overflows() {
        let queue = PacketQueue::unbounded();
        for n in 0..=255u8 {
            queue.push(packet(n));
        }
        for n in 0..=255u8 {
            assert_eq!(queue.push(packet(n)), PushOutcome::Queued);
        }
        assert_eq!(queue.len(), 512);
        assert_eq!(queue.capacity(), None);
        assert_eq!(queue.dropped_count(), 0);
    }

    #[test]
    fn test_close_discards_and_rejects() {
        let queue = PacketQueue::default();
        queue.push(packet(0));
        queue.push(packet(1));

        assert_eq!(queue.close(), 2);
        assert!(queue.is_closed());
        assert!(queue.is_empty());

        assert_eq!(queue.push(packet(2)), PushOutcome::Closed);
        assert!(queue.is_empty());
        assert_eq!(queue.dropped_count(), 0, "closed pushes are not overflow");
    }

    #[test]
    fn test_clear_keeps_queue_open() {
        let queue = PacketQueue::default();
        queue.push(packet(0));
        assert_eq!(queue.clear(), 1);
        assert!(!queue.is_closed());
        assert_eq!(queue.push(packet(1)), PushOutcome::Queued);
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(PushOutcome::Queued.is_queued());
        assert!(PushOutcome::DroppedOldest.is_queued());
        assert!(!PushOutcome::DroppedNewest.is_queued());
        assert!(!PushOutcome::Closed.is_queued());
        assert!(!PushOutcome::Closed.is_overflow());
    }
}
