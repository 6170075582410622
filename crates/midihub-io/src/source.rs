//! Inbound endpoint: platform callback → packet queue → consumer.

use crate::connection::Connection;
use arc_swap::ArcSwapOption;
use midihub_core::{EndpointId, Packet, PacketList, PacketQueue, PushOutcome};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Observer for inbound data on a [`Source`].
///
/// Called on the platform's MIDI thread, at real-time priority, once per
/// callback batch. Implementations must return quickly and must not block:
/// record that data is waiting (see [`DataSignal`](crate::DataSignal)) and
/// let the consumer call [`Source::drain`] on its own thread.
pub trait SourceDelegate: Send + Sync {
    fn data_received(&self, source: &Source);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Registered with the platform, nothing queued.
    Attached,
    /// Packets are waiting to be drained.
    Receiving,
    /// Removed from the hub; callbacks are dropped.
    Detached,
}

pub struct Source {
    connection: Connection,
    queue: PacketQueue,
    delegate: ArcSwapOption<Weak<dyn SourceDelegate>>,
    stale_drops: AtomicU64,
    hub_stale_drops: Arc<AtomicU64>,
}

impl Source {
    pub(crate) fn new(
        connection: Connection,
        queue: PacketQueue,
        hub_stale_drops: Arc<AtomicU64>,
    ) -> Self {
        Self {
            connection,
            queue,
            delegate: ArcSwapOption::empty(),
            stale_drops: AtomicU64::new(0),
            hub_stale_drops,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn endpoint(&self) -> EndpointId {
        self.connection.endpoint()
    }

    pub fn name(&self) -> Option<&str> {
        self.connection.name()
    }

    /// The source keeps only a weak reference; dropping the last `Arc`
    /// elsewhere silently stops notifications.
    pub fn set_delegate<D: SourceDelegate + 'static>(&self, delegate: &Arc<D>) {
        let weak: Weak<D> = Arc::downgrade(delegate);
        self.set_delegate_weak(weak);
    }

    pub(crate) fn set_delegate_weak(&self, delegate: Weak<dyn SourceDelegate>) {
        self.delegate.store(Some(Arc::new(delegate)));
    }

    pub fn clear_delegate(&self) {
        self.delegate.store(None);
    }

    pub fn has_delegate(&self) -> bool {
        let guard = self.delegate.load();
        (*guard)
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Producer side, called by the platform callback with one batch.
    ///
    /// Queues the packets and notifies the delegate once if anything was
    /// queued. Returns the number of packets queued. After detachment the
    /// whole batch is counted as stale and dropped.
    pub fn receive(&self, packets: &[Packet]) -> usize {
        let mut queued = 0;
        for (index, packet) in packets.iter().enumerate() {
            match self.queue.push(*packet) {
                PushOutcome::Closed => {
                    self.record_stale((packets.len() - index) as u64);
                    return 0;
                }
                outcome if outcome.is_queued() => queued += 1,
                _ => {}
            }
        }

        if queued > 0 {
            self.notify();
        }
        queued
    }

    pub fn receive_list(&self, packets: &PacketList) -> usize {
        self.receive(packets.packets())
    }

    fn notify(&self) {
        let guard = self.delegate.load();
        if let Some(delegate) = (*guard).as_ref().and_then(|weak| weak.upgrade()) {
            delegate.data_received(self);
        }
    }

    fn record_stale(&self, count: u64) {
        self.stale_drops.fetch_add(count, Ordering::Relaxed);
        self.hub_stale_drops.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(
            "Dropped {} packets for detached source {}",
            count,
            self.connection
        );
    }

    /// Consumer side. Takes every queued packet, oldest first.
    pub fn drain(&self) -> Vec<Packet> {
        self.queue.drain()
    }

    /// Consumer side. Appends queued packets to `out`; returns how many.
    pub fn drain_into(&self, out: &mut Vec<Packet>) -> usize {
        self.queue.drain_into(out)
    }

    /// Advisory.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Advisory.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_attached(&self) -> bool {
        !self.queue.is_closed()
    }

    pub fn state(&self) -> SourceState {
        if self.queue.is_closed() {
            SourceState::Detached
        } else if self.queue.is_empty() {
            SourceState::Attached
        } else {
            SourceState::Receiving
        }
    }

    /// Packets that arrived after this source was detached.
    pub fn stale_drops(&self) -> u64 {
        self.stale_drops.load(Ordering::Relaxed)
    }

    /// Packets lost to queue overflow.
    pub fn dropped_packets(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// `true` if the queue overflowed since the last call.
    pub fn take_overflow(&self) -> bool {
        self.queue.take_overflow()
    }

    /// Closes the queue, discarding anything not yet drained.
    pub(crate) fn detach(&self) -> usize {
        self.queue.close()
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("connection", &self.connection)
            .field("queue", &self.queue)
            .field("stale_drops", &self.stale_drops())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_source(id: u64, name: &str) -> Source {
    use crate::connection::HubId;
    use crate::platform::EndpointInfo;

    Source::new(
        Connection::new(
            HubId::next(),
            EndpointInfo::new(EndpointId::new(id), Some(name.to_string())),
        ),
        PacketQueue::default(),
        Arc::new(AtomicU64::new(0)),
    )
}
