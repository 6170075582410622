//! Lightweight "data arrived" signal for consumers on another thread.

use crate::source::{Source, SourceDelegate};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use midihub_core::EndpointId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 1024;

/// A [`SourceDelegate`] that only forwards the source's [`EndpointId`].
///
/// The callback side never blocks: when the channel is full the signal is
/// counted as missed. Data is never lost that way, since the packets are
/// still in the source's queue for the next drain.
pub struct DataSignal {
    sender: Sender<EndpointId>,
    receiver: Receiver<EndpointId>,
    missed: AtomicU64,
}

impl DataSignal {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            missed: AtomicU64::new(0),
        }
    }

    pub fn try_recv(&self) -> Option<EndpointId> {
        self.receiver.try_recv().ok()
    }

    /// Blocks until a source signals or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EndpointId> {
        match self.receiver.recv_timeout(timeout) {
            Ok(endpoint) => Some(endpoint),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Takes every pending signal, de-duplicated, in first-signalled order.
    pub fn pending_sources(&self) -> Vec<EndpointId> {
        let mut sources: Vec<EndpointId> = Vec::new();
        for endpoint in self.receiver.try_iter() {
            if !sources.contains(&endpoint) {
                sources.push(endpoint);
            }
        }
        sources
    }

    /// Signals dropped because the channel was full.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl Default for DataSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceDelegate for DataSignal {
    fn data_received(&self, source: &Source) {
        if self.sender.try_send(source.endpoint()).is_err() {
            self.missed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_source;
    use midihub_core::Packet;
    use std::sync::Arc;
    use std::thread;

    fn note() -> Packet {
        Packet::new(0, &[0x90, 60, 100]).unwrap()
    }

    #[test]
    fn test_signal_names_the_source() {
        let source = test_source(11, "Keys");
        let signal = Arc::new(DataSignal::new());
        source.set_delegate(&signal);

        source.receive(&[note(), note()]);
        assert_eq!(signal.try_recv(), Some(EndpointId::new(11)));
        assert_eq!(signal.try_recv(), None, "one signal per batch");
    }

    #[test]
    fn test_pending_sources_deduplicates() {
        let a = test_source(1, "A");
        let b = test_source(2, "B");
        let signal = Arc::new(DataSignal::new());
        a.set_delegate(&signal);
        b.set_delegate(&signal);

        a.receive(&[note()]);
        b.receive(&[note()]);
        a.receive(&[note()]);

        assert_eq!(
            signal.pending_sources(),
            vec![EndpointId::new(1), EndpointId::new(2)]
        );
        assert!(signal.pending_sources().is_empty());
    }

    #[test]
    fn test_full_channel_counts_missed_but_keeps_packets() {
        let source = test_source(3, "C");
        let signal = Arc::new(DataSignal::with_capacity(1));
        source.set_delegate(&signal);

        source.receive(&[note()]);
        source.receive(&[note()]);
        source.receive(&[note()]);

        assert_eq!(signal.missed(), 2);
        assert_eq!(source.drain().len(), 3);
    }

    #[test]
    fn test_consumer_wakes_on_other_thread() {
        let source = Arc::new(test_source(4, "D"));
        let signal = Arc::new(DataSignal::new());
        source.set_delegate(&signal);

        let producer = {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                source.receive(&[note()]);
            })
        };

        let endpoint = signal.recv_timeout(Duration::from_secs(5));
        producer.join().unwrap();
        assert_eq!(endpoint, Some(EndpointId::new(4)));
        assert_eq!(source.drain(), vec![note()]);
    }
}
