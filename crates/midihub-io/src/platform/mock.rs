//! In-memory MIDI system.
//!
//! Cloning a [`MockPlatform`] shares its state, so a test can hand one clone
//! to the hub and keep the other to change the topology, inject packets and
//! failures, and inspect what was sent.

use super::{EndpointInfo, EndpointKind, MidiPlatform, PlatformNotification};
use crate::destination::EndpointSender;
use crate::source::Source;
use crate::{Error, Result};
use crossbeam_channel::Sender;
use midihub_core::{EndpointId, Packet, PacketList};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    next_id: u64,
    client: Option<String>,
    ports: Option<(String, String)>,
    notifier: Option<Sender<PlatformNotification>>,

    sources: Vec<EndpointInfo>,
    destinations: Vec<EndpointInfo>,
    virtual_sources: Vec<EndpointInfo>,
    virtual_destinations: Vec<EndpointInfo>,
    bindings: HashMap<EndpointId, Arc<Source>>,
    sent: HashMap<EndpointId, Vec<PacketList>>,
    network_enabled: bool,

    failing_sends: HashSet<EndpointId>,
    failing_connects: HashSet<EndpointId>,
    fail_client: bool,
    fail_ports: bool,
    fail_virtual: bool,
    fail_network: bool,
    fail_listing: bool,
}

impl MockState {
    fn allocate(&mut self, name: &str) -> EndpointInfo {
        self.next_id += 1;
        EndpointInfo::new(EndpointId::new(self.next_id), Some(name.to_string()))
    }

    fn post(&self, notification: PlatformNotification) {
        if let Some(notifier) = &self.notifier {
            let _ = notifier.send(notification);
        }
    }

    fn is_sendable(&self, endpoint: EndpointId) -> bool {
        self.destinations
            .iter()
            .chain(self.virtual_sources.iter())
            .any(|info| info.id == endpoint)
    }
}

#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Topology ====================

    pub fn add_source(&self, name: &str) -> EndpointId {
        self.add_endpoint(EndpointKind::Source, name, false)
    }

    /// Adds a source that reports itself as a network session.
    pub fn add_network_source(&self, name: &str) -> EndpointId {
        self.add_endpoint(EndpointKind::Source, name, true)
    }

    pub fn add_destination(&self, name: &str) -> EndpointId {
        self.add_endpoint(EndpointKind::Destination, name, false)
    }

    fn add_endpoint(&self, kind: EndpointKind, name: &str, network: bool) -> EndpointId {
        let mut state = self.state.lock();
        let info = state.allocate(name).network_session(network);
        let id = info.id;
        match kind {
            EndpointKind::Source => state.sources.push(info),
            EndpointKind::Destination => state.destinations.push(info),
        }
        state.post(PlatformNotification::EndpointAdded(kind, id));
        id
    }

    /// Unplugs an endpoint. The packet callback stays bound until the hub
    /// disconnects it, like a real driver's late callbacks.
    pub fn remove_endpoint(&self, endpoint: EndpointId) -> bool {
        let mut state = self.state.lock();
        let kind = if let Some(index) = state.sources.iter().position(|i| i.id == endpoint) {
            state.sources.remove(index);
            EndpointKind::Source
        } else if let Some(index) = state.destinations.iter().position(|i| i.id == endpoint) {
            state.destinations.remove(index);
            EndpointKind::Destination
        } else {
            return false;
        };
        state.post(PlatformNotification::EndpointRemoved(kind, endpoint));
        true
    }

    /// Posts an arbitrary notification to the hub.
    pub fn notify(&self, notification: PlatformNotification) {
        self.state.lock().post(notification);
    }

    // ==================== Traffic ====================

    /// Runs the packet callback for `endpoint`, as the driver would from its
    /// MIDI thread. Returns `false` if nothing is bound to it.
    pub fn deliver(&self, endpoint: EndpointId, packets: &[Packet]) -> bool {
        // Never call into the source with the state locked
        let source = self.state.lock().bindings.get(&endpoint).cloned();
        match source {
            Some(source) => {
                source.receive(packets);
                true
            }
            None => false,
        }
    }

    /// Everything sent to `endpoint`, one entry per send.
    pub fn sent_to(&self, endpoint: EndpointId) -> Vec<PacketList> {
        self.state
            .lock()
            .sent
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_bound(&self, endpoint: EndpointId) -> bool {
        self.state.lock().bindings.contains_key(&endpoint)
    }

    // ==================== Failure injection ====================

    pub fn fail_sends_to(&self, endpoint: EndpointId, fail: bool) {
        toggle(&mut self.state.lock().failing_sends, endpoint, fail);
    }

    /// Makes connecting a source or opening a destination fail.
    pub fn fail_connect(&self, endpoint: EndpointId, fail: bool) {
        toggle(&mut self.state.lock().failing_connects, endpoint, fail);
    }

    pub fn fail_client_creation(&self, fail: bool) {
        self.state.lock().fail_client = fail;
    }

    pub fn fail_port_creation(&self, fail: bool) {
        self.state.lock().fail_ports = fail;
    }

    pub fn fail_virtual_endpoints(&self, fail: bool) {
        self.state.lock().fail_virtual = fail;
    }

    pub fn fail_network(&self, fail: bool) {
        self.state.lock().fail_network = fail;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    // ==================== Inspection ====================

    pub fn is_client_open(&self) -> bool {
        self.state.lock().client.is_some()
    }

    pub fn client_name(&self) -> Option<String> {
        self.state.lock().client.clone()
    }

    pub fn port_names(&self) -> Option<(String, String)> {
        self.state.lock().ports.clone()
    }

    pub fn network_enabled(&self) -> bool {
        self.state.lock().network_enabled
    }

    pub fn virtual_source_count(&self) -> usize {
        self.state.lock().virtual_sources.len()
    }

    pub fn virtual_destination_count(&self) -> usize {
        self.state.lock().virtual_destinations.len()
    }
}

fn toggle(set: &mut HashSet<EndpointId>, endpoint: EndpointId, on: bool) {
    if on {
        set.insert(endpoint);
    } else {
        set.remove(&endpoint);
    }
}

impl fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockPlatform")
            .field("client", &state.client)
            .field("sources", &state.sources.len())
            .field("destinations", &state.destinations.len())
            .field("bindings", &state.bindings.len())
            .field("network_enabled", &state.network_enabled)
            .finish()
    }
}

impl MidiPlatform for MockPlatform {
    fn create_client(
        &mut self,
        name: &str,
        notifications: Sender<PlatformNotification>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_client {
            return Err(Error::Client(format!("mock refused client '{name}'")));
        }
        state.client = Some(name.to_string());
        state.notifier = Some(notifications);
        Ok(())
    }

    fn dispose_client(&mut self) {
        let mut state = self.state.lock();
        state.client = None;
        state.ports = None;
        state.notifier = None;
        state.bindings.clear();
    }

    fn create_ports(&mut self, input_name: &str, output_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_ports {
            return Err(Error::Port(format!("mock refused port '{input_name}'")));
        }
        state.ports = Some((input_name.to_string(), output_name.to_string()));
        Ok(())
    }

    fn sources(&mut self) -> Result<Vec<EndpointInfo>> {
        let state = self.state.lock();
        if state.fail_listing {
            return Err(Error::Endpoint("mock source listing failed".into()));
        }
        Ok(state.sources.clone())
    }

    fn destinations(&mut self) -> Result<Vec<EndpointInfo>> {
        let state = self.state.lock();
        if state.fail_listing {
            return Err(Error::Endpoint("mock destination listing failed".into()));
        }
        Ok(state.destinations.clone())
    }

    fn connect_source(&mut self, source: Arc<Source>) -> Result<()> {
        let mut state = self.state.lock();
        let endpoint = source.endpoint();
        if state.failing_connects.contains(&endpoint) {
            return Err(Error::Endpoint(format!("mock refused to connect {endpoint}")));
        }
        state.bindings.insert(endpoint, source);
        Ok(())
    }

    fn disconnect_source(&mut self, endpoint: EndpointId) -> Result<()> {
        self.state.lock().bindings.remove(&endpoint);
        Ok(())
    }

    fn open_destination(&mut self, endpoint: &EndpointInfo) -> Result<Box<dyn EndpointSender>> {
        let state = self.state.lock();
        if state.failing_connects.contains(&endpoint.id) {
            return Err(Error::Endpoint(format!("mock refused to open {}", endpoint.id)));
        }
        if !state.is_sendable(endpoint.id) {
            return Err(Error::Endpoint(format!("{} does not exist", endpoint.id)));
        }
        Ok(Box::new(MockSender {
            state: Arc::clone(&self.state),
            endpoint: endpoint.id,
        }))
    }

    fn create_virtual_source(
        &mut self,
        name: &str,
    ) -> Result<(EndpointInfo, Box<dyn EndpointSender>)> {
        let mut state = self.state.lock();
        if state.fail_virtual {
            return Err(Error::Endpoint("mock refused virtual source".into()));
        }
        let info = state.allocate(name);
        state.virtual_sources.push(info.clone());
        let sender = MockSender {
            state: Arc::clone(&self.state),
            endpoint: info.id,
        };
        Ok((info, Box::new(sender)))
    }

    fn dispose_virtual_source(&mut self, endpoint: EndpointId) -> Result<()> {
        let mut state = self.state.lock();
        let index = state
            .virtual_sources
            .iter()
            .position(|info| info.id == endpoint)
            .ok_or_else(|| Error::Endpoint(format!("no virtual source {endpoint}")))?;
        state.virtual_sources.remove(index);
        Ok(())
    }

    fn create_virtual_destination(&mut self, name: &str) -> Result<EndpointInfo> {
        let mut state = self.state.lock();
        if state.fail_virtual {
            return Err(Error::Endpoint("mock refused virtual destination".into()));
        }
        let info = state.allocate(name);
        state.virtual_destinations.push(info.clone());
        Ok(info)
    }

    fn dispose_virtual_destination(&mut self, endpoint: EndpointId) -> Result<()> {
        let mut state = self.state.lock();
        let index = state
            .virtual_destinations
            .iter()
            .position(|info| info.id == endpoint)
            .ok_or_else(|| Error::Endpoint(format!("no virtual destination {endpoint}")))?;
        state.virtual_destinations.remove(index);
        state.bindings.remove(&endpoint);
        Ok(())
    }

    fn set_network_enabled(&mut self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_network {
            return Err(Error::Unsupported("mock network sessions".into()));
        }
        state.network_enabled = enabled;
        Ok(())
    }
}

struct MockSender {
    state: Arc<Mutex<MockState>>,
    endpoint: EndpointId,
}

impl EndpointSender for MockSender {
    fn send(&mut self, packets: &PacketList) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_sends.contains(&self.endpoint) || !state.is_sendable(self.endpoint) {
            return Err(Error::Send {
                endpoint: self.endpoint,
                reason: "mock endpoint unavailable".into(),
            });
        }
        state
            .sent
            .entry(self.endpoint)
            .or_default()
            .push(packets.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, HubId};
    use midihub_core::PacketQueue;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_topology_changes_are_notified() {
        let mut platform = MockPlatform::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        platform.create_client("Test", tx).unwrap();

        let keys = platform.add_source("Keys");
        let synth = platform.add_destination("Synth");
        assert!(platform.remove_endpoint(keys));
        assert!(!platform.remove_endpoint(keys));

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                PlatformNotification::EndpointAdded(EndpointKind::Source, keys),
                PlatformNotification::EndpointAdded(EndpointKind::Destination, synth),
                PlatformNotification::EndpointRemoved(EndpointKind::Source, keys),
            ]
        );
        assert!(platform.sources().unwrap().is_empty());
        assert_eq!(platform.destinations().unwrap().len(), 1);
    }

    #[test]
    fn test_deliver_reaches_bound_source() {
        let mut platform = MockPlatform::new();
        let keys = platform.add_source("Keys");
        let info = platform.sources().unwrap().remove(0);
        let source = Arc::new(Source::new(
            Connection::new(HubId::next(), info),
            PacketQueue::default(),
            Arc::new(AtomicU64::new(0)),
        ));

        let note = Packet::new(0, &[0x90, 60, 100]).unwrap();
        assert!(!platform.deliver(keys, &[note]));

        platform.connect_source(Arc::clone(&source)).unwrap();
        assert!(platform.deliver(keys, &[note]));
        assert_eq!(source.drain(), vec![note]);

        platform.disconnect_source(keys).unwrap();
        assert!(!platform.is_bound(keys));
    }

    #[test]
    fn test_sender_records_and_fails_on_demand() {
        let mut platform = MockPlatform::new();
        let synth = platform.add_destination("Synth");
        let info = platform.destinations().unwrap().remove(0);
        let mut sender = platform.open_destination(&info).unwrap();

        let packets = PacketList::from_bytes(0, &[0xF8]);
        sender.send(&packets).unwrap();
        assert_eq!(platform.sent_to(synth), vec![packets.clone()]);

        platform.fail_sends_to(synth, true);
        assert!(sender.send(&packets).is_err());

        platform.fail_sends_to(synth, false);
        platform.remove_endpoint(synth);
        assert!(sender.send(&packets).is_err(), "unplugged destination");
    }
}
